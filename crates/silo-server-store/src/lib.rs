// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Storage collaborators for Silo server.
//!
//! The blob store holds immutable SQLite bodies addressed by SHA-256; the
//! on-disk cache materialises them locally for read-only opens; the artifact
//! cache holds expensive-to-recompute JSON keyed per database. The store and
//! cache are contracts (traits) with local implementations so the server
//! runs self-contained.

pub mod artifact;
pub mod blob;
pub mod cache;
pub mod error;

pub use artifact::{database_prefix, metadata_key, ArtifactCache, MemoryArtifactCache};
pub use blob::{BlobStore, FsBlobStore};
pub use cache::BlobCache;
pub use error::{Result, StoreError};
