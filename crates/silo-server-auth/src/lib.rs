// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential resolution, access control and rate limiting.
//!
//! Every API request runs the same pre-handler sequence: resolve the opaque
//! key into a caller, debit the caller's token buckets, then decide access
//! for the target database. The three steps live here, each as a small
//! service over the metadata store repositories.

pub mod access;
pub mod error;
pub mod ratelimit;
pub mod resolver;
pub mod types;

pub use access::{AccessControl, AccessDecision};
pub use error::{AuthError, Result};
pub use ratelimit::RateLimiter;
pub use resolver::{hash_key, CredentialResolver};
pub use types::Caller;
