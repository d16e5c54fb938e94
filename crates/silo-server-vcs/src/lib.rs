// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Commit graph engine for versioned Silo databases.
//!
//! Standard databases are immutable blobs addressed by a content-addressed
//! commit graph. This crate owns the graph types (commits, trees, branches,
//! tags, releases), commit id computation, branch-head arithmetic and the
//! fork tree walk. Persistence lives in `silo-server-db`; everything here is
//! pure data.

pub mod commit;
pub mod fork;
pub mod types;

pub use commit::{ancestry_count, blob_tree, build_commit, commit_id, contributor_count, tree_id};
pub use fork::{render_fork_tree, ForkIcon, ForkSource, ForkTreeRow};
pub use types::{BranchEntry, CommitEntry, CommitTree, ReleaseEntry, TagEntry, TreeEntry};
