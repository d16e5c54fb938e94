// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Commit graph data types.
//!
//! These are the JSON shapes persisted on each database row (`commit_list`,
//! `branch_heads`, `tag_list`, `release_list`) and returned verbatim by the
//! metadata endpoints. Commits are immutable once written into a database's
//! commit list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single entry in a commit's tree.
///
/// Trees in Silo carry exactly one database blob per commit, plus an
/// optional licence reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
	/// File name of the database at this commit.
	pub name: String,
	/// SHA-256 of the blob bytes.
	pub sha256: String,
	/// Blob size in bytes.
	pub size: i64,
	pub last_modified: DateTime<Utc>,
	/// SHA-256 of the licence text, when one is attached.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub licence_sha: Option<String>,
}

/// The tree referenced by a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitTree {
	pub entries: Vec<TreeEntry>,
}

/// A commit in a database's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEntry {
	/// Content-addressed commit id (64 lowercase hex).
	pub id: String,
	/// Parent commit id, empty for the root commit.
	#[serde(default)]
	pub parent: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub other_parents: Vec<String>,
	pub author_name: String,
	pub author_email: String,
	pub committer_name: String,
	pub committer_email: String,
	pub message: String,
	pub timestamp: DateTime<Utc>,
	pub tree: CommitTree,
}

/// Head entry of a branch, stored in the `branch_heads` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchEntry {
	/// Commit id at the tip of the branch.
	pub commit: String,
	pub commit_count: i64,
	#[serde(default)]
	pub description: String,
}

/// Entry in the `tag_list` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
	pub commit: String,
	pub date: DateTime<Utc>,
	#[serde(default)]
	pub description: String,
	pub tagger_name: String,
	pub tagger_email: String,
}

/// Entry in the `release_list` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntry {
	pub commit: String,
	pub date: DateTime<Utc>,
	#[serde(default)]
	pub description: String,
	pub releaser_name: String,
	pub releaser_email: String,
	/// Size in bytes of the database at the released commit.
	pub size: i64,
}
