// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Content addressing for commits.
//!
//! A commit id is the SHA-256 of a canonical serialisation of the commit:
//! fields in fixed order, one per line, timestamps in RFC 3339 UTC, no
//! trailing whitespace. The encoding is reproducible byte-for-byte, so the
//! same inputs always hash to the same id.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::types::{CommitEntry, CommitTree, TreeEntry};

/// Compute the canonical id of a tree.
pub fn tree_id(tree: &CommitTree) -> String {
	let mut canonical = String::new();
	for entry in &tree.entries {
		push_field(&mut canonical, "name", &entry.name);
		push_field(&mut canonical, "sha256", &entry.sha256);
		push_field(&mut canonical, "size", &entry.size.to_string());
		push_field(&mut canonical, "last_modified", &rfc3339(&entry.last_modified));
		push_field(
			&mut canonical,
			"licence",
			entry.licence_sha.as_deref().unwrap_or(""),
		);
	}
	sha256_hex(canonical.trim_end())
}

/// Compute the content-addressed id of a commit.
///
/// The commit's own `id` field does not participate in the hash.
pub fn commit_id(commit: &CommitEntry) -> String {
	let mut canonical = String::new();
	push_field(&mut canonical, "tree", &tree_id(&commit.tree));
	push_field(&mut canonical, "parent", &commit.parent);
	push_field(&mut canonical, "other_parents", &commit.other_parents.join(","));
	push_field(&mut canonical, "author_name", &commit.author_name);
	push_field(&mut canonical, "author_email", &commit.author_email);
	push_field(&mut canonical, "committer_name", &commit.committer_name);
	push_field(&mut canonical, "committer_email", &commit.committer_email);
	push_field(&mut canonical, "timestamp", &rfc3339(&commit.timestamp));
	push_field(&mut canonical, "message", &commit.message);
	sha256_hex(canonical.trim_end())
}

/// Assemble a commit and assign its content-addressed id.
pub fn build_commit(
	tree: CommitTree,
	parent: Option<&str>,
	author_name: &str,
	author_email: &str,
	message: &str,
	timestamp: DateTime<Utc>,
) -> CommitEntry {
	let mut commit = CommitEntry {
		id: String::new(),
		parent: parent.unwrap_or("").to_string(),
		other_parents: Vec::new(),
		author_name: author_name.to_string(),
		author_email: author_email.to_string(),
		committer_name: author_name.to_string(),
		committer_email: author_email.to_string(),
		message: message.to_string(),
		timestamp,
		tree,
	};
	commit.id = commit_id(&commit);
	commit
}

/// Number of commits reachable from `head` by following first parents.
///
/// Used to recompute a branch's commit count after its head moves to a
/// commit that is not a descendant of the previous head.
pub fn ancestry_count(commits: &BTreeMap<String, CommitEntry>, head: &str) -> i64 {
	let mut count = 0;
	let mut cursor = head.to_string();
	while !cursor.is_empty() {
		match commits.get(&cursor) {
			Some(commit) => {
				count += 1;
				cursor = commit.parent.clone();
			}
			None => break,
		}
	}
	count
}

/// Number of distinct author emails across a commit list.
pub fn contributor_count(commits: &BTreeMap<String, CommitEntry>) -> i64 {
	let mut emails: Vec<&str> = commits.values().map(|c| c.author_email.as_str()).collect();
	emails.sort_unstable();
	emails.dedup();
	emails.len() as i64
}

/// Construct the single-entry tree referencing an uploaded blob.
pub fn blob_tree(
	name: &str,
	sha256: &str,
	size: i64,
	last_modified: DateTime<Utc>,
	licence_sha: Option<String>,
) -> CommitTree {
	CommitTree {
		entries: vec![TreeEntry {
			name: name.to_string(),
			sha256: sha256.to_string(),
			size,
			last_modified,
			licence_sha,
		}],
	}
}

fn rfc3339(ts: &DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// Empty values serialise as the bare key so no line carries trailing
// whitespace.
fn push_field(out: &mut String, key: &str, value: &str) {
	out.push_str(key);
	if !value.is_empty() {
		out.push(' ');
		out.push_str(value);
	}
	out.push('\n');
}

fn sha256_hex(input: &str) -> String {
	hex::encode(Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use proptest::prelude::*;

	fn sample_tree() -> CommitTree {
		blob_tree(
			"weather.sqlite",
			"ab".repeat(32).as_str(),
			2048,
			Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
			None,
		)
	}

	#[test]
	fn test_commit_id_is_64_hex() {
		let commit = build_commit(
			sample_tree(),
			None,
			"Alice",
			"alice@example.com",
			"Initial commit",
			Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
		);
		assert_eq!(commit.id.len(), 64);
		assert!(commit.id.chars().all(|c| c.is_ascii_hexdigit()));
		assert_eq!(commit.id, commit.id.to_lowercase());
	}

	#[test]
	fn test_commit_id_ignores_stored_id() {
		let mut commit = build_commit(
			sample_tree(),
			None,
			"Alice",
			"alice@example.com",
			"Initial commit",
			Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
		);
		let original = commit.id.clone();
		commit.id = "0".repeat(64);
		assert_eq!(commit_id(&commit), original);
	}

	#[test]
	fn test_parent_changes_commit_id() {
		let ts = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
		let root = build_commit(sample_tree(), None, "Alice", "alice@example.com", "c1", ts);
		let child = build_commit(
			sample_tree(),
			Some(&root.id),
			"Alice",
			"alice@example.com",
			"c1",
			ts,
		);
		assert_ne!(root.id, child.id);
		assert_eq!(child.parent, root.id);
	}

	#[test]
	fn test_ancestry_count_walks_first_parents() {
		let ts = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
		let c1 = build_commit(sample_tree(), None, "Alice", "alice@example.com", "c1", ts);
		let c2 = build_commit(
			sample_tree(),
			Some(&c1.id),
			"Alice",
			"alice@example.com",
			"c2",
			ts,
		);
		let c3 = build_commit(
			sample_tree(),
			Some(&c2.id),
			"Bob",
			"bob@example.com",
			"c3",
			ts,
		);

		let mut commits = BTreeMap::new();
		for c in [&c1, &c2, &c3] {
			commits.insert(c.id.clone(), c.clone());
		}

		assert_eq!(ancestry_count(&commits, &c3.id), 3);
		assert_eq!(ancestry_count(&commits, &c2.id), 2);
		assert_eq!(ancestry_count(&commits, ""), 0);
		assert_eq!(contributor_count(&commits), 2);
	}

	proptest! {
		// A commit id computed twice from the same inputs matches
		// byte-for-byte.
		#[test]
		fn commit_id_is_deterministic(
			message in ".{0,200}",
			author in "[a-z]{1,16}",
			email in "[a-z]{1,16}@[a-z]{1,8}\\.com",
			secs in 0i64..4_000_000_000,
		) {
			let ts = Utc.timestamp_opt(secs, 0).unwrap();
			let a = build_commit(sample_tree(), None, &author, &email, &message, ts);
			let b = build_commit(sample_tree(), None, &author, &email, &message, ts);
			prop_assert_eq!(a.id, b.id);
		}

		#[test]
		fn distinct_messages_hash_differently(
			m1 in "[a-z]{1,32}",
			m2 in "[A-Z]{1,32}",
		) {
			let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
			let a = build_commit(sample_tree(), None, "a", "a@a.com", &m1, ts);
			let b = build_commit(sample_tree(), None, "a", "a@a.com", &m2, ts);
			prop_assert_ne!(a.id, b.id);
		}
	}
}
