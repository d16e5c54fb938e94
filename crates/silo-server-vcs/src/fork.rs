// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fork tree rendering.
//!
//! All databases sharing a `root_database` form a tree through their
//! `forked_from` references. The walk emits rows in parent-first order, each
//! carrying an icon stream describing its position relative to siblings so a
//! renderer can draw the tree without re-deriving structure.

use serde::{Deserialize, Serialize};

/// One icon in a fork row's indentation stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForkIcon {
	Space,
	Root,
	Stem,
	Branch,
	End,
}

/// Input row for the fork tree walk.
#[derive(Debug, Clone)]
pub struct ForkSource {
	pub id: String,
	pub owner: String,
	pub name: String,
	pub forked_from: Option<String>,
	pub public: bool,
	pub deleted: bool,
}

/// Rendered row of the fork tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkTreeRow {
	pub database_id: String,
	pub owner: String,
	pub name: String,
	pub icons: Vec<ForkIcon>,
}

/// Walk the fork tree rooted at the row without an in-set parent.
///
/// Private forks render as "private database" to everyone but their owner;
/// deleted forks render as "deleted database". The walk is iterative: a map
/// of `id → children` plus an explicit stack of pending rows.
pub fn render_fork_tree(rows: &[ForkSource], viewer: Option<&str>) -> Vec<ForkTreeRow> {
	let ids: std::collections::HashSet<&str> = rows.iter().map(|r| r.id.as_str()).collect();

	let mut children: std::collections::HashMap<&str, Vec<&ForkSource>> =
		std::collections::HashMap::new();
	let mut roots: Vec<&ForkSource> = Vec::new();
	for row in rows {
		match row.forked_from.as_deref().filter(|p| ids.contains(p)) {
			Some(parent) => children.entry(parent).or_default().push(row),
			None => roots.push(row),
		}
	}

	// Stack entries carry the depth, the icon prefix inherited from
	// ancestors, and whether this row is the last among its siblings.
	let mut out = Vec::with_capacity(rows.len());
	let mut stack: Vec<(&ForkSource, usize, Vec<ForkIcon>, bool)> = Vec::new();
	for root in roots.iter().rev() {
		stack.push((root, 0, Vec::new(), true));
	}

	while let Some((row, depth, prefix, is_last)) = stack.pop() {
		let mut icons = prefix.clone();
		if depth == 0 {
			icons.push(ForkIcon::Root);
		} else if is_last {
			icons.push(ForkIcon::End);
		} else {
			icons.push(ForkIcon::Branch);
		}

		out.push(present(row, viewer, icons));

		// The root contributes no indentation to its children; deeper rows
		// extend the prefix with a stem while more siblings follow.
		let mut child_prefix = prefix;
		if depth > 0 {
			child_prefix.push(if is_last { ForkIcon::Space } else { ForkIcon::Stem });
		}

		if let Some(kids) = children.get(row.id.as_str()) {
			let count = kids.len();
			for (idx, kid) in kids.iter().enumerate().rev() {
				stack.push((kid, depth + 1, child_prefix.clone(), idx == count - 1));
			}
		}
	}

	out
}

fn present(row: &ForkSource, viewer: Option<&str>, icons: Vec<ForkIcon>) -> ForkTreeRow {
	if row.deleted {
		return ForkTreeRow {
			database_id: String::new(),
			owner: String::new(),
			name: "deleted database".to_string(),
			icons,
		};
	}

	let visible = row.public || viewer.is_some_and(|v| v.eq_ignore_ascii_case(&row.owner));
	if !visible {
		return ForkTreeRow {
			database_id: String::new(),
			owner: String::new(),
			name: "private database".to_string(),
			icons,
		};
	}

	ForkTreeRow {
		database_id: row.id.clone(),
		owner: row.owner.clone(),
		name: row.name.clone(),
		icons,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn source(id: &str, forked_from: Option<&str>) -> ForkSource {
		ForkSource {
			id: id.to_string(),
			owner: "alice".to_string(),
			name: format!("db-{id}"),
			forked_from: forked_from.map(|s| s.to_string()),
			public: true,
			deleted: false,
		}
	}

	#[test]
	fn test_single_root() {
		let rows = vec![source("1", None)];
		let tree = render_fork_tree(&rows, None);
		assert_eq!(tree.len(), 1);
		assert_eq!(tree[0].icons, vec![ForkIcon::Root]);
	}

	#[test]
	fn test_parent_first_order_with_siblings() {
		// 1 ── 2
		//  └── 3 ── 4
		let rows = vec![
			source("1", None),
			source("2", Some("1")),
			source("3", Some("1")),
			source("4", Some("3")),
		];
		let tree = render_fork_tree(&rows, None);
		let ids: Vec<&str> = tree.iter().map(|r| r.database_id.as_str()).collect();
		assert_eq!(ids, vec!["1", "2", "3", "4"]);

		assert_eq!(tree[1].icons, vec![ForkIcon::Branch]);
		assert_eq!(tree[2].icons, vec![ForkIcon::End]);
		assert_eq!(tree[3].icons, vec![ForkIcon::Space, ForkIcon::End]);
	}

	#[test]
	fn test_stem_under_non_last_sibling() {
		// 1 ── 2 ── 4
		//  └── 3
		let rows = vec![
			source("1", None),
			source("2", Some("1")),
			source("3", Some("1")),
			source("4", Some("2")),
		];
		let tree = render_fork_tree(&rows, None);
		let ids: Vec<&str> = tree.iter().map(|r| r.database_id.as_str()).collect();
		assert_eq!(ids, vec!["1", "2", "4", "3"]);
		assert_eq!(tree[2].icons, vec![ForkIcon::Stem, ForkIcon::End]);
	}

	#[test]
	fn test_private_fork_hidden_from_strangers() {
		let mut fork = source("2", Some("1"));
		fork.public = false;
		fork.owner = "bob".to_string();
		let rows = vec![source("1", None), fork];

		let tree = render_fork_tree(&rows, Some("alice"));
		assert_eq!(tree[1].name, "private database");
		assert!(tree[1].database_id.is_empty());

		let tree = render_fork_tree(&rows, Some("bob"));
		assert_eq!(tree[1].name, "db-2");
	}

	#[test]
	fn test_deleted_fork_shown_as_deleted() {
		let mut fork = source("2", Some("1"));
		fork.deleted = true;
		let rows = vec![source("1", None), fork];
		let tree = render_fork_tree(&rows, Some("alice"));
		assert_eq!(tree[1].name, "deleted database");
	}
}
