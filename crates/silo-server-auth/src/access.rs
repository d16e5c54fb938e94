// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-database access decisions.
//!
//! The decision order is fixed: resolve the row, owner wins, public reads
//! win, anonymous callers are denied, then the share row (if any) decides.
//! Deleted databases resolve exactly like databases that never existed.

use silo_server_db::{DatabaseRepository, DatabaseRow, ShareRepository};

use crate::error::Result;

/// Outcome of an access check.
#[derive(Debug)]
pub enum AccessDecision {
	/// Access granted; carries the resolved row so handlers do not look it
	/// up twice.
	Allow(Box<DatabaseRow>),
	/// The database exists and is visible, but the caller lacks the
	/// requested mode.
	Deny,
	/// No such database, or invisible to this caller.
	NotFound,
}

#[derive(Clone)]
pub struct AccessControl {
	databases: DatabaseRepository,
	shares: ShareRepository,
}

impl AccessControl {
	pub fn new(databases: DatabaseRepository, shares: ShareRepository) -> Self {
		Self { databases, shares }
	}

	/// Decide whether `caller` may access `owner/name`.
	///
	/// `caller` is `(user_id, username)`; pass `None` for anonymous.
	#[tracing::instrument(skip(self))]
	pub async fn may_access(
		&self,
		caller: Option<(&str, &str)>,
		owner: &str,
		name: &str,
		write_required: bool,
	) -> Result<AccessDecision> {
		let Some(db) = self.databases.get_by_owner_name(owner, name).await? else {
			return Ok(AccessDecision::NotFound);
		};

		if let Some((_, username)) = caller {
			if username.eq_ignore_ascii_case(&db.owner_name) {
				return Ok(AccessDecision::Allow(Box::new(db)));
			}
		}

		if !write_required && db.public {
			return Ok(AccessDecision::Allow(Box::new(db)));
		}

		let Some((user_id, _)) = caller else {
			return Ok(AccessDecision::Deny);
		};

		match self.shares.get_share(&db.id, user_id).await? {
			Some(permission) if !write_required || permission.allows_write() => {
				Ok(AccessDecision::Allow(Box::new(db)))
			}
			Some(_) => Ok(AccessDecision::Deny),
			None => Ok(AccessDecision::Deny),
		}
	}
}
