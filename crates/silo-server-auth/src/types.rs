// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use silo_server_db::Permission;

/// The authenticated identity behind a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
	pub user_id: String,
	pub username: String,
	/// UUID of the API key that authenticated this request.
	pub key_id: String,
	/// Permission carried by the key itself, before any share grants.
	pub permission: Permission,
}

impl Caller {
	/// Whether the key allows mutating operations at all.
	pub fn key_allows_write(&self) -> bool {
		self.permission.allows_write()
	}
}
