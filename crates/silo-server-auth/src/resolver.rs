// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential resolver.
//!
//! The opaque secret never reaches the store: it is hashed with SHA-256 and
//! the hash is looked up directly. There is no in-process credential cache;
//! keys may be revoked at any moment and every request re-resolves.

use chrono::Utc;
use sha2::{Digest, Sha256};
use silo_server_db::ApiKeyRepository;

use crate::error::{AuthError, Result};
use crate::types::Caller;

/// SHA-256 of an opaque API key, lowercase hex.
pub fn hash_key(secret: &str) -> String {
	hex::encode(Sha256::digest(secret.as_bytes()))
}

#[derive(Clone)]
pub struct CredentialResolver {
	keys: ApiKeyRepository,
}

impl CredentialResolver {
	pub fn new(keys: ApiKeyRepository) -> Self {
		Self { keys }
	}

	/// Resolve an opaque secret into its caller.
	///
	/// Missing, unknown and expired keys all fail with the same
	/// [`AuthError::Unauthenticated`].
	#[tracing::instrument(skip(self, secret))]
	pub async fn resolve(&self, secret: &str) -> Result<Caller> {
		if secret.is_empty() {
			return Err(AuthError::Unauthenticated);
		}

		let resolved = self
			.keys
			.get_by_hash(&hash_key(secret))
			.await?
			.ok_or(AuthError::Unauthenticated)?;

		if resolved.is_expired(Utc::now()) {
			return Err(AuthError::Unauthenticated);
		}

		Ok(Caller {
			user_id: resolved.user_id,
			username: resolved.username,
			key_id: resolved.key_id,
			permission: resolved.permission,
		})
	}
}
