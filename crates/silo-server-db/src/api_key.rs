// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! API key repository.
//!
//! Only the SHA-256 of an opaque key is ever stored; lookup is by hash. Keys
//! optionally expire and carry a read-only or read-write permission.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::types::Permission;

/// The owner and permission a key hash resolves to.
#[derive(Debug, Clone)]
pub struct ResolvedKey {
	pub key_id: String,
	pub user_id: String,
	pub username: String,
	pub permission: Permission,
	pub expires_at: Option<DateTime<Utc>>,
}

impl ResolvedKey {
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		self.expires_at.is_some_and(|e| e <= now)
	}
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
	async fn create_api_key(
		&self,
		user_id: &str,
		key_hash: &str,
		permission: Permission,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<String>;
	async fn get_by_hash(&self, key_hash: &str) -> Result<Option<ResolvedKey>>;
	async fn delete_api_key(&self, id: &str) -> Result<bool>;
}

/// Repository for API key database operations.
///
/// All keys are stored as hashes, never in plaintext.
#[derive(Clone)]
pub struct ApiKeyRepository {
	pool: SqlitePool,
}

impl ApiKeyRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, key_hash), fields(user_id = %user_id))]
	pub async fn create_api_key(
		&self,
		user_id: &str,
		key_hash: &str,
		permission: Permission,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<String> {
		let id = Uuid::new_v4().to_string();
		let now = Utc::now();

		sqlx::query(
			r#"
			INSERT INTO api_keys (id, user_id, key_hash, permission, created_at, expires_at)
			VALUES (?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&id)
		.bind(user_id)
		.bind(key_hash)
		.bind(permission.as_str())
		.bind(now.to_rfc3339_opts(SecondsFormat::Secs, true))
		.bind(expires_at.map(|e| e.to_rfc3339_opts(SecondsFormat::Secs, true)))
		.execute(&self.pool)
		.await?;

		tracing::debug!(api_key_id = %id, "API key created");
		Ok(id)
	}

	/// Resolve a key hash to its owner.
	///
	/// Returns the row regardless of expiry; the caller decides what an
	/// expired key means.
	#[tracing::instrument(skip(self, key_hash))]
	pub async fn get_by_hash(&self, key_hash: &str) -> Result<Option<ResolvedKey>> {
		let row = sqlx::query(
			r#"
			SELECT k.id, k.user_id, k.permission, k.expires_at, u.username
			FROM api_keys k
			JOIN users u ON u.id = k.user_id
			WHERE k.key_hash = ?
			"#,
		)
		.bind(key_hash)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| parse_resolved_key(&r)).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_api_key(&self, id: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM api_keys WHERE id = ?")
			.bind(id)
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected() > 0)
	}
}

#[async_trait]
impl ApiKeyStore for ApiKeyRepository {
	async fn create_api_key(
		&self,
		user_id: &str,
		key_hash: &str,
		permission: Permission,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<String> {
		self
			.create_api_key(user_id, key_hash, permission, expires_at)
			.await
	}

	async fn get_by_hash(&self, key_hash: &str) -> Result<Option<ResolvedKey>> {
		self.get_by_hash(key_hash).await
	}

	async fn delete_api_key(&self, id: &str) -> Result<bool> {
		self.delete_api_key(id).await
	}
}

fn parse_resolved_key(row: &SqliteRow) -> Result<ResolvedKey> {
	let permission_str: String = row.get("permission");
	let permission = Permission::from_str(&permission_str).map_err(DbError::Internal)?;

	let expires_at: Option<String> = row.get("expires_at");
	let expires_at = expires_at
		.map(|s| {
			DateTime::parse_from_rfc3339(&s)
				.map(|dt| dt.with_timezone(&Utc))
				.map_err(|e| DbError::Internal(format!("Invalid expires_at: {e}")))
		})
		.transpose()?;

	Ok(ResolvedKey {
		key_id: row.get("id"),
		user_id: row.get("user_id"),
		username: row.get("username"),
		permission,
		expires_at,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_migrated_pool, seed_user};
	use proptest::prelude::*;
	use std::collections::HashSet;

	#[tokio::test]
	async fn test_create_and_resolve_by_hash() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let repo = ApiKeyRepository::new(pool);

		let id = repo
			.create_api_key(&alice.id, "hash123", Permission::ReadWrite, None)
			.await
			.unwrap();

		let resolved = repo.get_by_hash("hash123").await.unwrap().unwrap();
		assert_eq!(resolved.key_id, id);
		assert_eq!(resolved.username, "alice");
		assert_eq!(resolved.permission, Permission::ReadWrite);
		assert!(!resolved.is_expired(Utc::now()));
	}

	#[tokio::test]
	async fn test_unknown_hash_resolves_to_none() {
		let pool = create_migrated_pool().await;
		let repo = ApiKeyRepository::new(pool);

		assert!(repo.get_by_hash("missing").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_expired_key_reported() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let repo = ApiKeyRepository::new(pool);

		let past = Utc::now() - chrono::Duration::hours(1);
		repo
			.create_api_key(&alice.id, "stale", Permission::ReadOnly, Some(past))
			.await
			.unwrap();

		let resolved = repo.get_by_hash("stale").await.unwrap().unwrap();
		assert!(resolved.is_expired(Utc::now()));
	}

	#[tokio::test]
	async fn test_delete_api_key() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let repo = ApiKeyRepository::new(pool);

		let id = repo
			.create_api_key(&alice.id, "gone", Permission::ReadOnly, None)
			.await
			.unwrap();

		assert!(repo.delete_api_key(&id).await.unwrap());
		assert!(!repo.delete_api_key(&id).await.unwrap());
		assert!(repo.get_by_hash("gone").await.unwrap().is_none());
	}

	proptest! {
		#[test]
		fn key_hashing_is_deterministic(input in ".*") {
			use sha2::{Digest, Sha256};
			let h1 = hex::encode(Sha256::digest(input.as_bytes()));
			let h2 = hex::encode(Sha256::digest(input.as_bytes()));
			prop_assert_eq!(h1, h2);
		}

		#[test]
		fn generated_key_ids_are_unique(count in 1..200usize) {
			let mut ids = HashSet::new();
			for _ in 0..count {
				prop_assert!(ids.insert(Uuid::new_v4().to_string()));
			}
		}
	}
}
