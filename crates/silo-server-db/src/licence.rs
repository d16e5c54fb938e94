// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Licence repository.
//!
//! Licences are scoped by owner, with system licences owned by the reserved
//! `default` user. A licence is addressed by friendly name for humans and by
//! the SHA-256 of its text for commit trees.

use sha2::{Digest, Sha256};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::error::Result;
use crate::migrations::DEFAULT_USER;

#[derive(Debug, Clone)]
pub struct LicenceRow {
	pub owner_id: String,
	pub friendly_name: String,
	pub sha256: String,
	pub licence_text: String,
	pub display_order: i64,
}

#[derive(Clone)]
pub struct LicenceRepository {
	pool: SqlitePool,
}

impl LicenceRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, licence_text))]
	pub async fn upsert(
		&self,
		owner_id: &str,
		friendly_name: &str,
		licence_text: &str,
		display_order: i64,
	) -> Result<String> {
		let sha = hex::encode(Sha256::digest(licence_text.as_bytes()));

		sqlx::query(
			r#"
			INSERT INTO licences (owner_id, friendly_name, sha256, licence_text, display_order)
			VALUES (?, ?, ?, ?, ?)
			ON CONFLICT(owner_id, friendly_name) DO UPDATE SET
				sha256 = excluded.sha256,
				licence_text = excluded.licence_text,
				display_order = excluded.display_order
			"#,
		)
		.bind(owner_id)
		.bind(friendly_name)
		.bind(&sha)
		.bind(licence_text)
		.bind(display_order)
		.execute(&self.pool)
		.await?;

		tracing::debug!(friendly_name = %friendly_name, sha256 = %sha, "licence stored");
		Ok(sha)
	}

	/// Resolve a friendly name, trying the owner first and falling back to
	/// the system licences under the `default` user.
	#[tracing::instrument(skip(self))]
	pub async fn get_by_name(&self, owner_id: &str, friendly_name: &str) -> Result<Option<LicenceRow>> {
		let row = sqlx::query(
			r#"
			SELECT l.owner_id, l.friendly_name, l.sha256, l.licence_text, l.display_order
			FROM licences l
			WHERE l.friendly_name = ?
			  AND (l.owner_id = ? OR l.owner_id = (SELECT id FROM users WHERE username = ?))
			ORDER BY CASE WHEN l.owner_id = ? THEN 0 ELSE 1 END
			LIMIT 1
			"#,
		)
		.bind(friendly_name)
		.bind(owner_id)
		.bind(DEFAULT_USER)
		.bind(owner_id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.map(|r| parse_licence_row(&r)))
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_by_sha(&self, sha256: &str) -> Result<Option<LicenceRow>> {
		let row = sqlx::query(
			r#"
			SELECT owner_id, friendly_name, sha256, licence_text, display_order
			FROM licences
			WHERE sha256 = ?
			LIMIT 1
			"#,
		)
		.bind(sha256)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.map(|r| parse_licence_row(&r)))
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<LicenceRow>> {
		let rows = sqlx::query(
			r#"
			SELECT owner_id, friendly_name, sha256, licence_text, display_order
			FROM licences
			WHERE owner_id = ?
			ORDER BY display_order, friendly_name
			"#,
		)
		.bind(owner_id)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.iter().map(parse_licence_row).collect())
	}
}

fn parse_licence_row(row: &SqliteRow) -> LicenceRow {
	LicenceRow {
		owner_id: row.get("owner_id"),
		friendly_name: row.get("friendly_name"),
		sha256: row.get("sha256"),
		licence_text: row.get("licence_text"),
		display_order: row.get("display_order"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_migrated_pool, seed_user};

	async fn default_user_id(pool: &SqlitePool) -> String {
		let (id,): (String,) = sqlx::query_as("SELECT id FROM users WHERE username = 'default'")
			.fetch_one(pool)
			.await
			.unwrap();
		id
	}

	#[tokio::test]
	async fn test_upsert_and_lookup_by_sha() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let repo = LicenceRepository::new(pool);

		let sha = repo
			.upsert(&alice.id, "CC0", "Creative Commons Zero v1.0", 1)
			.await
			.unwrap();
		assert_eq!(sha.len(), 64);

		let row = repo.get_by_sha(&sha).await.unwrap().unwrap();
		assert_eq!(row.friendly_name, "CC0");
	}

	#[tokio::test]
	async fn test_owner_licence_shadows_system_licence() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let system = default_user_id(&pool).await;
		let repo = LicenceRepository::new(pool);

		repo.upsert(&system, "MIT", "system text", 0).await.unwrap();
		repo.upsert(&alice.id, "MIT", "alice text", 0).await.unwrap();

		let row = repo.get_by_name(&alice.id, "MIT").await.unwrap().unwrap();
		assert_eq!(row.licence_text, "alice text");
	}

	#[tokio::test]
	async fn test_system_licence_fallback() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let system = default_user_id(&pool).await;
		let repo = LicenceRepository::new(pool);

		repo
			.upsert(&system, "Apache-2.0", "apache text", 0)
			.await
			.unwrap();

		let row = repo
			.get_by_name(&alice.id, "Apache-2.0")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(row.licence_text, "apache text");
		assert!(repo.get_by_name(&alice.id, "GPL-3.0").await.unwrap().is_none());
	}
}
