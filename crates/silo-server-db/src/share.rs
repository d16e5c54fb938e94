// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Share repository.
//!
//! A share row `(database, user) → permission` grants access; absence
//! denies, unless the database is public and the request is a read.

use sqlx::SqlitePool;
use std::str::FromStr;

use crate::error::{DbError, Result};
use crate::types::Permission;

#[derive(Clone)]
pub struct ShareRepository {
	pool: SqlitePool,
}

impl ShareRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn set_share(
		&self,
		database_id: &str,
		user_id: &str,
		permission: Permission,
	) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO shares (database_id, user_id, permission)
			VALUES (?, ?, ?)
			ON CONFLICT(database_id, user_id) DO UPDATE SET permission = excluded.permission
			"#,
		)
		.bind(database_id)
		.bind(user_id)
		.bind(permission.as_str())
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_share(&self, database_id: &str, user_id: &str) -> Result<Option<Permission>> {
		let row: Option<(String,)> =
			sqlx::query_as("SELECT permission FROM shares WHERE database_id = ? AND user_id = ?")
				.bind(database_id)
				.bind(user_id)
				.fetch_optional(&self.pool)
				.await?;

		row
			.map(|(p,)| Permission::from_str(&p).map_err(DbError::Internal))
			.transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn remove_share(&self, database_id: &str, user_id: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM shares WHERE database_id = ? AND user_id = ?")
			.bind(database_id)
			.bind(user_id)
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected() > 0)
	}

	/// All share grants for a database as `(user_id, permission)` pairs.
	#[tracing::instrument(skip(self))]
	pub async fn list_for_database(&self, database_id: &str) -> Result<Vec<(String, Permission)>> {
		let rows: Vec<(String, String)> = sqlx::query_as(
			"SELECT user_id, permission FROM shares WHERE database_id = ? ORDER BY user_id",
		)
		.bind(database_id)
		.fetch_all(&self.pool)
		.await?;

		rows
			.into_iter()
			.map(|(user_id, p)| {
				Permission::from_str(&p)
					.map(|perm| (user_id, perm))
					.map_err(DbError::Internal)
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_migrated_pool;

	#[tokio::test]
	async fn test_set_get_and_upgrade_share() {
		let pool = create_migrated_pool().await;
		let repo = ShareRepository::new(pool);

		assert!(repo.get_share("db-1", "u-1").await.unwrap().is_none());

		repo
			.set_share("db-1", "u-1", Permission::ReadOnly)
			.await
			.unwrap();
		assert_eq!(
			repo.get_share("db-1", "u-1").await.unwrap(),
			Some(Permission::ReadOnly)
		);

		repo
			.set_share("db-1", "u-1", Permission::ReadWrite)
			.await
			.unwrap();
		assert_eq!(
			repo.get_share("db-1", "u-1").await.unwrap(),
			Some(Permission::ReadWrite)
		);
	}

	#[tokio::test]
	async fn test_remove_share() {
		let pool = create_migrated_pool().await;
		let repo = ShareRepository::new(pool);

		repo
			.set_share("db-1", "u-1", Permission::ReadOnly)
			.await
			.unwrap();
		assert!(repo.remove_share("db-1", "u-1").await.unwrap());
		assert!(!repo.remove_share("db-1", "u-1").await.unwrap());
		assert!(repo.get_share("db-1", "u-1").await.unwrap().is_none());
	}
}
