// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User repository.
//!
//! Usernames are unique case-insensitively and never change once created.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use crate::error::{DbError, Result};

/// A user account row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
	pub id: String,
	pub username: String,
	pub display_name: String,
	pub email: String,
	pub avatar_url: Option<String>,
	/// Bucket holding this user's live database bodies, when provisioned.
	pub live_bucket: Option<String>,
	/// Name of the usage-limits profile applied to this user.
	pub limits_profile: String,
	pub date_joined: DateTime<Utc>,
}

#[derive(Clone)]
pub struct UserRepository {
	pool: SqlitePool,
}

impl UserRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self), fields(username = %username))]
	pub async fn create_user(
		&self,
		username: &str,
		display_name: &str,
		email: &str,
	) -> Result<UserRow> {
		let id = Uuid::new_v4().to_string();
		let now = Utc::now();

		sqlx::query(
			r#"
			INSERT INTO users (id, username, display_name, email, date_joined)
			VALUES (?, ?, ?, ?, ?)
			"#,
		)
		.bind(&id)
		.bind(username)
		.bind(display_name)
		.bind(email)
		.bind(now.to_rfc3339_opts(SecondsFormat::Secs, true))
		.execute(&self.pool)
		.await?;

		tracing::debug!(user_id = %id, "user created");
		self
			.get_by_id(&id)
			.await?
			.ok_or_else(|| DbError::Internal("user vanished after insert".to_string()))
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_by_id(&self, id: &str) -> Result<Option<UserRow>> {
		let row = sqlx::query(
			r#"
			SELECT id, username, display_name, email, avatar_url, live_bucket,
			       limits_profile, date_joined
			FROM users
			WHERE id = ?
			"#,
		)
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| parse_user_row(&r)).transpose()
	}

	/// Look up a user by name, case-insensitively.
	#[tracing::instrument(skip(self))]
	pub async fn get_by_username(&self, username: &str) -> Result<Option<UserRow>> {
		let row = sqlx::query(
			r#"
			SELECT id, username, display_name, email, avatar_url, live_bucket,
			       limits_profile, date_joined
			FROM users
			WHERE username = ? COLLATE NOCASE
			"#,
		)
		.bind(username)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| parse_user_row(&r)).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn set_limits_profile(&self, user_id: &str, profile: &str) -> Result<()> {
		let result = sqlx::query("UPDATE users SET limits_profile = ? WHERE id = ?")
			.bind(profile)
			.bind(user_id)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(user_id.to_string()));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn set_live_bucket(&self, user_id: &str, bucket: &str) -> Result<()> {
		sqlx::query("UPDATE users SET live_bucket = ? WHERE id = ?")
			.bind(bucket)
			.bind(user_id)
			.execute(&self.pool)
			.await?;
		Ok(())
	}
}

fn parse_user_row(row: &SqliteRow) -> Result<UserRow> {
	let date_joined_str: String = row.get("date_joined");
	let date_joined = DateTime::parse_from_rfc3339(&date_joined_str)
		.map_err(|e| DbError::Internal(format!("Invalid date_joined: {e}")))?
		.with_timezone(&Utc);

	Ok(UserRow {
		id: row.get("id"),
		username: row.get("username"),
		display_name: row.get("display_name"),
		email: row.get("email"),
		avatar_url: row.get("avatar_url"),
		live_bucket: row.get("live_bucket"),
		limits_profile: row.get("limits_profile"),
		date_joined,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_migrated_pool;

	#[tokio::test]
	async fn test_create_and_get_user() {
		let pool = create_migrated_pool().await;
		let repo = UserRepository::new(pool);

		let user = repo
			.create_user("alice", "Alice", "alice@example.com")
			.await
			.unwrap();
		assert_eq!(user.username, "alice");
		assert_eq!(user.limits_profile, "default");

		let fetched = repo.get_by_id(&user.id).await.unwrap().unwrap();
		assert_eq!(fetched.email, "alice@example.com");
	}

	#[tokio::test]
	async fn test_username_lookup_is_case_insensitive() {
		let pool = create_migrated_pool().await;
		let repo = UserRepository::new(pool);

		repo
			.create_user("Alice", "Alice", "alice@example.com")
			.await
			.unwrap();

		let fetched = repo.get_by_username("aLiCe").await.unwrap();
		assert!(fetched.is_some());
	}

	#[tokio::test]
	async fn test_duplicate_username_rejected_case_insensitively() {
		let pool = create_migrated_pool().await;
		let repo = UserRepository::new(pool);

		repo
			.create_user("alice", "Alice", "alice@example.com")
			.await
			.unwrap();
		let result = repo.create_user("ALICE", "Alice", "other@example.com").await;
		assert!(result.is_err());
	}

	#[tokio::test]
	async fn test_set_limits_profile_not_found() {
		let pool = create_migrated_pool().await;
		let repo = UserRepository::new(pool);

		let result = repo.set_limits_profile("missing", "unlimited").await;
		assert!(matches!(result, Err(DbError::NotFound(_))));
	}
}
