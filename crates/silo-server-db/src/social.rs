// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stars and watchers.
//!
//! The membership tables are the source of truth; the counters on the
//! database row are recomputed from them after every change.

use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;

use crate::error::Result;

#[derive(Clone)]
pub struct SocialRepository {
	pool: SqlitePool,
}

impl SocialRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Star or unstar a database. Returns the new star count.
	#[tracing::instrument(skip(self))]
	pub async fn set_starred(&self, database_id: &str, user_id: &str, starred: bool) -> Result<i64> {
		self
			.set_membership("database_stars", database_id, user_id, starred)
			.await?;
		self.recount(database_id, "stars", "database_stars").await
	}

	/// Watch or unwatch a database. Returns the new watcher count.
	#[tracing::instrument(skip(self))]
	pub async fn set_watched(&self, database_id: &str, user_id: &str, watched: bool) -> Result<i64> {
		self
			.set_membership("database_watchers", database_id, user_id, watched)
			.await?;
		self
			.recount(database_id, "watchers", "database_watchers")
			.await
	}

	#[tracing::instrument(skip(self))]
	pub async fn is_starred(&self, database_id: &str, user_id: &str) -> Result<bool> {
		let (count,): (i64,) = sqlx::query_as(
			"SELECT COUNT(*) FROM database_stars WHERE database_id = ? AND user_id = ?",
		)
		.bind(database_id)
		.bind(user_id)
		.fetch_one(&self.pool)
		.await?;
		Ok(count > 0)
	}

	#[tracing::instrument(skip(self))]
	pub async fn is_watched(&self, database_id: &str, user_id: &str) -> Result<bool> {
		let (count,): (i64,) = sqlx::query_as(
			"SELECT COUNT(*) FROM database_watchers WHERE database_id = ? AND user_id = ?",
		)
		.bind(database_id)
		.bind(user_id)
		.fetch_one(&self.pool)
		.await?;
		Ok(count > 0)
	}

	async fn set_membership(
		&self,
		table: &str,
		database_id: &str,
		user_id: &str,
		member: bool,
	) -> Result<()> {
		if member {
			let sql = format!(
				"INSERT OR IGNORE INTO {table} (database_id, user_id, created_at) VALUES (?, ?, ?)"
			);
			sqlx::query(&sql)
				.bind(database_id)
				.bind(user_id)
				.bind(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
				.execute(&self.pool)
				.await?;
		} else {
			let sql = format!("DELETE FROM {table} WHERE database_id = ? AND user_id = ?");
			sqlx::query(&sql)
				.bind(database_id)
				.bind(user_id)
				.execute(&self.pool)
				.await?;
		}
		Ok(())
	}

	async fn recount(&self, database_id: &str, column: &str, table: &str) -> Result<i64> {
		let sql = format!(
			"UPDATE databases SET {column} = (SELECT COUNT(*) FROM {table} WHERE database_id = ?) WHERE id = ?"
		);
		sqlx::query(&sql)
			.bind(database_id)
			.bind(database_id)
			.execute(&self.pool)
			.await?;

		let sql = format!("SELECT {column} FROM databases WHERE id = ?");
		let (count,): (i64,) = sqlx::query_as(&sql)
			.bind(database_id)
			.fetch_one(&self.pool)
			.await?;
		Ok(count)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::database::{DatabaseRepository, NewDatabase};
	use crate::testing::{create_migrated_pool, seed_user};

	async fn seeded_db(pool: &SqlitePool) -> String {
		let alice = seed_user(pool, "alice").await;
		DatabaseRepository::new(pool.clone())
			.insert(NewDatabase {
				owner_id: alice.id,
				name: "weather.sqlite".to_string(),
				public: true,
				default_branch: "main".to_string(),
				..Default::default()
			})
			.await
			.unwrap()
			.id
	}

	#[tokio::test]
	async fn test_star_and_unstar_recounts() {
		let pool = create_migrated_pool().await;
		let db_id = seeded_db(&pool).await;
		let bob = seed_user(&pool, "bob").await;
		let carol = seed_user(&pool, "carol").await;
		let repo = SocialRepository::new(pool);

		assert_eq!(repo.set_starred(&db_id, &bob.id, true).await.unwrap(), 1);
		assert_eq!(repo.set_starred(&db_id, &carol.id, true).await.unwrap(), 2);
		// Starring twice is a no-op.
		assert_eq!(repo.set_starred(&db_id, &bob.id, true).await.unwrap(), 2);
		assert!(repo.is_starred(&db_id, &bob.id).await.unwrap());

		assert_eq!(repo.set_starred(&db_id, &bob.id, false).await.unwrap(), 1);
		assert!(!repo.is_starred(&db_id, &bob.id).await.unwrap());
	}

	#[tokio::test]
	async fn test_watchers_tracked_separately() {
		let pool = create_migrated_pool().await;
		let db_id = seeded_db(&pool).await;
		let bob = seed_user(&pool, "bob").await;
		let repo = SocialRepository::new(pool);

		assert_eq!(repo.set_watched(&db_id, &bob.id, true).await.unwrap(), 1);
		assert!(repo.is_watched(&db_id, &bob.id).await.unwrap());
		assert!(!repo.is_starred(&db_id, &bob.id).await.unwrap());
	}
}
