// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Test pools for repository tests.

use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use crate::migrations::run_migrations;
use crate::user::UserRow;

// A single long-lived connection: every pooled connection to ":memory:"
// would otherwise see its own empty database.
pub async fn create_test_pool() -> SqlitePool {
	SqlitePoolOptions::new()
		.max_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect(":memory:")
		.await
		.unwrap()
}

/// In-memory pool with the full schema and seed rows applied.
pub async fn create_migrated_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	run_migrations(&pool).await.unwrap();
	pool
}

/// Insert a user directly, bypassing the repository under test.
pub async fn seed_user(pool: &SqlitePool, username: &str) -> UserRow {
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
	.bind(username)
	.bind(format!("{username}@example.com"))
	.bind(now.to_rfc3339_opts(SecondsFormat::Secs, true))
	.execute(pool)
	.await
	.unwrap();

	UserRow {
		id,
		username: username.to_string(),
		display_name: username.to_string(),
		email: format!("{username}@example.com"),
		avatar_url: None,
		live_bucket: None,
		limits_profile: "default".to_string(),
		date_joined: now,
	}
}
