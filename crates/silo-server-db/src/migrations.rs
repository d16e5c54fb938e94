// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Idempotent schema migrations.
//!
//! Every statement is `CREATE TABLE IF NOT EXISTS` (or the index/seed
//! equivalent) so `run_migrations` is safe to run on every startup.

use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{LimitPeriod, LimitRule};

/// Username owning system rows such as stock licences.
pub const DEFAULT_USER: &str = "default";

const TABLES: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS users (
		id TEXT PRIMARY KEY,
		username TEXT NOT NULL UNIQUE COLLATE NOCASE,
		display_name TEXT NOT NULL DEFAULT '',
		email TEXT NOT NULL DEFAULT '',
		avatar_url TEXT,
		live_bucket TEXT,
		limits_profile TEXT NOT NULL DEFAULT 'default',
		date_joined TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS api_keys (
		id TEXT PRIMARY KEY,
		user_id TEXT NOT NULL REFERENCES users(id),
		key_hash TEXT NOT NULL UNIQUE,
		permission TEXT NOT NULL CHECK (permission IN ('read_only', 'read_write')),
		created_at TEXT NOT NULL,
		expires_at TEXT
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS databases (
		id TEXT PRIMARY KEY,
		owner_id TEXT NOT NULL REFERENCES users(id),
		name TEXT NOT NULL,
		public INTEGER NOT NULL DEFAULT 0,
		live INTEGER NOT NULL DEFAULT 0,
		is_deleted INTEGER NOT NULL DEFAULT 0,
		forked_from TEXT,
		root_database TEXT NOT NULL,
		watchers INTEGER NOT NULL DEFAULT 0,
		stars INTEGER NOT NULL DEFAULT 0,
		forks INTEGER NOT NULL DEFAULT 0,
		discussions INTEGER NOT NULL DEFAULT 0,
		merge_requests INTEGER NOT NULL DEFAULT 0,
		download_count INTEGER NOT NULL DEFAULT 0,
		contributors INTEGER NOT NULL DEFAULT 1,
		default_branch TEXT NOT NULL DEFAULT 'main',
		default_table TEXT,
		licence_sha TEXT,
		source_url TEXT,
		live_node TEXT,
		live_blob TEXT,
		branch_heads TEXT NOT NULL DEFAULT '{}',
		commit_list TEXT NOT NULL DEFAULT '{}',
		tag_list TEXT NOT NULL DEFAULT '{}',
		release_list TEXT NOT NULL DEFAULT '{}',
		last_modified TEXT NOT NULL,
		created_at TEXT NOT NULL,
		UNIQUE (owner_id, name)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS shares (
		database_id TEXT NOT NULL REFERENCES databases(id) ON DELETE CASCADE,
		user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
		permission TEXT NOT NULL CHECK (permission IN ('read_only', 'read_write')),
		PRIMARY KEY (database_id, user_id)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS usage_profiles (
		name TEXT PRIMARY KEY,
		rules TEXT NOT NULL DEFAULT '[]'
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS rate_buckets (
		user_id TEXT NOT NULL,
		rule_idx INTEGER NOT NULL,
		tokens INTEGER NOT NULL,
		updated_at TEXT NOT NULL,
		PRIMARY KEY (user_id, rule_idx)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS licences (
		owner_id TEXT NOT NULL REFERENCES users(id),
		friendly_name TEXT NOT NULL,
		sha256 TEXT NOT NULL,
		licence_text TEXT NOT NULL,
		display_order INTEGER NOT NULL DEFAULT 0,
		PRIMARY KEY (owner_id, friendly_name)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS database_stars (
		database_id TEXT NOT NULL REFERENCES databases(id) ON DELETE CASCADE,
		user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
		created_at TEXT NOT NULL,
		PRIMARY KEY (database_id, user_id)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS database_watchers (
		database_id TEXT NOT NULL REFERENCES databases(id) ON DELETE CASCADE,
		user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
		created_at TEXT NOT NULL,
		PRIMARY KEY (database_id, user_id)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS api_log (
		id TEXT PRIMARY KEY,
		caller TEXT NOT NULL,
		endpoint TEXT NOT NULL,
		status INTEGER NOT NULL,
		latency_ms INTEGER NOT NULL,
		db_owner TEXT,
		db_name TEXT,
		created_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS database_uploads (
		id TEXT PRIMARY KEY,
		database_id TEXT NOT NULL,
		caller TEXT NOT NULL,
		created_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS database_downloads (
		id TEXT PRIMARY KEY,
		database_id TEXT NOT NULL,
		caller TEXT NOT NULL,
		created_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS query_log (
		id TEXT PRIMARY KEY,
		database_id TEXT NOT NULL,
		caller TEXT NOT NULL,
		sql_base64 TEXT NOT NULL,
		memory_hwm INTEGER NOT NULL DEFAULT 0,
		created_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS job_submissions (
		id TEXT PRIMARY KEY,
		submitter_node TEXT NOT NULL,
		target_node TEXT NOT NULL,
		db_owner TEXT NOT NULL,
		db_name TEXT NOT NULL,
		operation TEXT NOT NULL,
		payload TEXT NOT NULL,
		state TEXT NOT NULL DEFAULT 'pending'
			CHECK (state IN ('pending', 'claimed', 'complete', 'failed')),
		renotified INTEGER NOT NULL DEFAULT 0,
		created_at TEXT NOT NULL,
		claimed_at TEXT
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS job_responses (
		submission_id TEXT PRIMARY KEY,
		submitter_node TEXT NOT NULL,
		payload TEXT NOT NULL,
		written_at TEXT NOT NULL,
		delivered_at TEXT
	)
	"#,
];

const INDEXES: &[&str] = &[
	"CREATE INDEX IF NOT EXISTS idx_api_keys_hash ON api_keys(key_hash)",
	"CREATE INDEX IF NOT EXISTS idx_databases_owner ON databases(owner_id, is_deleted)",
	"CREATE INDEX IF NOT EXISTS idx_databases_root ON databases(root_database)",
	"CREATE INDEX IF NOT EXISTS idx_licences_sha ON licences(sha256)",
	"CREATE INDEX IF NOT EXISTS idx_jobs_target ON job_submissions(target_node, state)",
	"CREATE INDEX IF NOT EXISTS idx_responses_node ON job_responses(submitter_node, delivered_at)",
];

/// Create all tables, indexes and seed rows.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	for ddl in TABLES {
		sqlx::query(ddl).execute(pool).await?;
	}
	for ddl in INDEXES {
		sqlx::query(ddl).execute(pool).await?;
	}

	seed_default_user(pool).await?;
	seed_profiles(pool).await?;

	tracing::debug!("migrations applied");
	Ok(())
}

// The reserved `default` user always exists and owns system rows.
async fn seed_default_user(pool: &SqlitePool) -> Result<()> {
	let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
	sqlx::query(
		r#"
		INSERT OR IGNORE INTO users (id, username, display_name, limits_profile, date_joined)
		VALUES (?, ?, 'Silo system', 'unlimited', ?)
		"#,
	)
	.bind(Uuid::new_v4().to_string())
	.bind(DEFAULT_USER)
	.bind(&now)
	.execute(pool)
	.await?;
	Ok(())
}

async fn seed_profiles(pool: &SqlitePool) -> Result<()> {
	let default_rules = serde_json::to_string(&[LimitRule {
		limit: 10,
		period: LimitPeriod::Second,
		increase: 10,
	}])?;

	sqlx::query("INSERT OR IGNORE INTO usage_profiles (name, rules) VALUES ('default', ?)")
		.bind(&default_rules)
		.execute(pool)
		.await?;

	sqlx::query("INSERT OR IGNORE INTO usage_profiles (name, rules) VALUES ('unlimited', '[]')")
		.execute(pool)
		.await?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	#[tokio::test]
	async fn test_migrations_are_idempotent() {
		let pool = create_test_pool().await;
		run_migrations(&pool).await.unwrap();
		run_migrations(&pool).await.unwrap();
	}

	#[tokio::test]
	async fn test_default_user_seeded() {
		let pool = create_test_pool().await;
		run_migrations(&pool).await.unwrap();

		let (count,): (i64,) =
			sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = 'default'")
				.fetch_one(&pool)
				.await
				.unwrap();
		assert_eq!(count, 1);
	}

	#[tokio::test]
	async fn test_profiles_seeded() {
		let pool = create_test_pool().await;
		run_migrations(&pool).await.unwrap();

		let (rules,): (String,) =
			sqlx::query_as("SELECT rules FROM usage_profiles WHERE name = 'default'")
				.fetch_one(&pool)
				.await
				.unwrap();
		assert!(rules.contains("\"second\""));
	}
}
