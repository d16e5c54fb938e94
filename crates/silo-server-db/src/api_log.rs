// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fire-and-forget accounting rows.
//!
//! Callers write these from spawned tasks; a failure here is logged and
//! never fails the request that produced it.

use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;

#[derive(Clone)]
pub struct ApiLogRepository {
	pool: SqlitePool,
}

impl ApiLogRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn record_call(
		&self,
		caller: &str,
		endpoint: &str,
		status: i64,
		latency_ms: i64,
		db_owner: Option<&str>,
		db_name: Option<&str>,
	) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO api_log (id, caller, endpoint, status, latency_ms, db_owner, db_name, created_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(Uuid::new_v4().to_string())
		.bind(caller)
		.bind(endpoint)
		.bind(status)
		.bind(latency_ms)
		.bind(db_owner)
		.bind(db_name)
		.bind(now())
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn record_upload(&self, database_id: &str, caller: &str) -> Result<()> {
		sqlx::query(
			"INSERT INTO database_uploads (id, database_id, caller, created_at) VALUES (?, ?, ?, ?)",
		)
		.bind(Uuid::new_v4().to_string())
		.bind(database_id)
		.bind(caller)
		.bind(now())
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn record_download(&self, database_id: &str, caller: &str) -> Result<()> {
		sqlx::query(
			"INSERT INTO database_downloads (id, database_id, caller, created_at) VALUES (?, ?, ?, ?)",
		)
		.bind(Uuid::new_v4().to_string())
		.bind(database_id)
		.bind(caller)
		.bind(now())
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	/// Record an executed user query, base64-encoded as received, with its
	/// memory high-water mark in bytes.
	#[tracing::instrument(skip(self, sql_base64))]
	pub async fn record_query(
		&self,
		database_id: &str,
		caller: &str,
		sql_base64: &str,
		memory_hwm: i64,
	) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO query_log (id, database_id, caller, sql_base64, memory_hwm, created_at)
			VALUES (?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(Uuid::new_v4().to_string())
		.bind(database_id)
		.bind(caller)
		.bind(sql_base64)
		.bind(memory_hwm)
		.bind(now())
		.execute(&self.pool)
		.await?;
		Ok(())
	}
}

fn now() -> String {
	Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
