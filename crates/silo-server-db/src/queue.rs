// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable rows of the live-database job queue.
//!
//! Two tables: `job_submissions` holds the work, `job_responses` holds the
//! worker replies keyed by submission id. Both survive node restarts. A
//! submission moves `pending → claimed → complete | failed`; the claim is an
//! atomic state-guarded UPDATE so exactly one worker wins.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::error::{DbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
	Pending,
	Claimed,
	Complete,
	Failed,
}

impl JobState {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobState::Pending => "pending",
			JobState::Claimed => "claimed",
			JobState::Complete => "complete",
			JobState::Failed => "failed",
		}
	}
}

impl std::str::FromStr for JobState {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"pending" => Ok(JobState::Pending),
			"claimed" => Ok(JobState::Claimed),
			"complete" => Ok(JobState::Complete),
			"failed" => Ok(JobState::Failed),
			_ => Err(format!("unknown job state: {s}")),
		}
	}
}

/// Fields for enqueueing a submission.
#[derive(Debug, Clone)]
pub struct NewSubmission {
	pub id: String,
	pub submitter_node: String,
	pub target_node: String,
	pub db_owner: String,
	pub db_name: String,
	pub operation: String,
	/// Serialised payload, interpreted per `operation`.
	pub payload: String,
}

/// A row of `job_submissions`.
#[derive(Debug, Clone)]
pub struct JobSubmission {
	pub id: String,
	pub submitter_node: String,
	pub target_node: String,
	pub db_owner: String,
	pub db_name: String,
	pub operation: String,
	pub payload: String,
	pub state: JobState,
	pub renotified: bool,
	pub created_at: DateTime<Utc>,
	pub claimed_at: Option<DateTime<Utc>>,
}

/// A row of `job_responses`.
#[derive(Debug, Clone)]
pub struct JobResponseRow {
	pub submission_id: String,
	pub submitter_node: String,
	pub payload: String,
	pub written_at: DateTime<Utc>,
	pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct QueueRepository {
	pool: SqlitePool,
}

impl QueueRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, new), fields(submission_id = %new.id, target_node = %new.target_node))]
	pub async fn submit(&self, new: &NewSubmission) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO job_submissions (
				id, submitter_node, target_node, db_owner, db_name, operation,
				payload, state, created_at
			) VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?)
			"#,
		)
		.bind(&new.id)
		.bind(&new.submitter_node)
		.bind(&new.target_node)
		.bind(&new.db_owner)
		.bind(&new.db_name)
		.bind(&new.operation)
		.bind(&new.payload)
		.bind(now())
		.execute(&self.pool)
		.await?;

		tracing::debug!(submission_id = %new.id, "job submitted");
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_submission(&self, id: &str) -> Result<Option<JobSubmission>> {
		let row = sqlx::query(
			r#"
			SELECT id, submitter_node, target_node, db_owner, db_name, operation,
			       payload, state, renotified, created_at, claimed_at
			FROM job_submissions
			WHERE id = ?
			"#,
		)
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| parse_submission(&r)).transpose()
	}

	/// Claim a pending submission. Exactly one caller wins: the UPDATE is
	/// guarded on `state = 'pending'`, so a second attempt affects zero rows.
	#[tracing::instrument(skip(self))]
	pub async fn claim(&self, id: &str) -> Result<bool> {
		let result = sqlx::query(
			"UPDATE job_submissions SET state = 'claimed', claimed_at = ? WHERE id = ? AND state = 'pending'",
		)
		.bind(now())
		.bind(id)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	/// Claim the oldest pending submission for a worker node.
	#[tracing::instrument(skip(self))]
	pub async fn claim_next(&self, target_node: &str) -> Result<Option<JobSubmission>> {
		loop {
			let candidate: Option<(String,)> = sqlx::query_as(
				r#"
				SELECT id FROM job_submissions
				WHERE target_node = ? AND state = 'pending'
				ORDER BY created_at, id
				LIMIT 1
				"#,
			)
			.bind(target_node)
			.fetch_optional(&self.pool)
			.await?;

			let Some((id,)) = candidate else {
				return Ok(None);
			};

			// Lost the race: another worker claimed it first, try the next.
			if !self.claim(&id).await? {
				continue;
			}
			return self.get_submission(&id).await;
		}
	}

	#[tracing::instrument(skip(self))]
	pub async fn finish(&self, id: &str, state: JobState) -> Result<()> {
		if !matches!(state, JobState::Complete | JobState::Failed) {
			return Err(DbError::Internal(format!(
				"cannot finish a job into state {}",
				state.as_str()
			)));
		}

		let result = sqlx::query("UPDATE job_submissions SET state = ? WHERE id = ? AND state = 'claimed'")
			.bind(state.as_str())
			.bind(id)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(id.to_string()));
		}
		Ok(())
	}

	/// Write (or rewrite) a worker reply. Idempotent so the retry path can
	/// safely write the same response twice.
	#[tracing::instrument(skip(self, payload))]
	pub async fn write_response(
		&self,
		submission_id: &str,
		submitter_node: &str,
		payload: &str,
	) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO job_responses (submission_id, submitter_node, payload, written_at)
			VALUES (?, ?, ?, ?)
			ON CONFLICT(submission_id) DO UPDATE SET payload = excluded.payload
			"#,
		)
		.bind(submission_id)
		.bind(submitter_node)
		.bind(payload)
		.bind(now())
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	/// Replies for a node that no waiter has consumed yet.
	#[tracing::instrument(skip(self))]
	pub async fn undelivered_responses(&self, submitter_node: &str) -> Result<Vec<JobResponseRow>> {
		let rows = sqlx::query(
			r#"
			SELECT submission_id, submitter_node, payload, written_at, delivered_at
			FROM job_responses
			WHERE submitter_node = ? AND delivered_at IS NULL
			ORDER BY written_at, submission_id
			"#,
		)
		.bind(submitter_node)
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_response).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn mark_delivered(&self, submission_id: &str) -> Result<()> {
		sqlx::query("UPDATE job_responses SET delivered_at = ? WHERE submission_id = ?")
			.bind(now())
			.bind(submission_id)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	/// Pending submissions past the notification grace period that have not
	/// been renotified yet. The sweep retries their notification once.
	#[tracing::instrument(skip(self))]
	pub async fn stale_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<JobSubmission>> {
		let rows = sqlx::query(
			r#"
			SELECT id, submitter_node, target_node, db_owner, db_name, operation,
			       payload, state, renotified, created_at, claimed_at
			FROM job_submissions
			WHERE state = 'pending' AND renotified = 0 AND created_at < ?
			ORDER BY created_at, id
			"#,
		)
		.bind(older_than.to_rfc3339_opts(SecondsFormat::Secs, true))
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_submission).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn mark_renotified(&self, id: &str) -> Result<()> {
		sqlx::query("UPDATE job_submissions SET renotified = 1 WHERE id = ?")
			.bind(id)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	/// Fail claimed submissions whose worker went quiet past the TTL.
	///
	/// Returns the reaped rows so the queue can write error responses for
	/// their waiters.
	#[tracing::instrument(skip(self))]
	pub async fn reap_claimed(&self, older_than: DateTime<Utc>) -> Result<Vec<JobSubmission>> {
		let cutoff = older_than.to_rfc3339_opts(SecondsFormat::Secs, true);
		let rows = sqlx::query(
			r#"
			SELECT id, submitter_node, target_node, db_owner, db_name, operation,
			       payload, state, renotified, created_at, claimed_at
			FROM job_submissions
			WHERE state = 'claimed' AND claimed_at < ?
			ORDER BY claimed_at, id
			"#,
		)
		.bind(&cutoff)
		.fetch_all(&self.pool)
		.await?;

		let reaped: Vec<JobSubmission> = rows.iter().map(parse_submission).collect::<Result<_>>()?;
		for submission in &reaped {
			sqlx::query("UPDATE job_submissions SET state = 'failed' WHERE id = ? AND state = 'claimed'")
				.bind(&submission.id)
				.execute(&self.pool)
				.await?;
			tracing::warn!(submission_id = %submission.id, "reaped stalled claimed job");
		}
		Ok(reaped)
	}
}

fn now() -> String {
	Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(value: String, column: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(&value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("Invalid {column}: {e}")))
}

fn parse_submission(row: &SqliteRow) -> Result<JobSubmission> {
	let state_str: String = row.get("state");
	let state = state_str
		.parse()
		.map_err(|e: String| DbError::Internal(e))?;

	let claimed_at: Option<String> = row.get("claimed_at");
	let claimed_at = claimed_at
		.map(|s| parse_timestamp(s, "claimed_at"))
		.transpose()?;

	Ok(JobSubmission {
		id: row.get("id"),
		submitter_node: row.get("submitter_node"),
		target_node: row.get("target_node"),
		db_owner: row.get("db_owner"),
		db_name: row.get("db_name"),
		operation: row.get("operation"),
		payload: row.get("payload"),
		state,
		renotified: row.get("renotified"),
		created_at: parse_timestamp(row.get("created_at"), "created_at")?,
		claimed_at,
	})
}

fn parse_response(row: &SqliteRow) -> Result<JobResponseRow> {
	let delivered_at: Option<String> = row.get("delivered_at");
	let delivered_at = delivered_at
		.map(|s| parse_timestamp(s, "delivered_at"))
		.transpose()?;

	Ok(JobResponseRow {
		submission_id: row.get("submission_id"),
		submitter_node: row.get("submitter_node"),
		payload: row.get("payload"),
		written_at: parse_timestamp(row.get("written_at"), "written_at")?,
		delivered_at,
	})
}
