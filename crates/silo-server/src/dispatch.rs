// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The shared dispatch sequence and handler helpers.
//!
//! Order is fixed for every operation: resolve the credential, debit the
//! rate buckets, validate the envelope fields, resolve the database and
//! check access, then branch on the `live` flag.

use std::path::PathBuf;

use silo_server_auth::{AccessDecision, Caller};
use silo_server_db::DatabaseRow;
use silo_server_queue::{JobEnvelope, JobOperation};
use silo_server_store::database_prefix;
use silo_server_vcs::CommitEntry;

use crate::api::AppState;
use crate::api_response::ApiError;
use crate::validation;

/// An authenticated, authorised request against one database.
pub struct RequestContext {
	pub caller: Caller,
	pub db: DatabaseRow,
}

/// Steps (a) and (b): credential and rate limit, used alone by the
/// endpoints that do not address a database.
pub async fn resolve_and_limit(state: &AppState, apikey: &str) -> Result<Caller, ApiError> {
	let caller = state.resolver.resolve(apikey).await?;
	state.rate_limiter.check(&caller.user_id).await?;
	Ok(caller)
}

/// The full prologue for database-addressed operations.
pub async fn authorize(
	state: &AppState,
	apikey: &str,
	owner: &str,
	name: &str,
	write_required: bool,
) -> Result<RequestContext, ApiError> {
	let caller = resolve_and_limit(state, apikey).await?;

	validation::require_username(owner)?;
	validation::require_dbname(name)?;

	let decision = state
		.access
		.may_access(
			Some((&caller.user_id, &caller.username)),
			owner,
			name,
			write_required,
		)
		.await?;

	match decision {
		AccessDecision::Allow(db) => {
			if write_required && !caller.key_allows_write() {
				return Err(ApiError::Unauthorised(
					"Your API key doesn't have write permission".to_string(),
				));
			}
			Ok(RequestContext { caller, db: *db })
		}
		AccessDecision::Deny if write_required => Err(ApiError::Forbidden(format!(
			"You don't have write permission for {owner}/{name}"
		))),
		AccessDecision::Deny => Err(ApiError::Forbidden(format!(
			"You don't have access to {owner}/{name}"
		))),
		AccessDecision::NotFound => Err(ApiError::NotFound),
	}
}

/// Reject live databases from endpoints whose concept does not apply.
pub fn require_standard(db: &DatabaseRow, operation: &str) -> Result<(), ApiError> {
	if db.live {
		Err(ApiError::BadRequest(format!(
			"{operation}() does not work on live databases"
		)))
	} else {
		Ok(())
	}
}

/// Resolve the commit addressed by a request, defaulting to the head of the
/// default branch.
pub fn resolve_commit<'a>(
	db: &'a DatabaseRow,
	commit: Option<&str>,
) -> Result<&'a CommitEntry, ApiError> {
	validation::require_commit_opt(commit)?;

	let commit_id = match commit {
		Some(id) => id.to_string(),
		None => db
			.branch_head(&db.default_branch)
			.ok_or_else(|| {
				ApiError::BadRequest(format!(
					"{}/{} has no commits yet",
					db.owner_name, db.name
				))
			})?
			.to_string(),
	};

	db.commit_list.get(&commit_id).ok_or_else(|| {
		ApiError::BadRequest(format!("commit '{commit_id}' is not in {}", db.name))
	})
}

/// Standard-path prologue: resolve the commit to its blob and materialise
/// the blob through the on-disk cache.
pub async fn standard_db_path(
	state: &AppState,
	db: &DatabaseRow,
	commit: Option<&str>,
) -> Result<(PathBuf, CommitEntry), ApiError> {
	let entry = resolve_commit(db, commit)?.clone();
	let tree_entry = entry
		.tree
		.entries
		.first()
		.ok_or_else(|| ApiError::Internal("commit has an empty tree".to_string()))?;
	let path = state.blob_cache.path_for(&tree_entry.sha256).await?;
	Ok((path, entry))
}

/// Live-path round-trip: build the envelope, submit, block on the waiter,
/// unwrap the worker's payload.
pub async fn live_request(
	state: &AppState,
	ctx: &RequestContext,
	operation: JobOperation,
) -> Result<serde_json::Value, ApiError> {
	let target_node = ctx.db.live_node.clone().ok_or_else(|| {
		ApiError::Internal(format!(
			"live database {}/{} has no assigned node",
			ctx.db.owner_name, ctx.db.name
		))
	})?;

	let envelope = JobEnvelope {
		operation,
		submitter_node: state.queue.node_id().to_string(),
		target_node,
		caller: ctx.caller.username.clone(),
		owner: ctx.db.owner_name.clone(),
		name: ctx.db.name.clone(),
	};

	let payload = state.queue.submit_and_wait(&envelope).await?;
	if let Some(message) = payload.error {
		return Err(ApiError::BadRequest(message));
	}
	payload
		.result
		.ok_or_else(|| ApiError::Internal("live node returned an empty response".to_string()))
}

/// Decode the base64 `sql` field, accepting both standard and URL-safe
/// alphabets.
pub fn decode_sql(encoded: &str) -> Result<String, ApiError> {
	use base64::engine::general_purpose::{STANDARD, URL_SAFE};
	use base64::Engine;

	let bytes = STANDARD
		.decode(encoded.trim())
		.or_else(|_| URL_SAFE.decode(encoded.trim()))
		.map_err(|_| ApiError::BadRequest("Invalid base64-encoded SQL".to_string()))?;
	let sql = String::from_utf8(bytes)
		.map_err(|_| ApiError::BadRequest("SQL is not valid UTF-8".to_string()))?;
	if sql.trim().is_empty() {
		return Err(ApiError::BadRequest("Empty SQL statement".to_string()));
	}
	Ok(sql)
}

/// Canonical web page URL of a database.
pub fn web_page_url(state: &AppState, owner: &str, name: &str) -> String {
	format!("{}/{}/{}", state.config.http.base_url, owner, name)
}

/// Fire-and-forget API call log entry.
pub fn spawn_api_log(
	state: &AppState,
	caller: &str,
	endpoint: &'static str,
	status: i64,
	owner: Option<&str>,
	name: Option<&str>,
) {
	let api_log = state.api_log.clone();
	let caller = caller.to_string();
	let owner = owner.map(|s| s.to_string());
	let name = name.map(|s| s.to_string());
	tokio::spawn(async move {
		if let Err(e) = api_log
			.record_call(&caller, endpoint, status, 0, owner.as_deref(), name.as_deref())
			.await
		{
			tracing::warn!(error = %e, endpoint, "API log write failed");
		}
	});
}

/// Evict every cached artifact of one database.
pub async fn invalidate_database(state: &AppState, owner: &str, name: &str) {
	state
		.artifacts
		.invalidate_prefix(&database_prefix(owner, name))
		.await;
}
