// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Structured diff between two commits, possibly across databases.

use axum::extract::State;
use axum::{Form, Json};
use std::str::FromStr;

use silo_server_api::{DiffRequest, DiffResponse};
use silo_server_sqlite::{diff_databases, MergeStrategy};

use crate::api::AppState;
use crate::api_response::ApiError;
use crate::dispatch::{authorize, require_standard, spawn_api_log, standard_db_path};
use crate::validation;

pub async fn diff(
	State(state): State<AppState>,
	Form(req): Form<DiffRequest>,
) -> Result<Json<DiffResponse>, ApiError> {
	let owner_b = req.dbowner_b.clone().unwrap_or_else(|| req.dbowner_a.clone());
	let name_b = req.dbname_b.clone().unwrap_or_else(|| req.dbname_a.clone());

	let ctx_a = authorize(&state, &req.apikey, &req.dbowner_a, &req.dbname_a, false).await?;
	require_standard(&ctx_a.db, "Diff")?;

	// The second side reuses the already-charged credential: only the
	// access check runs again.
	let db_b = if owner_b.eq_ignore_ascii_case(&req.dbowner_a) && name_b == req.dbname_a {
		None
	} else {
		validation::require_username(&owner_b)?;
		validation::require_dbname(&name_b)?;
		let decision = state
			.access
			.may_access(
				Some((&ctx_a.caller.user_id, &ctx_a.caller.username)),
				&owner_b,
				&name_b,
				false,
			)
			.await?;
		match decision {
			silo_server_auth::AccessDecision::Allow(db) => {
				require_standard(&db, "Diff")?;
				Some(*db)
			}
			silo_server_auth::AccessDecision::Deny => {
				return Err(ApiError::Forbidden(format!(
					"You don't have access to {owner_b}/{name_b}"
				)));
			}
			silo_server_auth::AccessDecision::NotFound => return Err(ApiError::NotFound),
		}
	};

	validation::require_commit(&req.commit_a)?;
	validation::require_commit(&req.commit_b)?;

	let merge = match req.merge.as_deref() {
		None | Some("") => MergeStrategy::None,
		Some(raw) => MergeStrategy::from_str(raw).map_err(ApiError::BadRequest)?,
	};
	let include_data = matches!(req.include_data.as_deref(), Some("1"));

	let (path_a, _) = standard_db_path(&state, &ctx_a.db, Some(&req.commit_a)).await?;
	let side_b = db_b.as_ref().unwrap_or(&ctx_a.db);
	let (path_b, _) = standard_db_path(&state, side_b, Some(&req.commit_b)).await?;

	let result = tokio::task::spawn_blocking(move || {
		diff_databases(&path_a, &path_b, merge, include_data)
	})
	.await
	.map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?
	.map_err(ApiError::from)?;

	spawn_api_log(&state, &ctx_a.caller.username, "/v1/diff", 200, Some(&req.dbowner_a), Some(&req.dbname_a));
	Ok(Json(result))
}
