// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Commit-graph metadata endpoints.
//!
//! These read the maps stored on the database row and never open the blob.
//! They reject live databases, which have no commit graph.

use axum::extract::State;
use axum::{Form, Json};

use silo_server_api::{
	BranchesResponse, CommitsResponse, DatabaseReadRequest, DatabasesRequest, DatabasesResponse,
	MetadataResponse, ReleasesResponse, TagsResponse, WebPageResponse,
};
use silo_server_store::metadata_key;

use crate::api::AppState;
use crate::api_response::ApiError;
use crate::dispatch::{authorize, require_standard, resolve_and_limit, spawn_api_log, web_page_url};
use crate::validation;

pub async fn branches(
	State(state): State<AppState>,
	Form(req): Form<DatabaseReadRequest>,
) -> Result<Json<BranchesResponse>, ApiError> {
	let ctx = authorize(&state, &req.apikey, &req.dbowner, &req.dbname, false).await?;
	require_standard(&ctx.db, "Branches")?;

	spawn_api_log(&state, &ctx.caller.username, "/v1/branches", 200, Some(&req.dbowner), Some(&req.dbname));
	Ok(Json(BranchesResponse {
		default_branch: ctx.db.default_branch.clone(),
		branches: ctx.db.branch_heads,
	}))
}

pub async fn commits(
	State(state): State<AppState>,
	Form(req): Form<DatabaseReadRequest>,
) -> Result<Json<CommitsResponse>, ApiError> {
	let ctx = authorize(&state, &req.apikey, &req.dbowner, &req.dbname, false).await?;
	require_standard(&ctx.db, "Commits")?;

	spawn_api_log(&state, &ctx.caller.username, "/v1/commits", 200, Some(&req.dbowner), Some(&req.dbname));
	Ok(Json(ctx.db.commit_list))
}

pub async fn tags(
	State(state): State<AppState>,
	Form(req): Form<DatabaseReadRequest>,
) -> Result<Json<TagsResponse>, ApiError> {
	let ctx = authorize(&state, &req.apikey, &req.dbowner, &req.dbname, false).await?;
	require_standard(&ctx.db, "Tags")?;

	spawn_api_log(&state, &ctx.caller.username, "/v1/tags", 200, Some(&req.dbowner), Some(&req.dbname));
	Ok(Json(ctx.db.tag_list))
}

pub async fn releases(
	State(state): State<AppState>,
	Form(req): Form<DatabaseReadRequest>,
) -> Result<Json<ReleasesResponse>, ApiError> {
	let ctx = authorize(&state, &req.apikey, &req.dbowner, &req.dbname, false).await?;
	require_standard(&ctx.db, "Releases")?;

	spawn_api_log(&state, &ctx.caller.username, "/v1/releases", 200, Some(&req.dbowner), Some(&req.dbname));
	Ok(Json(ctx.db.release_list))
}

pub async fn metadata(
	State(state): State<AppState>,
	Form(req): Form<DatabaseReadRequest>,
) -> Result<Json<MetadataResponse>, ApiError> {
	let ctx = authorize(&state, &req.apikey, &req.dbowner, &req.dbname, false).await?;
	require_standard(&ctx.db, "Metadata")?;

	spawn_api_log(&state, &ctx.caller.username, "/v1/metadata", 200, Some(&req.dbowner), Some(&req.dbname));

	// The snapshot is expensive for deep histories; serve it from the
	// artifact cache when a previous request already built it.
	let key = metadata_key(&ctx.db.owner_name, &ctx.db.name);
	if let Some(cached) = state.artifacts.get(&key).await {
		if let Ok(snapshot) = serde_json::from_value::<MetadataResponse>(cached) {
			return Ok(Json(snapshot));
		}
	}

	let snapshot = MetadataResponse {
		branches: ctx.db.branch_heads,
		commits: ctx.db.commit_list,
		default_branch: ctx.db.default_branch,
		releases: ctx.db.release_list,
		tags: ctx.db.tag_list,
		web_page: web_page_url(&state, &ctx.db.owner_name, &ctx.db.name),
	};

	if let Ok(value) = serde_json::to_value(&snapshot) {
		state.artifacts.put(&key, value).await;
	}
	Ok(Json(snapshot))
}

pub async fn webpage(
	State(state): State<AppState>,
	Form(req): Form<DatabaseReadRequest>,
) -> Result<Json<WebPageResponse>, ApiError> {
	let ctx = authorize(&state, &req.apikey, &req.dbowner, &req.dbname, false).await?;

	spawn_api_log(&state, &ctx.caller.username, "/v1/webpage", 200, Some(&req.dbowner), Some(&req.dbname));
	Ok(Json(WebPageResponse {
		web_page: web_page_url(&state, &ctx.db.owner_name, &ctx.db.name),
	}))
}

pub async fn databases(
	State(state): State<AppState>,
	Form(req): Form<DatabasesRequest>,
) -> Result<Json<DatabasesResponse>, ApiError> {
	let caller = resolve_and_limit(&state, &req.apikey).await?;

	let live = match req.live.as_deref() {
		None => None,
		some => Some(validation::flag(some)),
	};
	let names = state
		.databases
		.list_names_for_user(&caller.user_id, live)
		.await?;

	spawn_api_log(&state, &caller.username, "/v1/databases", 200, None, None);
	Ok(Json(names))
}
