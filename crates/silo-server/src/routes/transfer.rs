// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Upload, download and delete.

use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use silo_server_api::{DeleteRequest, StatusResponse, UploadFields, UploadResponse};
use silo_server_auth::{AccessDecision, Caller};
use silo_server_db::{DatabaseRow, NewDatabase};
use silo_server_queue::JobOperation;
use silo_server_sqlite::SqliteFile;
use silo_server_vcs::{blob_tree, build_commit};

use crate::api::AppState;
use crate::api_response::ApiError;
use crate::dispatch::{
	authorize, invalidate_database, require_standard, resolve_and_limit, spawn_api_log,
	standard_db_path, web_page_url,
};
use crate::validation::{self, flag};

/// Temporary upload body, removed on every exit path.
struct TempUpload {
	path: PathBuf,
}

impl Drop for TempUpload {
	fn drop(&mut self) {
		let _ = std::fs::remove_file(&self.path);
	}
}

struct UploadBody {
	temp: TempUpload,
	sha256: String,
	size: i64,
}

pub async fn download(
	State(state): State<AppState>,
	Form(req): Form<silo_server_api::DatabaseReadRequest>,
) -> Result<Response, ApiError> {
	let ctx = authorize(&state, &req.apikey, &req.dbowner, &req.dbname, false).await?;
	require_standard(&ctx.db, "Download")?;

	let (path, commit) = standard_db_path(&state, &ctx.db, req.commit.as_deref()).await?;
	let modified = commit
		.tree
		.entries
		.first()
		.map(|e| e.last_modified)
		.unwrap_or(commit.timestamp);

	// The owner's own fetches do not count as downloads.
	if !ctx.caller.username.eq_ignore_ascii_case(&ctx.db.owner_name) {
		let databases = state.databases.clone();
		let api_log = state.api_log.clone();
		let db_id = ctx.db.id.clone();
		let caller = ctx.caller.username.clone();
		tokio::spawn(async move {
			if let Err(e) = databases.increment_download_count(&db_id).await {
				tracing::warn!(error = %e, "download counter update failed");
			}
			if let Err(e) = api_log.record_download(&db_id, &caller).await {
				tracing::warn!(error = %e, "download record write failed");
			}
		});
	}

	let file = tokio::fs::File::open(&path)
		.await
		.map_err(|e| ApiError::Internal(format!("cached blob unreadable: {e}")))?;
	let body = Body::from_stream(tokio_util::io::ReaderStream::new(file));

	let disposition = format!(
		"attachment; filename=\"{}\"; modification-date=\"{}\"",
		ctx.db.name,
		modified.to_rfc3339_opts(SecondsFormat::Secs, true),
	);

	spawn_api_log(&state, &ctx.caller.username, "/v1/download", 200, Some(&req.dbowner), Some(&req.dbname));
	Response::builder()
		.status(StatusCode::OK)
		.header(header::CONTENT_TYPE, "application/x-sqlite3")
		.header(header::CONTENT_DISPOSITION, disposition)
		.body(body)
		.map_err(|e| ApiError::Internal(format!("response build failed: {e}")))
}

pub async fn delete(
	State(state): State<AppState>,
	Form(req): Form<DeleteRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
	let caller = resolve_and_limit(&state, &req.apikey).await?;
	validation::require_dbname(&req.dbname)?;
	if !caller.key_allows_write() {
		return Err(ApiError::Unauthorised(
			"Your API key doesn't have write permission".to_string(),
		));
	}

	let db = state
		.databases
		.get_by_owner_name(&caller.username, &req.dbname)
		.await?
		.ok_or(ApiError::NotFound)?;

	// Cache first, then the row, so stale artifacts cannot be served for a
	// database that no longer resolves.
	invalidate_database(&state, &db.owner_name, &db.name).await;
	state.databases.mark_deleted(&db.id).await?;

	if db.live {
		if let Some(blob) = db.live_blob.as_deref() {
			if let Err(e) = state.blob_store.delete(blob).await {
				tracing::warn!(error = %e, "live blob removal failed");
			}
		}
		if let Some(node) = db.live_node.clone() {
			let envelope = silo_server_queue::JobEnvelope {
				operation: JobOperation::Delete,
				submitter_node: state.queue.node_id().to_string(),
				target_node: node,
				caller: caller.username.clone(),
				owner: db.owner_name.clone(),
				name: db.name.clone(),
			};
			if let Err(e) = state.queue.submit(&envelope).await {
				tracing::warn!(error = %e, "live delete job submission failed");
			}
		}
	}

	spawn_api_log(&state, &caller.username, "/v1/delete", 200, Some(&caller.username), Some(&req.dbname));
	Ok(Json(StatusResponse::ok()))
}

pub async fn upload(
	State(state): State<AppState>,
	multipart: Multipart,
) -> Result<Response, ApiError> {
	let (fields, body, caller) = read_multipart(&state, multipart).await?;

	let caller = match caller {
		Some(caller) => caller,
		None => state.resolver.resolve(&fields.apikey).await?,
	};
	state.rate_limiter.check(&caller.user_id).await?;

	validation::require_dbname(&fields.dbname)?;
	validation::require_commit_opt(fields.commit.as_deref())?;
	if !caller.key_allows_write() {
		return Err(ApiError::Unauthorised(
			"Your API key doesn't have write permission".to_string(),
		));
	}

	let owner = fields
		.dbowner
		.clone()
		.unwrap_or_else(|| caller.username.clone());
	validation::require_username(&owner)?;

	let body = body.ok_or_else(|| ApiError::BadRequest("No database file supplied".to_string()))?;
	enforce_size_cap(&state, &caller, body.size)?;

	// A body that SQLite cannot open never reaches the blob store.
	let probe_path = body.temp.path.clone();
	tokio::task::spawn_blocking(move || SqliteFile::probe(&probe_path))
		.await
		.map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?
		.map_err(ApiError::from)?;

	if flag(fields.live.as_deref()) {
		upload_live(&state, &caller, &owner, fields, body).await
	} else {
		upload_standard(&state, &caller, &owner, fields, body).await
	}
}

async fn upload_live(
	state: &AppState,
	caller: &Caller,
	owner: &str,
	fields: UploadFields,
	body: UploadBody,
) -> Result<Response, ApiError> {
	if !caller.username.eq_ignore_ascii_case(owner) {
		return Err(ApiError::Forbidden(format!(
			"You don't have write permission for {owner}/{}",
			fields.dbname
		)));
	}
	if state
		.databases
		.get_by_owner_name(owner, &fields.dbname)
		.await?
		.is_some()
	{
		return Err(ApiError::Conflict(
			"A database with that name already exists".to_string(),
		));
	}

	state.blob_store.put_file(&body.temp.path, &body.sha256).await?;

	// Single-live-node deployments elect the configured node.
	let node = state.config.queue.node_id.clone();
	let db = state
		.databases
		.insert(NewDatabase {
			owner_id: caller.user_id.clone(),
			name: fields.dbname.clone(),
			public: flag(fields.public.as_deref()),
			live: true,
			live_node: Some(node.clone()),
			live_blob: Some(body.sha256.clone()),
			source_url: fields.sourceurl.clone(),
			licence_sha: None,
			default_branch: String::new(),
		})
		.await?;

	let envelope = silo_server_queue::JobEnvelope {
		operation: JobOperation::Create {
			blob_sha: body.sha256.clone(),
		},
		submitter_node: state.queue.node_id().to_string(),
		target_node: node,
		caller: caller.username.clone(),
		owner: db.owner_name.clone(),
		name: db.name.clone(),
	};
	let payload = state.queue.submit_and_wait(&envelope).await?;
	if let Some(message) = payload.error {
		return Err(ApiError::Internal(format!(
			"live node failed to create the database: {message}"
		)));
	}

	spawn_api_log(state, &caller.username, "/v1/upload", 201, Some(owner), Some(&db.name));
	let response = UploadResponse {
		commit_id: None,
		url: web_page_url(state, &db.owner_name, &db.name),
	};
	Ok((StatusCode::CREATED, Json(response)).into_response())
}

async fn upload_standard(
	state: &AppState,
	caller: &Caller,
	owner: &str,
	fields: UploadFields,
	body: UploadBody,
) -> Result<Response, ApiError> {
	let existing = state
		.databases
		.get_by_owner_name(owner, &fields.dbname)
		.await?;

	let force = flag(fields.force.as_deref());
	let timestamp = parse_last_modified(fields.lastmodified.as_deref())?;
	let licence_sha = resolve_licence(state, caller, fields.licence.as_deref()).await?;

	let db = match existing {
		Some(db) if db.live => {
			return Err(ApiError::Conflict(
				"A live database with that name already exists".to_string(),
			));
		}
		Some(db) => {
			if !caller.username.eq_ignore_ascii_case(owner) {
				require_write_share(state, caller, owner, &fields.dbname).await?;
			}
			if fields.commit.is_none() {
				return Err(ApiError::UpgradeRequired(format!(
					"A 'commit' field is required when uploading to the existing database {owner}/{}",
					fields.dbname
				)));
			}
			db
		}
		None => {
			if !caller.username.eq_ignore_ascii_case(owner) {
				return Err(ApiError::Forbidden(format!(
					"You don't have write permission for {owner}/{}",
					fields.dbname
				)));
			}
			let branch = fields.branch.clone().unwrap_or_default();
			if !branch.is_empty() {
				validation::require_branch(&branch)?;
			}
			state
				.databases
				.insert(NewDatabase {
					owner_id: caller.user_id.clone(),
					name: fields.dbname.clone(),
					public: flag(fields.public.as_deref()),
					live: false,
					live_node: None,
					live_blob: None,
					source_url: fields.sourceurl.clone(),
					licence_sha: licence_sha.clone(),
					default_branch: branch,
				})
				.await?
		}
	};

	let branch = match fields.branch.clone() {
		Some(branch) => {
			validation::require_branch(&branch)?;
			branch
		}
		None => db.default_branch.clone(),
	};

	state.blob_store.put_file(&body.temp.path, &body.sha256).await?;

	let user = state
		.users
		.get_by_id(&caller.user_id)
		.await?
		.ok_or_else(|| ApiError::Internal("caller row vanished".to_string()))?;

	let tree = blob_tree(&fields.dbname, &body.sha256, body.size, timestamp, licence_sha);
	let message = fields
		.commitmsg
		.clone()
		.unwrap_or_else(|| format!("Upload of {}", fields.dbname));
	let commit = build_commit(
		tree,
		fields.commit.as_deref(),
		&user.display_name,
		&user.email,
		&message,
		timestamp,
	);

	let updated = state
		.databases
		.append_commit(&db.id, &branch, &commit, force)
		.await?;
	invalidate_database(state, &updated.owner_name, &updated.name).await;

	let api_log = state.api_log.clone();
	let db_id = updated.id.clone();
	let by = caller.username.clone();
	tokio::spawn(async move {
		if let Err(e) = api_log.record_upload(&db_id, &by).await {
			tracing::warn!(error = %e, "upload record write failed");
		}
	});

	spawn_api_log(state, &caller.username, "/v1/upload", 201, Some(owner), Some(&updated.name));
	let response = UploadResponse {
		commit_id: Some(commit.id.clone()),
		url: format!(
			"{}?branch={}&commit={}",
			web_page_url(state, &updated.owner_name, &updated.name),
			branch,
			commit.id
		),
	};
	Ok((StatusCode::CREATED, Json(response)).into_response())
}

async fn require_write_share(
	state: &AppState,
	caller: &Caller,
	owner: &str,
	name: &str,
) -> Result<DatabaseRow, ApiError> {
	match state
		.access
		.may_access(Some((&caller.user_id, &caller.username)), owner, name, true)
		.await?
	{
		AccessDecision::Allow(db) => Ok(*db),
		AccessDecision::Deny => Err(ApiError::Forbidden(format!(
			"You don't have write permission for {owner}/{name}"
		))),
		AccessDecision::NotFound => Err(ApiError::NotFound),
	}
}

fn parse_last_modified(value: Option<&str>) -> Result<DateTime<Utc>, ApiError> {
	match value {
		Some(raw) => DateTime::parse_from_rfc3339(raw)
			.map(|dt| dt.with_timezone(&Utc))
			.map_err(|_| ApiError::BadRequest("Invalid lastmodified timestamp".to_string())),
		None => Ok(Utc::now()),
	}
}

async fn resolve_licence(
	state: &AppState,
	caller: &Caller,
	licence: Option<&str>,
) -> Result<Option<String>, ApiError> {
	let Some(name) = licence.filter(|n| !n.is_empty() && *n != "Not specified") else {
		return Ok(None);
	};
	validation::require_licence(name)?;

	let row = state
		.licences
		.get_by_name(&caller.user_id, name)
		.await?
		.ok_or_else(|| ApiError::BadRequest(format!("Unknown licence: {name}")))?;
	Ok(Some(row.sha256))
}

fn enforce_size_cap(state: &AppState, caller: &Caller, size: i64) -> Result<(), ApiError> {
	let cap = state.config.limits.max_upload_bytes;
	let exempt = state
		.config
		.limits
		.size_override_users
		.iter()
		.any(|u| u.eq_ignore_ascii_case(&caller.username));
	if !exempt && size as u64 > cap {
		return Err(ApiError::PayloadTooLarge(format!(
			"Database is too large ({size} bytes); the limit is {cap} bytes"
		)));
	}
	Ok(())
}

async fn read_multipart(
	state: &AppState,
	mut multipart: Multipart,
) -> Result<(UploadFields, Option<UploadBody>, Option<Caller>), ApiError> {
	let mut fields = UploadFields::default();
	let mut body: Option<UploadBody> = None;
	let mut caller: Option<Caller> = None;

	while let Some(mut field) = multipart
		.next_field()
		.await
		.map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
	{
		let name = field.name().unwrap_or("").to_string();
		match name.as_str() {
			"file" | "file1" => {
				let path = std::env::temp_dir().join(format!("silo-upload-{}", Uuid::new_v4()));
				let temp = TempUpload { path };
				let mut out = tokio::fs::File::create(&temp.path)
					.await
					.map_err(|e| ApiError::Internal(format!("upload staging failed: {e}")))?;

				// Stream under the configured cap unless the (already seen)
				// caller is on the size-override list.
				let cap = state.config.limits.max_upload_bytes;
				let exempt = caller.as_ref().is_some_and(|c| {
					state
						.config
						.limits
						.size_override_users
						.iter()
						.any(|u| u.eq_ignore_ascii_case(&c.username))
				});

				let mut hasher = Sha256::new();
				let mut size: i64 = 0;
				while let Some(chunk) = field
					.chunk()
					.await
					.map_err(|e| ApiError::BadRequest(format!("Upload stream failed: {e}")))?
				{
					size += chunk.len() as i64;
					if !exempt && size as u64 > cap {
						return Err(ApiError::PayloadTooLarge(format!(
							"Database is too large; the limit is {cap} bytes"
						)));
					}
					hasher.update(&chunk);
					out
						.write_all(&chunk)
						.await
						.map_err(|e| ApiError::Internal(format!("upload staging failed: {e}")))?;
				}
				out
					.flush()
					.await
					.map_err(|e| ApiError::Internal(format!("upload staging failed: {e}")))?;

				body = Some(UploadBody {
					temp,
					sha256: hex::encode(hasher.finalize()),
					size,
				});
			}
			other => {
				let value = field
					.text()
					.await
					.map_err(|e| ApiError::BadRequest(format!("Malformed multipart field: {e}")))?;
				match other {
					"apikey" => {
						fields.apikey = value;
						// Resolving here lets the file cap honour override
						// users; the definitive auth check runs afterwards.
						if caller.is_none() {
							caller = state.resolver.resolve(&fields.apikey).await.ok();
						}
					}
					"dbowner" => fields.dbowner = Some(value),
					"dbname" => fields.dbname = value,
					"branch" => fields.branch = Some(value),
					"commitmsg" => fields.commitmsg = Some(value),
					"sourceurl" => fields.sourceurl = Some(value),
					"lastmodified" => fields.lastmodified = Some(value),
					"licence" => fields.licence = Some(value),
					"public" => fields.public = Some(value),
					"live" => fields.live = Some(value),
					"commit" => fields.commit = Some(value),
					"force" => fields.force = Some(value),
					_ => {}
				}
			}
		}
	}

	Ok((fields, body, caller))
}
