// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schema and SQL endpoints.
//!
//! Each operation works on both database kinds: standard bodies are opened
//! read-only from the blob cache, live databases go through the job queue.
//! `execute` is the one live-only operation.

use axum::extract::State;
use axum::{Form, Json};
use serde::Deserialize;

use silo_server_api::{
	ColumnsRequest, ColumnsResponse, DatabaseReadRequest, ExecuteResponse, IndexesResponse,
	NamesResponse, QueryResponse, SqlRequest,
};
use silo_server_queue::JobOperation;
use silo_server_sqlite::{run_read_query, QueryBudget, SqliteError, SqliteFile};

use crate::api::AppState;
use crate::api_response::ApiError;
use crate::dispatch::{authorize, decode_sql, live_request, spawn_api_log, standard_db_path};

async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
	T: Send + 'static,
	F: FnOnce() -> Result<T, SqliteError> + Send + 'static,
{
	tokio::task::spawn_blocking(work)
		.await
		.map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?
		.map_err(ApiError::from)
}

pub async fn tables(
	State(state): State<AppState>,
	Form(req): Form<DatabaseReadRequest>,
) -> Result<Json<NamesResponse>, ApiError> {
	let ctx = authorize(&state, &req.apikey, &req.dbowner, &req.dbname, false).await?;

	let names: NamesResponse = if ctx.db.live {
		let value = live_request(&state, &ctx, JobOperation::Tables).await?;
		serde_json::from_value(value)
			.map_err(|e| ApiError::Internal(format!("malformed live response: {e}")))?
	} else {
		let (path, _) = standard_db_path(&state, &ctx.db, req.commit.as_deref()).await?;
		blocking(move || SqliteFile::open_read_only(&path)?.tables()).await?
	};

	spawn_api_log(&state, &ctx.caller.username, "/v1/tables", 200, Some(&req.dbowner), Some(&req.dbname));
	Ok(Json(names))
}

pub async fn views(
	State(state): State<AppState>,
	Form(req): Form<DatabaseReadRequest>,
) -> Result<Json<NamesResponse>, ApiError> {
	let ctx = authorize(&state, &req.apikey, &req.dbowner, &req.dbname, false).await?;

	let names: NamesResponse = if ctx.db.live {
		let value = live_request(&state, &ctx, JobOperation::Views).await?;
		serde_json::from_value(value)
			.map_err(|e| ApiError::Internal(format!("malformed live response: {e}")))?
	} else {
		let (path, _) = standard_db_path(&state, &ctx.db, req.commit.as_deref()).await?;
		blocking(move || SqliteFile::open_read_only(&path)?.views()).await?
	};

	spawn_api_log(&state, &ctx.caller.username, "/v1/views", 200, Some(&req.dbowner), Some(&req.dbname));
	Ok(Json(names))
}

pub async fn indexes(
	State(state): State<AppState>,
	Form(req): Form<DatabaseReadRequest>,
) -> Result<Json<IndexesResponse>, ApiError> {
	let ctx = authorize(&state, &req.apikey, &req.dbowner, &req.dbname, false).await?;

	let indexes: IndexesResponse = if ctx.db.live {
		let value = live_request(&state, &ctx, JobOperation::Indexes).await?;
		serde_json::from_value(value)
			.map_err(|e| ApiError::Internal(format!("malformed live response: {e}")))?
	} else {
		let (path, _) = standard_db_path(&state, &ctx.db, req.commit.as_deref()).await?;
		blocking(move || SqliteFile::open_read_only(&path)?.indexes()).await?
	};

	spawn_api_log(&state, &ctx.caller.username, "/v1/indexes", 200, Some(&req.dbowner), Some(&req.dbname));
	Ok(Json(indexes))
}

pub async fn columns(
	State(state): State<AppState>,
	Form(req): Form<ColumnsRequest>,
) -> Result<Json<ColumnsResponse>, ApiError> {
	let ctx = authorize(&state, &req.apikey, &req.dbowner, &req.dbname, false).await?;
	if req.table.trim().is_empty() {
		return Err(ApiError::BadRequest("No table name supplied".to_string()));
	}

	let columns: ColumnsResponse = if ctx.db.live {
		let value = live_request(
			&state,
			&ctx,
			JobOperation::Columns {
				table: req.table.clone(),
			},
		)
		.await?;
		serde_json::from_value(value)
			.map_err(|e| ApiError::Internal(format!("malformed live response: {e}")))?
	} else {
		let (path, _) = standard_db_path(&state, &ctx.db, req.commit.as_deref()).await?;
		let table = req.table.clone();
		blocking(move || SqliteFile::open_read_only(&path)?.columns(&table)).await?
	};

	spawn_api_log(&state, &ctx.caller.username, "/v1/columns", 200, Some(&req.dbowner), Some(&req.dbname));
	Ok(Json(columns))
}

pub async fn query(
	State(state): State<AppState>,
	Form(req): Form<SqlRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
	let ctx = authorize(&state, &req.apikey, &req.dbowner, &req.dbname, false).await?;
	let sql = decode_sql(&req.sql)?;

	let rows: QueryResponse = if ctx.db.live {
		let value = live_request(&state, &ctx, JobOperation::Query { sql }).await?;
		serde_json::from_value(value)
			.map_err(|e| ApiError::Internal(format!("malformed live response: {e}")))?
	} else {
		let (path, _) = standard_db_path(&state, &ctx.db, req.commit.as_deref()).await?;
		let output = blocking(move || run_read_query(&path, &sql, QueryBudget::default())).await?;

		// The query log keeps the SQL exactly as it arrived, plus the
		// memory high-water observed during execution.
		let api_log = state.api_log.clone();
		let db_id = ctx.db.id.clone();
		let caller = ctx.caller.username.clone();
		let encoded = req.sql.clone();
		let memory_hwm = output.memory_hwm;
		tokio::spawn(async move {
			if let Err(e) = api_log
				.record_query(&db_id, &caller, &encoded, memory_hwm)
				.await
			{
				tracing::warn!(error = %e, "query log write failed");
			}
		});

		output.rows
	};

	spawn_api_log(&state, &ctx.caller.username, "/v1/query", 200, Some(&req.dbowner), Some(&req.dbname));
	Ok(Json(rows))
}

pub async fn execute(
	State(state): State<AppState>,
	Form(req): Form<SqlRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
	let ctx = authorize(&state, &req.apikey, &req.dbowner, &req.dbname, true).await?;
	if !ctx.db.live {
		return Err(ApiError::BadRequest(
			"Execute() only runs on Live databases".to_string(),
		));
	}

	let sql = decode_sql(&req.sql)?;
	let value = live_request(&state, &ctx, JobOperation::Execute { sql }).await?;

	#[derive(Deserialize)]
	struct RowsChanged {
		rows_changed: i64,
	}
	let rows_changed = serde_json::from_value::<RowsChanged>(value)
		.map(|r| r.rows_changed)
		.unwrap_or(0);

	spawn_api_log(&state, &ctx.caller.username, "/v1/execute", 200, Some(&req.dbowner), Some(&req.dbname));
	Ok(Json(ExecuteResponse {
		rows_changed,
		status: "OK".to_string(),
	}))
}
