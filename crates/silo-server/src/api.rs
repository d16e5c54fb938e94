// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state and the v1 router.

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use silo_server_auth::{AccessControl, CredentialResolver, RateLimiter};
use silo_server_config::ServerConfig;
use silo_server_db::{
	ApiKeyRepository, ApiLogRepository, DatabaseRepository, LicenceRepository, QueueRepository,
	ShareRepository, UsageRepository, UserRepository,
};
use silo_server_queue::{JobQueue, NotifyHub};
use silo_server_store::{
	ArtifactCache, BlobCache, BlobStore, FsBlobStore, MemoryArtifactCache,
};

use crate::routes;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
	pub config: Arc<ServerConfig>,
	pub pool: SqlitePool,
	pub users: Arc<UserRepository>,
	pub databases: Arc<DatabaseRepository>,
	pub api_keys: Arc<ApiKeyRepository>,
	pub shares: Arc<ShareRepository>,
	pub licences: Arc<LicenceRepository>,
	pub api_log: Arc<ApiLogRepository>,
	pub resolver: Arc<CredentialResolver>,
	pub access: Arc<AccessControl>,
	pub rate_limiter: Arc<RateLimiter>,
	pub blob_store: Arc<dyn BlobStore>,
	pub blob_cache: Arc<BlobCache>,
	pub artifacts: Arc<dyn ArtifactCache>,
	pub queue: Arc<JobQueue>,
}

/// Creates the application state.
///
/// Construction order mirrors startup: store repositories first, then the
/// blob store and caches, then the queue; the HTTP listener comes last in
/// `main`.
pub async fn create_app_state(pool: SqlitePool, config: &ServerConfig) -> AppState {
	let users = Arc::new(UserRepository::new(pool.clone()));
	let databases = Arc::new(DatabaseRepository::new(pool.clone()));
	let api_keys = Arc::new(ApiKeyRepository::new(pool.clone()));
	let shares = Arc::new(ShareRepository::new(pool.clone()));
	let licences = Arc::new(LicenceRepository::new(pool.clone()));
	let api_log = Arc::new(ApiLogRepository::new(pool.clone()));
	let usage = UsageRepository::new(pool.clone());

	let resolver = Arc::new(CredentialResolver::new(api_keys.as_ref().clone()));
	let access = Arc::new(AccessControl::new(
		databases.as_ref().clone(),
		shares.as_ref().clone(),
	));
	let rate_limiter = Arc::new(RateLimiter::new(users.as_ref().clone(), usage));

	let blob_store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&config.storage.blob_root));
	let blob_cache = Arc::new(BlobCache::new(
		&config.storage.cache_dir,
		Arc::clone(&blob_store),
	));
	let artifacts: Arc<dyn ArtifactCache> =
		Arc::new(MemoryArtifactCache::new(config.cache.capacity));

	let queue = Arc::new(JobQueue::new(
		QueueRepository::new(pool.clone()),
		Arc::new(NotifyHub::new()),
		config.queue.node_id.clone(),
		Duration::from_secs(config.queue.job_timeout_secs),
	));

	AppState {
		config: Arc::new(config.clone()),
		pool,
		users,
		databases,
		api_keys,
		shares,
		licences,
		api_log,
		resolver,
		access,
		rate_limiter,
		blob_store,
		blob_cache,
		artifacts,
		queue,
	}
}

/// Build the v1 router. All endpoints are POST with form bodies.
pub fn create_router(state: AppState) -> Router {
	let upload_limit = state.config.limits.max_upload_bytes as usize;

	Router::new()
		.route("/v1/branches", post(routes::meta::branches))
		.route("/v1/commits", post(routes::meta::commits))
		.route("/v1/tags", post(routes::meta::tags))
		.route("/v1/releases", post(routes::meta::releases))
		.route("/v1/metadata", post(routes::meta::metadata))
		.route("/v1/webpage", post(routes::meta::webpage))
		.route("/v1/databases", post(routes::meta::databases))
		.route("/v1/tables", post(routes::sqlite::tables))
		.route("/v1/views", post(routes::sqlite::views))
		.route("/v1/columns", post(routes::sqlite::columns))
		.route("/v1/indexes", post(routes::sqlite::indexes))
		.route("/v1/query", post(routes::sqlite::query))
		.route("/v1/execute", post(routes::sqlite::execute))
		.route("/v1/download", post(routes::transfer::download))
		.route(
			"/v1/upload",
			post(routes::transfer::upload)
				// Uploads carry whole database bodies; the per-field cap is
				// enforced while streaming, with headroom for form overhead.
				.layer(DefaultBodyLimit::max(upload_limit.saturating_mul(2).max(64 * 1024 * 1024))),
		)
		.route("/v1/delete", post(routes::transfer::delete))
		.route("/v1/diff", post(routes::diff::diff))
		.layer(TraceLayer::new_for_http())
		.layer(
			CorsLayer::new()
				.allow_origin(Any)
				.allow_methods(Any)
				.allow_headers(Any),
		)
		.with_state(state)
}
