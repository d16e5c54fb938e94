// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Silo server binary.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use silo_server::{create_app_state, create_router};
use silo_server_queue::ResponseRouter;

/// Silo server - HTTP host for versioned and live SQLite databases.
#[derive(Parser, Debug)]
#[command(name = "silo-server", about = "Silo database hosting server", version)]
struct Args {
	/// Subcommands for silo-server (e.g., `version`)
	#[command(subcommand)]
	command: Option<Command>,

	/// Path to a TOML config file overriding /etc/silo/server.toml
	#[arg(long)]
	config: Option<std::path::PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version information
	Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	// Parse CLI arguments
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("silo-server {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	// Load .env file if present
	dotenvy::dotenv().ok();

	// Load configuration
	let config = match &args.config {
		Some(path) => silo_server_config::load_config_with_file(path)?,
		None => silo_server_config::load_config()?,
	};

	// Setup tracing
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| config.logging.level.clone().into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		node_id = %config.queue.node_id,
		"starting silo-server"
	);

	// Create database pool and run migrations
	let pool = silo_server_db::create_pool(&config.database.url, config.database.max_connections).await?;
	silo_server_db::run_migrations(&pool).await?;

	// Initialisation order: store → blob → caches → queue; the response
	// listener starts before the HTTP listener so no worker reply can
	// arrive unobserved.
	let state = create_app_state(pool.clone(), &config).await;
	let response_router = ResponseRouter::start(
		Arc::clone(&state.queue),
		Duration::from_secs(config.queue.sweep_interval_secs),
		Duration::from_secs(config.queue.claimed_ttl_secs),
	);

	let app = create_router(state);
	let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
	tracing::info!(addr = %listener.local_addr()?, "listening");

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	// Shutdown in reverse: HTTP is done, stop the queue tasks, then close
	// the pool.
	response_router.shutdown().await;
	pool.close().await;
	tracing::info!("silo-server stopped");

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		tokio::signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}

	tracing::info!("shutdown signal received");
}
