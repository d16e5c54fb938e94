// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for Silo server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`SILO_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use silo_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Server listening on {}:{}", config.http.host, config.http.port);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub storage: StorageConfig,
	pub cache: CacheConfig,
	pub queue: QueueConfig,
	pub limits: LimitsConfig,
	pub logging: LoggingConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`SILO_SERVER_*`)
/// 2. Config file (`/etc/silo/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	let mut sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	];

	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<ServerConfig, ConfigError> {
	let mut merged = ServerConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	let mut sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	];

	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let http = layer.http.unwrap_or_default().finalize();
	let database = layer.database.unwrap_or_default().finalize();
	let storage = layer.storage.unwrap_or_default().finalize();
	let cache = layer.cache.unwrap_or_default().finalize();
	let queue = layer.queue.unwrap_or_default().finalize();
	let limits = layer.limits.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&queue)?;

	info!(
		host = %http.host,
		port = http.port,
		database = %database.url,
		blob_root = %storage.blob_root.display(),
		node_id = %queue.node_id,
		"configuration loaded"
	);

	Ok(ServerConfig {
		http,
		database,
		storage,
		cache,
		queue,
		limits,
		logging,
	})
}

fn validate_config(queue: &QueueConfig) -> Result<(), ConfigError> {
	if queue.node_id.is_empty() {
		return Err(ConfigError::InvalidValue {
			key: "queue.node_id".to_string(),
			message: "node id must not be empty".to_string(),
		});
	}
	if queue.job_timeout_secs == 0 {
		return Err(ConfigError::InvalidValue {
			key: "queue.job_timeout_secs".to_string(),
			message: "job timeout must be greater than zero".to_string(),
		});
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_finalize_defaults() {
		let config = finalize(ServerConfigLayer::default()).unwrap();
		assert_eq!(config.http.port, 5550);
		assert_eq!(config.database.url, "sqlite:./silo.db");
		assert_eq!(config.queue.node_id, "node-1");
	}

	#[test]
	fn test_socket_addr() {
		let config = finalize(ServerConfigLayer::default()).unwrap();
		assert_eq!(config.socket_addr(), "127.0.0.1:5550");
	}

	#[test]
	fn test_validate_rejects_empty_node_id() {
		let mut layer = ServerConfigLayer::default();
		layer.queue = Some(sections::QueueConfigLayer {
			node_id: Some(String::new()),
			..Default::default()
		});
		assert!(finalize(layer).is_err());
	}
}
