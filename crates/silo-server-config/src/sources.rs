// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	CacheConfigLayer, DatabaseConfigLayer, HttpConfigLayer, LimitsConfigLayer, LoggingConfigLayer,
	QueueConfigLayer, StorageConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/silo/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: SILO_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			http: Some(load_http_from_env()?),
			database: Some(load_database_from_env()?),
			storage: Some(load_storage_from_env()?),
			cache: Some(load_cache_from_env()?),
			queue: Some(load_queue_from_env()?),
			limits: Some(load_limits_from_env()?),
			logging: Some(load_logging_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_u16(name: &str) -> Result<Option<u16>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u16 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u32 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u64 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid usize value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env_var("SILO_SERVER_HOST"),
		port: env_u16("SILO_SERVER_PORT")?,
		base_url: env_var("SILO_SERVER_BASE_URL"),
		read_timeout_secs: env_u64("SILO_SERVER_READ_TIMEOUT_SECS")?,
		write_timeout_secs: env_u64("SILO_SERVER_WRITE_TIMEOUT_SECS")?,
		max_header_bytes: env_usize("SILO_SERVER_MAX_HEADER_BYTES")?,
	})
}

fn load_database_from_env() -> Result<DatabaseConfigLayer, ConfigError> {
	Ok(DatabaseConfigLayer {
		url: env_var("SILO_SERVER_DATABASE_URL"),
		max_connections: env_u32("SILO_SERVER_DATABASE_MAX_CONNECTIONS")?,
	})
}

fn load_storage_from_env() -> Result<StorageConfigLayer, ConfigError> {
	Ok(StorageConfigLayer {
		blob_root: env_var("SILO_SERVER_BLOB_ROOT").map(PathBuf::from),
		cache_dir: env_var("SILO_SERVER_CACHE_DIR").map(PathBuf::from),
	})
}

fn load_cache_from_env() -> Result<CacheConfigLayer, ConfigError> {
	Ok(CacheConfigLayer {
		capacity: env_usize("SILO_SERVER_CACHE_CAPACITY")?,
	})
}

fn load_queue_from_env() -> Result<QueueConfigLayer, ConfigError> {
	Ok(QueueConfigLayer {
		node_id: env_var("SILO_SERVER_NODE_ID"),
		job_timeout_secs: env_u64("SILO_SERVER_JOB_TIMEOUT_SECS")?,
		sweep_interval_secs: env_u64("SILO_SERVER_SWEEP_INTERVAL_SECS")?,
		claimed_ttl_secs: env_u64("SILO_SERVER_CLAIMED_TTL_SECS")?,
	})
}

fn load_limits_from_env() -> Result<LimitsConfigLayer, ConfigError> {
	let size_override_users = env_var("SILO_SERVER_SIZE_OVERRIDE_USERS").map(|s| {
		s.split(',')
			.map(|s| s.trim().to_string())
			.filter(|s| !s.is_empty())
			.collect()
	});

	Ok(LimitsConfigLayer {
		default_profile: env_var("SILO_SERVER_DEFAULT_PROFILE"),
		max_upload_bytes: env_u64("SILO_SERVER_MAX_UPLOAD_BYTES")?,
		size_override_users,
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	Ok(LoggingConfigLayer {
		level: env_var("SILO_SERVER_LOG_LEVEL"),
	})
}
