// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP listener configuration.

use serde::Deserialize;

/// HTTP configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct HttpConfig {
	pub host: String,
	pub port: u16,
	/// Base URL used when building `web_page` links in responses.
	pub base_url: String,
	/// Per-connection read timeout in seconds.
	pub read_timeout_secs: u64,
	/// Per-connection write timeout in seconds.
	pub write_timeout_secs: u64,
	/// Maximum accepted request header size in bytes.
	pub max_header_bytes: usize,
}

impl Default for HttpConfig {
	fn default() -> Self {
		Self {
			host: "127.0.0.1".to_string(),
			port: 5550,
			base_url: "https://localhost:5550".to_string(),
			read_timeout_secs: 10,
			write_timeout_secs: 10,
			max_header_bytes: 1024 * 1024,
		}
	}
}

/// HTTP configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfigLayer {
	#[serde(default)]
	pub host: Option<String>,
	#[serde(default)]
	pub port: Option<u16>,
	#[serde(default)]
	pub base_url: Option<String>,
	#[serde(default)]
	pub read_timeout_secs: Option<u64>,
	#[serde(default)]
	pub write_timeout_secs: Option<u64>,
	#[serde(default)]
	pub max_header_bytes: Option<usize>,
}

impl HttpConfigLayer {
	pub fn merge(&mut self, other: HttpConfigLayer) {
		if other.host.is_some() {
			self.host = other.host;
		}
		if other.port.is_some() {
			self.port = other.port;
		}
		if other.base_url.is_some() {
			self.base_url = other.base_url;
		}
		if other.read_timeout_secs.is_some() {
			self.read_timeout_secs = other.read_timeout_secs;
		}
		if other.write_timeout_secs.is_some() {
			self.write_timeout_secs = other.write_timeout_secs;
		}
		if other.max_header_bytes.is_some() {
			self.max_header_bytes = other.max_header_bytes;
		}
	}

	pub fn finalize(self) -> HttpConfig {
		let defaults = HttpConfig::default();
		HttpConfig {
			host: self.host.unwrap_or(defaults.host),
			port: self.port.unwrap_or(defaults.port),
			base_url: self.base_url.unwrap_or(defaults.base_url),
			read_timeout_secs: self.read_timeout_secs.unwrap_or(defaults.read_timeout_secs),
			write_timeout_secs: self
				.write_timeout_secs
				.unwrap_or(defaults.write_timeout_secs),
			max_header_bytes: self.max_header_bytes.unwrap_or(defaults.max_header_bytes),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = HttpConfigLayer::default().finalize();
		assert_eq!(config.host, "127.0.0.1");
		assert_eq!(config.port, 5550);
		assert_eq!(config.read_timeout_secs, 10);
		assert_eq!(config.max_header_bytes, 1024 * 1024);
	}

	#[test]
	fn test_custom_port() {
		let layer = HttpConfigLayer {
			port: Some(9443),
			..Default::default()
		};
		assert_eq!(layer.finalize().port, 9443);
	}
}
