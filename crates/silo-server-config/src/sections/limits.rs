// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Upload and rate-limit configuration.

use serde::Deserialize;

/// Limits configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct LimitsConfig {
	/// Usage-limits profile assigned to users without an explicit one.
	pub default_profile: String,
	/// Hard byte cap on uploaded database bodies.
	pub max_upload_bytes: u64,
	/// Usernames exempt from the upload size cap.
	pub size_override_users: Vec<String>,
}

impl Default for LimitsConfig {
	fn default() -> Self {
		Self {
			default_profile: "default".to_string(),
			max_upload_bytes: 512 * 1024 * 1024,
			size_override_users: Vec::new(),
		}
	}
}

/// Limits configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsConfigLayer {
	#[serde(default)]
	pub default_profile: Option<String>,
	#[serde(default)]
	pub max_upload_bytes: Option<u64>,
	#[serde(default)]
	pub size_override_users: Option<Vec<String>>,
}

impl LimitsConfigLayer {
	pub fn merge(&mut self, other: LimitsConfigLayer) {
		if other.default_profile.is_some() {
			self.default_profile = other.default_profile;
		}
		if other.max_upload_bytes.is_some() {
			self.max_upload_bytes = other.max_upload_bytes;
		}
		if other.size_override_users.is_some() {
			self.size_override_users = other.size_override_users;
		}
	}

	pub fn finalize(self) -> LimitsConfig {
		let defaults = LimitsConfig::default();
		LimitsConfig {
			default_profile: self.default_profile.unwrap_or(defaults.default_profile),
			max_upload_bytes: self.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
			size_override_users: self
				.size_override_users
				.unwrap_or(defaults.size_override_users),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = LimitsConfigLayer::default().finalize();
		assert_eq!(config.default_profile, "default");
		assert_eq!(config.max_upload_bytes, 512 * 1024 * 1024);
		assert!(config.size_override_users.is_empty());
	}
}
