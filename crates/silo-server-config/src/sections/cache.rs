// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Artifact cache configuration.

use serde::Deserialize;

/// Artifact cache configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct CacheConfig {
	/// Maximum number of cached artifacts before eviction.
	pub capacity: usize,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self { capacity: 4096 }
	}
}

/// Cache configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfigLayer {
	#[serde(default)]
	pub capacity: Option<usize>,
}

impl CacheConfigLayer {
	pub fn merge(&mut self, other: CacheConfigLayer) {
		if other.capacity.is_some() {
			self.capacity = other.capacity;
		}
	}

	pub fn finalize(self) -> CacheConfig {
		CacheConfig {
			capacity: self.capacity.unwrap_or(CacheConfig::default().capacity),
		}
	}
}
