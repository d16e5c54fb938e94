// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Blob storage and on-disk cache configuration.

use serde::Deserialize;
use std::path::PathBuf;

/// Storage configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct StorageConfig {
	/// Root directory of the filesystem blob store.
	pub blob_root: PathBuf,
	/// Directory for locally cached database bodies.
	pub cache_dir: PathBuf,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			blob_root: PathBuf::from("./data/blobs"),
			cache_dir: PathBuf::from("./data/cache"),
		}
	}
}

/// Storage configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfigLayer {
	#[serde(default)]
	pub blob_root: Option<PathBuf>,
	#[serde(default)]
	pub cache_dir: Option<PathBuf>,
}

impl StorageConfigLayer {
	pub fn merge(&mut self, other: StorageConfigLayer) {
		if other.blob_root.is_some() {
			self.blob_root = other.blob_root;
		}
		if other.cache_dir.is_some() {
			self.cache_dir = other.cache_dir;
		}
	}

	pub fn finalize(self) -> StorageConfig {
		let defaults = StorageConfig::default();
		StorageConfig {
			blob_root: self.blob_root.unwrap_or(defaults.blob_root),
			cache_dir: self.cache_dir.unwrap_or(defaults.cache_dir),
		}
	}
}
