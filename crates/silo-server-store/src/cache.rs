// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! On-disk cache of blob bodies.
//!
//! Handlers open cached files read-only; concurrent opens of the same file
//! are fine. Population goes through a temp file and an atomic rename so a
//! half-fetched body is never visible under its final name.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;

use crate::blob::BlobStore;
use crate::error::Result;

#[derive(Clone)]
pub struct BlobCache {
	dir: PathBuf,
	store: Arc<dyn BlobStore>,
}

impl BlobCache {
	pub fn new(dir: impl Into<PathBuf>, store: Arc<dyn BlobStore>) -> Self {
		Self {
			dir: dir.into(),
			store,
		}
	}

	/// Local path of a blob, fetching it from the store on first use.
	#[tracing::instrument(skip(self))]
	pub async fn path_for(&self, sha256: &str) -> Result<PathBuf> {
		let cached = self.dir.join(sha256);
		if fs::try_exists(&cached).await? {
			return Ok(cached);
		}

		fs::create_dir_all(&self.dir).await?;
		let staging = self.dir.join(format!("{sha256}.fetch"));
		self.store.fetch_to(sha256, &staging).await?;
		fs::rename(&staging, &cached).await?;

		tracing::debug!(sha256 = %sha256, "blob cached locally");
		Ok(cached)
	}

	/// Drop a cached body, e.g. after its database was deleted.
	pub async fn evict(&self, sha256: &str) -> Result<()> {
		match fs::remove_file(self.dir.join(sha256)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::blob::FsBlobStore;
	use crate::error::StoreError;

	async fn seeded_cache(dir: &std::path::Path, sha: &str) -> BlobCache {
		let store = FsBlobStore::new(dir.join("blobs"));
		let src = dir.join("src");
		fs::write(&src, b"cached body").await.unwrap();
		store.put_file(&src, sha).await.unwrap();
		BlobCache::new(dir.join("cache"), Arc::new(store))
	}

	#[tokio::test]
	async fn test_populates_once_then_hits() {
		let dir = tempfile::tempdir().unwrap();
		let sha = "ab".repeat(32);
		let cache = seeded_cache(dir.path(), &sha).await;

		let first = cache.path_for(&sha).await.unwrap();
		assert_eq!(fs::read(&first).await.unwrap(), b"cached body");

		let second = cache.path_for(&sha).await.unwrap();
		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn test_missing_blob_surfaces_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let store = FsBlobStore::new(dir.path().join("blobs"));
		let cache = BlobCache::new(dir.path().join("cache"), Arc::new(store));

		let err = cache.path_for(&"cd".repeat(32)).await.unwrap_err();
		assert!(matches!(err, StoreError::NotFound(_)));
	}

	#[tokio::test]
	async fn test_evict_is_idempotent() {
		let dir = tempfile::tempdir().unwrap();
		let sha = "ab".repeat(32);
		let cache = seeded_cache(dir.path(), &sha).await;

		cache.path_for(&sha).await.unwrap();
		cache.evict(&sha).await.unwrap();
		cache.evict(&sha).await.unwrap();
	}
}
