// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Blob store contract and filesystem implementation.
//!
//! Blobs are immutable and addressed by the SHA-256 of their bytes. The
//! filesystem store shards objects by hash prefix (`ab/cd/abcd…`) so a
//! single directory never grows unbounded.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{Result, StoreError};

#[async_trait]
pub trait BlobStore: Send + Sync {
	/// Store the file at `src` under the given address. Overwriting an
	/// existing object with identical content is a no-op.
	async fn put_file(&self, src: &Path, sha256: &str) -> Result<()>;

	/// Copy a blob's bytes out to `dest`. Returns the byte count.
	async fn fetch_to(&self, sha256: &str, dest: &Path) -> Result<u64>;

	async fn exists(&self, sha256: &str) -> Result<bool>;

	async fn delete(&self, sha256: &str) -> Result<()>;
}

/// Filesystem-backed blob store.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
	root: PathBuf,
}

impl FsBlobStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	fn object_path(&self, sha256: &str) -> Result<PathBuf> {
		if sha256.len() != 64 || !sha256.chars().all(|c| c.is_ascii_hexdigit()) {
			return Err(StoreError::InvalidAddress(sha256.to_string()));
		}
		Ok(self.root.join(&sha256[..2]).join(&sha256[2..4]).join(sha256))
	}
}

#[async_trait]
impl BlobStore for FsBlobStore {
	#[tracing::instrument(skip(self, src))]
	async fn put_file(&self, src: &Path, sha256: &str) -> Result<()> {
		let dest = self.object_path(sha256)?;
		if fs::try_exists(&dest).await? {
			return Ok(());
		}
		if let Some(parent) = dest.parent() {
			fs::create_dir_all(parent).await?;
		}

		// Copy into place via a sibling temp file so readers never observe
		// a partially written object.
		let staging = dest.with_extension("tmp");
		fs::copy(src, &staging).await?;
		fs::rename(&staging, &dest).await?;

		tracing::debug!(sha256 = %sha256, "blob stored");
		Ok(())
	}

	#[tracing::instrument(skip(self, dest))]
	async fn fetch_to(&self, sha256: &str, dest: &Path) -> Result<u64> {
		let src = self.object_path(sha256)?;
		match fs::copy(&src, dest).await {
			Ok(bytes) => Ok(bytes),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				Err(StoreError::NotFound(sha256.to_string()))
			}
			Err(e) => Err(e.into()),
		}
	}

	async fn exists(&self, sha256: &str) -> Result<bool> {
		Ok(fs::try_exists(&self.object_path(sha256)?).await?)
	}

	#[tracing::instrument(skip(self))]
	async fn delete(&self, sha256: &str) -> Result<()> {
		match fs::remove_file(&self.object_path(sha256)?).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				Err(StoreError::NotFound(sha256.to_string()))
			}
			Err(e) => Err(e.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	async fn write_source(dir: &Path, contents: &[u8]) -> PathBuf {
		let path = dir.join("source.sqlite");
		fs::write(&path, contents).await.unwrap();
		path
	}

	#[tokio::test]
	async fn test_put_fetch_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let store = FsBlobStore::new(dir.path().join("blobs"));
		let sha = "ab".repeat(32);

		let src = write_source(dir.path(), b"hello blob").await;
		store.put_file(&src, &sha).await.unwrap();
		assert!(store.exists(&sha).await.unwrap());

		let dest = dir.path().join("out.sqlite");
		let bytes = store.fetch_to(&sha, &dest).await.unwrap();
		assert_eq!(bytes, 10);
		assert_eq!(fs::read(&dest).await.unwrap(), b"hello blob");
	}

	#[tokio::test]
	async fn test_fetch_missing_blob() {
		let dir = tempfile::tempdir().unwrap();
		let store = FsBlobStore::new(dir.path().join("blobs"));

		let err = store
			.fetch_to(&"cd".repeat(32), &dir.path().join("out"))
			.await
			.unwrap_err();
		assert!(matches!(err, StoreError::NotFound(_)));
	}

	#[tokio::test]
	async fn test_invalid_address_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let store = FsBlobStore::new(dir.path().join("blobs"));

		let err = store.exists("not-a-sha").await.unwrap_err();
		assert!(matches!(err, StoreError::InvalidAddress(_)));
	}

	#[tokio::test]
	async fn test_delete() {
		let dir = tempfile::tempdir().unwrap();
		let store = FsBlobStore::new(dir.path().join("blobs"));
		let sha = "ef".repeat(32);

		let src = write_source(dir.path(), b"bytes").await;
		store.put_file(&src, &sha).await.unwrap();
		store.delete(&sha).await.unwrap();
		assert!(!store.exists(&sha).await.unwrap());
		assert!(matches!(
			store.delete(&sha).await.unwrap_err(),
			StoreError::NotFound(_)
		));
	}
}
