// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Artifact cache.
//!
//! Caches expensive-to-recompute JSON (metadata snapshots, rendered page
//! data) keyed per database. Keys are namespaced `db/<owner>/<name>/…` so a
//! delete, rename, visibility change or commit mutation can evict the whole
//! database with one prefix sweep. Cache failures never fail a request.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Key prefix covering every artifact of one database.
pub fn database_prefix(owner: &str, name: &str) -> String {
	format!("db/{}/{}/", owner.to_lowercase(), name)
}

/// Key of the cached metadata snapshot.
pub fn metadata_key(owner: &str, name: &str) -> String {
	format!("{}metadata", database_prefix(owner, name))
}

#[async_trait]
pub trait ArtifactCache: Send + Sync {
	async fn get(&self, key: &str) -> Option<serde_json::Value>;
	async fn put(&self, key: &str, value: serde_json::Value);
	/// Remove every artifact whose key starts with `prefix`.
	async fn invalidate_prefix(&self, prefix: &str);
}

/// In-memory artifact cache with insertion-order eviction.
pub struct MemoryArtifactCache {
	capacity: usize,
	inner: RwLock<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
	map: HashMap<String, serde_json::Value>,
	order: VecDeque<String>,
}

impl MemoryArtifactCache {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			inner: RwLock::new(CacheInner::default()),
		}
	}
}

#[async_trait]
impl ArtifactCache for MemoryArtifactCache {
	async fn get(&self, key: &str) -> Option<serde_json::Value> {
		self.inner.read().await.map.get(key).cloned()
	}

	async fn put(&self, key: &str, value: serde_json::Value) {
		let mut inner = self.inner.write().await;
		if !inner.map.contains_key(key) {
			while inner.order.len() >= self.capacity {
				if let Some(oldest) = inner.order.pop_front() {
					inner.map.remove(&oldest);
				}
			}
			inner.order.push_back(key.to_string());
		}
		inner.map.insert(key.to_string(), value);
	}

	async fn invalidate_prefix(&self, prefix: &str) {
		let mut inner = self.inner.write().await;
		inner.map.retain(|k, _| !k.starts_with(prefix));
		inner.order.retain(|k| !k.starts_with(prefix));
		tracing::debug!(prefix = %prefix, "cache prefix invalidated");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[tokio::test]
	async fn test_put_get_and_invalidate() {
		let cache = MemoryArtifactCache::new(16);
		let key = metadata_key("alice", "weather.sqlite");

		assert!(cache.get(&key).await.is_none());
		cache.put(&key, json!({"branches": 1})).await;
		assert_eq!(cache.get(&key).await.unwrap()["branches"], 1);

		cache
			.invalidate_prefix(&database_prefix("alice", "weather.sqlite"))
			.await;
		assert!(cache.get(&key).await.is_none());
	}

	#[tokio::test]
	async fn test_prefix_does_not_cross_databases() {
		let cache = MemoryArtifactCache::new(16);
		cache
			.put(&metadata_key("alice", "weather.sqlite"), json!(1))
			.await;
		cache.put(&metadata_key("alice", "other.sqlite"), json!(2)).await;

		cache
			.invalidate_prefix(&database_prefix("alice", "weather.sqlite"))
			.await;
		assert!(cache
			.get(&metadata_key("alice", "other.sqlite"))
			.await
			.is_some());
	}

	#[tokio::test]
	async fn test_eviction_drops_oldest() {
		let cache = MemoryArtifactCache::new(2);
		cache.put("a", json!(1)).await;
		cache.put("b", json!(2)).await;
		cache.put("c", json!(3)).await;

		assert!(cache.get("a").await.is_none());
		assert!(cache.get("b").await.is_some());
		assert!(cache.get("c").await.is_some());
	}

	#[test]
	fn test_owner_case_folds_into_prefix() {
		assert_eq!(
			database_prefix("Alice", "db"),
			database_prefix("alice", "db")
		);
	}
}
