// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Live-database job queue configuration.

use serde::Deserialize;

/// Queue configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct QueueConfig {
	/// This node's identifier on the queue channels.
	pub node_id: String,
	/// How long a live request waits for its worker response.
	pub job_timeout_secs: u64,
	/// Interval of the response sweep task.
	pub sweep_interval_secs: u64,
	/// Claimed jobs older than this are reaped as failed.
	pub claimed_ttl_secs: u64,
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			node_id: "node-1".to_string(),
			job_timeout_secs: 30,
			sweep_interval_secs: 5,
			claimed_ttl_secs: 300,
		}
	}
}

/// Queue configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueConfigLayer {
	#[serde(default)]
	pub node_id: Option<String>,
	#[serde(default)]
	pub job_timeout_secs: Option<u64>,
	#[serde(default)]
	pub sweep_interval_secs: Option<u64>,
	#[serde(default)]
	pub claimed_ttl_secs: Option<u64>,
}

impl QueueConfigLayer {
	pub fn merge(&mut self, other: QueueConfigLayer) {
		if other.node_id.is_some() {
			self.node_id = other.node_id;
		}
		if other.job_timeout_secs.is_some() {
			self.job_timeout_secs = other.job_timeout_secs;
		}
		if other.sweep_interval_secs.is_some() {
			self.sweep_interval_secs = other.sweep_interval_secs;
		}
		if other.claimed_ttl_secs.is_some() {
			self.claimed_ttl_secs = other.claimed_ttl_secs;
		}
	}

	pub fn finalize(self) -> QueueConfig {
		let defaults = QueueConfig::default();
		QueueConfig {
			node_id: self.node_id.unwrap_or(defaults.node_id),
			job_timeout_secs: self.job_timeout_secs.unwrap_or(defaults.job_timeout_secs),
			sweep_interval_secs: self
				.sweep_interval_secs
				.unwrap_or(defaults.sweep_interval_secs),
			claimed_ttl_secs: self.claimed_ttl_secs.unwrap_or(defaults.claimed_ttl_secs),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = QueueConfigLayer::default().finalize();
		assert_eq!(config.node_id, "node-1");
		assert_eq!(config.job_timeout_secs, 30);
	}
}
