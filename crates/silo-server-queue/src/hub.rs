// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Named notification channels.
//!
//! Channels carry only submission ids as wake-up pokes; all real state is in
//! the durable tables, so a dropped notification costs latency (until the
//! sweep) but never correctness.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Channel a worker node listens on for new jobs.
pub fn job_channel(node: &str) -> String {
	format!("jobs_{node}")
}

/// Channel an API node listens on for worker replies.
pub fn response_channel(node: &str) -> String {
	format!("responses_{node}")
}

/// In-process registry of named broadcast channels.
pub struct NotifyHub {
	channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl NotifyHub {
	pub fn new() -> Self {
		Self {
			channels: Mutex::new(HashMap::new()),
		}
	}

	fn sender(&self, channel: &str) -> broadcast::Sender<String> {
		let mut channels = self.channels.lock().expect("notify hub poisoned");
		channels
			.entry(channel.to_string())
			.or_insert_with(|| broadcast::channel(256).0)
			.clone()
	}

	/// Publish a submission id. A channel with no listeners drops the poke;
	/// the sweep covers that window.
	pub fn notify(&self, channel: &str, submission_id: &str) {
		let _ = self.sender(channel).send(submission_id.to_string());
	}

	pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
		self.sender(channel).subscribe()
	}
}

impl Default for NotifyHub {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_subscribe_then_notify() {
		let hub = NotifyHub::new();
		let mut rx = hub.subscribe(&job_channel("node-7"));

		hub.notify(&job_channel("node-7"), "sub-1");
		assert_eq!(rx.recv().await.unwrap(), "sub-1");
	}

	#[tokio::test]
	async fn test_channels_are_isolated() {
		let hub = NotifyHub::new();
		let mut seven = hub.subscribe(&job_channel("node-7"));
		let _eight = hub.subscribe(&job_channel("node-8"));

		hub.notify(&job_channel("node-8"), "sub-1");
		hub.notify(&job_channel("node-7"), "sub-2");
		assert_eq!(seven.recv().await.unwrap(), "sub-2");
	}

	#[test]
	fn test_notify_without_listeners_is_fine() {
		let hub = NotifyHub::new();
		hub.notify(&response_channel("api-1"), "sub-1");
	}
}
