// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-request response waiters.
//!
//! The listener task must not run waiter code in its callback: it pushes
//! each payload through a oneshot channel looked up in this map, keyed by
//! submission id. The submission id is the sole correlation token.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

use crate::envelope::JobResponsePayload;

pub struct ResponseWaiters {
	pending: Mutex<HashMap<String, oneshot::Sender<JobResponsePayload>>>,
}

impl ResponseWaiters {
	pub fn new() -> Self {
		Self {
			pending: Mutex::new(HashMap::new()),
		}
	}

	/// Register a waiter before its submission is published, so the response
	/// can never race past it.
	pub fn register(&self, submission_id: &str) -> oneshot::Receiver<JobResponsePayload> {
		let (tx, rx) = oneshot::channel();
		self
			.pending
			.lock()
			.expect("waiter map poisoned")
			.insert(submission_id.to_string(), tx);
		rx
	}

	/// Hand a payload to its waiter. Returns `false` for an unknown id
	/// (timed-out waiter or a response this node never asked for).
	pub fn deliver(&self, submission_id: &str, payload: JobResponsePayload) -> bool {
		let waiter = self
			.pending
			.lock()
			.expect("waiter map poisoned")
			.remove(submission_id);
		match waiter {
			Some(tx) => tx.send(payload).is_ok(),
			None => false,
		}
	}

	/// Drop a waiter after its request timed out.
	pub fn cancel(&self, submission_id: &str) {
		self
			.pending
			.lock()
			.expect("waiter map poisoned")
			.remove(submission_id);
	}

	pub fn len(&self) -> usize {
		self.pending.lock().expect("waiter map poisoned").len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Default for ResponseWaiters {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_register_deliver_round_trip() {
		let waiters = ResponseWaiters::new();
		let rx = waiters.register("sub-1");

		assert!(waiters.deliver("sub-1", JobResponsePayload::ok(serde_json::json!(1))));
		let payload = rx.await.unwrap();
		assert_eq!(payload.result.unwrap(), serde_json::json!(1));
		assert!(waiters.is_empty());
	}

	#[test]
	fn test_unknown_id_is_reported() {
		let waiters = ResponseWaiters::new();
		assert!(!waiters.deliver("ghost", JobResponsePayload::err("late")));
	}

	#[test]
	fn test_cancel_discards_late_response() {
		let waiters = ResponseWaiters::new();
		let rx = waiters.register("sub-1");
		waiters.cancel("sub-1");
		drop(rx);

		assert!(!waiters.deliver("sub-1", JobResponsePayload::err("late")));
	}
}
