// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background tasks of an API node.
//!
//! One listener holds the node's single response-channel subscription and
//! dispatches ready rows on every poke. One sweep task runs on an interval:
//! it redelivers responses the listener missed (disconnects, restarts),
//! renotifies stale pending jobs once, and reaps claimed jobs whose worker
//! went quiet past the TTL, failing them with an error response.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::envelope::JobResponsePayload;
use crate::hub::{job_channel, response_channel};
use crate::service::JobQueue;

pub struct ResponseRouter {
	shutdown_tx: broadcast::Sender<()>,
	handles: Vec<JoinHandle<()>>,
}

impl ResponseRouter {
	/// Spawn the listener and sweep tasks for a node.
	pub fn start(queue: Arc<JobQueue>, sweep_interval: Duration, claimed_ttl: Duration) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);

		let listener = spawn_listener(Arc::clone(&queue), shutdown_tx.subscribe());
		let sweeper = spawn_sweep(queue, sweep_interval, claimed_ttl, shutdown_tx.subscribe());

		Self {
			shutdown_tx,
			handles: vec![listener, sweeper],
		}
	}

	pub async fn shutdown(self) {
		let _ = self.shutdown_tx.send(());
		for handle in self.handles {
			let _ = handle.await;
		}
	}
}

fn spawn_listener(queue: Arc<JobQueue>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
	let mut rx = queue.hub().subscribe(&response_channel(queue.node_id()));

	tokio::spawn(async move {
		loop {
			tokio::select! {
				poke = rx.recv() => {
					match poke {
						Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
							// The poke only says "rows are ready"; lagging is
							// harmless because delivery reads every ready row.
							if let Err(e) = queue.deliver_ready().await {
								warn!(error = %e, "response delivery failed");
							}
						}
						Err(broadcast::error::RecvError::Closed) => break,
					}
				}
				_ = shutdown_rx.recv() => {
					info!("response listener shutting down");
					break;
				}
			}
		}
	})
}

fn spawn_sweep(
	queue: Arc<JobQueue>,
	interval: Duration,
	claimed_ttl: Duration,
	mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = ticker.tick() => {
					if let Err(e) = sweep_once(&queue, interval, claimed_ttl).await {
						warn!(error = %e, "queue sweep failed");
					}
				}
				_ = shutdown_rx.recv() => {
					info!("queue sweep shutting down");
					break;
				}
			}
		}
	})
}

async fn sweep_once(
	queue: &JobQueue,
	interval: Duration,
	claimed_ttl: Duration,
) -> crate::error::Result<()> {
	// Responses delivered while the listener was momentarily disconnected.
	queue.deliver_ready().await?;

	// Pending jobs whose first notification was lost get exactly one more.
	let grace = Utc::now() - chrono::Duration::from_std(interval).unwrap_or_default();
	for submission in queue.repo().stale_pending(grace).await? {
		queue
			.hub()
			.notify(&job_channel(&submission.target_node), &submission.id);
		queue.repo().mark_renotified(&submission.id).await?;
		warn!(submission_id = %submission.id, "renotified stale pending job");
	}

	// In-flight jobs whose submitter or worker died are failed after a TTL
	// so their waiters (if any remain) get an answer.
	let cutoff = Utc::now() - chrono::Duration::from_std(claimed_ttl).unwrap_or_default();
	for submission in queue.repo().reap_claimed(cutoff).await? {
		queue
			.repo()
			.write_response(
				&submission.id,
				&submission.submitter_node,
				&serde_json::to_string(&JobResponsePayload::err(
					"live node did not complete the job",
				))?,
			)
			.await?;
		queue
			.hub()
			.notify(&response_channel(&submission.submitter_node), &submission.id);
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::envelope::{JobEnvelope, JobOperation};
	use crate::hub::NotifyHub;
	use silo_server_db::testing::create_migrated_pool;
	use silo_server_db::QueueRepository;

	async fn queue() -> Arc<JobQueue> {
		let pool = create_migrated_pool().await;
		Arc::new(JobQueue::new(
			QueueRepository::new(pool),
			Arc::new(NotifyHub::new()),
			"api-1",
			Duration::from_secs(5),
		))
	}

	#[tokio::test]
	async fn test_sweep_renotifies_stale_pending_once() {
		let queue = queue().await;
		let envelope = JobEnvelope {
			operation: JobOperation::Tables,
			submitter_node: "api-1".to_string(),
			target_node: "node-7".to_string(),
			caller: "alice".to_string(),
			owner: "alice".to_string(),
			name: "live.db".to_string(),
		};

		// Submit without waiting so the row sits pending.
		let waiter = {
			let queue = Arc::clone(&queue);
			tokio::spawn(async move { queue.submit_and_wait(&envelope).await })
		};
		tokio::time::sleep(Duration::from_millis(50)).await;

		let mut jobs = queue.hub().subscribe(&job_channel("node-7"));
		// Zero-length grace treats the fresh row as stale immediately.
		sweep_once(&queue, Duration::from_secs(0), Duration::from_secs(300))
			.await
			.unwrap();
		let poke = jobs.recv().await.unwrap();
		assert!(!poke.is_empty());

		// Second sweep must not renotify again.
		sweep_once(&queue, Duration::from_secs(0), Duration::from_secs(300))
			.await
			.unwrap();
		assert!(jobs.try_recv().is_err());

		waiter.abort();
	}

	#[tokio::test]
	async fn test_sweep_reaps_dead_worker() {
		let queue = queue().await;
		let envelope = JobEnvelope {
			operation: JobOperation::Execute {
				sql: "DELETE FROM t".to_string(),
			},
			submitter_node: "api-1".to_string(),
			target_node: "node-7".to_string(),
			caller: "alice".to_string(),
			owner: "alice".to_string(),
			name: "live.db".to_string(),
		};

		let router = ResponseRouter::start(
			Arc::clone(&queue),
			Duration::from_millis(20),
			Duration::from_secs(0),
		);

		// The worker claims and then dies without responding; the zero TTL
		// lets the sweep fail it on the next tick.
		let claimer = Arc::clone(&queue);
		tokio::spawn(async move {
			loop {
				if claimer.claim_next("node-7").await.unwrap().is_some() {
					break;
				}
				tokio::time::sleep(Duration::from_millis(5)).await;
			}
		});

		let payload = queue.submit_and_wait(&envelope).await.unwrap();
		assert_eq!(
			payload.error.as_deref(),
			Some("live node did not complete the job")
		);

		router.shutdown().await;
	}
}
