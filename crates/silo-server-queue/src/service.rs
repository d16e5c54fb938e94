// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The queue service shared by request handlers, workers and the background
//! tasks.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use silo_server_db::{JobState, JobSubmission, NewSubmission, QueueRepository};

use crate::envelope::{JobEnvelope, JobResponsePayload};
use crate::error::{QueueError, Result};
use crate::hub::{job_channel, response_channel, NotifyHub};
use crate::waiters::ResponseWaiters;

pub struct JobQueue {
	repo: QueueRepository,
	hub: Arc<NotifyHub>,
	waiters: Arc<ResponseWaiters>,
	node_id: String,
	job_timeout: Duration,
}

impl JobQueue {
	pub fn new(
		repo: QueueRepository,
		hub: Arc<NotifyHub>,
		node_id: impl Into<String>,
		job_timeout: Duration,
	) -> Self {
		Self {
			repo,
			hub,
			waiters: Arc::new(ResponseWaiters::new()),
			node_id: node_id.into(),
			job_timeout,
		}
	}

	pub fn node_id(&self) -> &str {
		&self.node_id
	}

	pub fn hub(&self) -> &Arc<NotifyHub> {
		&self.hub
	}

	pub(crate) fn repo(&self) -> &QueueRepository {
		&self.repo
	}

	pub(crate) fn waiters(&self) -> &Arc<ResponseWaiters> {
		&self.waiters
	}

	/// Submit a job without waiting for its response. Used by operations
	/// whose outcome the caller does not need (e.g. deleting a live body
	/// after the row is already gone).
	#[tracing::instrument(skip(self, envelope), fields(operation = %envelope.operation.name(), target_node = %envelope.target_node))]
	pub async fn submit(&self, envelope: &JobEnvelope) -> Result<String> {
		let submission_id = Uuid::new_v4().to_string();
		self
			.repo
			.submit(&NewSubmission {
				id: submission_id.clone(),
				submitter_node: self.node_id.clone(),
				target_node: envelope.target_node.clone(),
				db_owner: envelope.owner.clone(),
				db_name: envelope.name.clone(),
				operation: envelope.operation.name().to_string(),
				payload: serde_json::to_string(envelope)?,
			})
			.await?;
		self
			.hub
			.notify(&job_channel(&envelope.target_node), &submission_id);
		Ok(submission_id)
	}

	/// Submit a job and block until its response arrives or the wait times
	/// out. On timeout the waiter is dropped and a late response is
	/// discarded by the delivery path; the job itself runs to completion.
	#[tracing::instrument(skip(self, envelope), fields(operation = %envelope.operation.name(), target_node = %envelope.target_node))]
	pub async fn submit_and_wait(&self, envelope: &JobEnvelope) -> Result<JobResponsePayload> {
		let submission_id = Uuid::new_v4().to_string();
		let rx = self.waiters.register(&submission_id);

		let submit = async {
			self
				.repo
				.submit(&NewSubmission {
					id: submission_id.clone(),
					submitter_node: self.node_id.clone(),
					target_node: envelope.target_node.clone(),
					db_owner: envelope.owner.clone(),
					db_name: envelope.name.clone(),
					operation: envelope.operation.name().to_string(),
					payload: serde_json::to_string(envelope)?,
				})
				.await?;
			Ok::<_, QueueError>(())
		};
		if let Err(e) = submit.await {
			self.waiters.cancel(&submission_id);
			return Err(e);
		}

		self
			.hub
			.notify(&job_channel(&envelope.target_node), &submission_id);

		match tokio::time::timeout(self.job_timeout, rx).await {
			Ok(Ok(payload)) => Ok(payload),
			// Channel closed without a payload; treat like a timeout.
			Ok(Err(_)) => {
				self.waiters.cancel(&submission_id);
				Err(QueueError::Timeout)
			}
			Err(_) => {
				self.waiters.cancel(&submission_id);
				tracing::warn!(submission_id = %submission_id, "live request timed out");
				Err(QueueError::Timeout)
			}
		}
	}

	/// Worker contract: claim the oldest pending job for a node. Exactly one
	/// claimant wins each row.
	pub async fn claim_next(&self, node: &str) -> Result<Option<(JobSubmission, JobEnvelope)>> {
		let Some(submission) = self.repo.claim_next(node).await? else {
			return Ok(None);
		};
		let envelope: JobEnvelope = serde_json::from_str(&submission.payload)?;
		Ok(Some((submission, envelope)))
	}

	/// Worker contract: record the outcome and poke the submitter's
	/// response channel.
	#[tracing::instrument(skip(self, payload), fields(submission_id = %submission.id))]
	pub async fn respond(
		&self,
		submission: &JobSubmission,
		payload: &JobResponsePayload,
	) -> Result<()> {
		self
			.repo
			.write_response(
				&submission.id,
				&submission.submitter_node,
				&serde_json::to_string(payload)?,
			)
			.await?;

		let state = if payload.error.is_some() {
			JobState::Failed
		} else {
			JobState::Complete
		};
		self.repo.finish(&submission.id, state).await?;

		self
			.hub
			.notify(&response_channel(&submission.submitter_node), &submission.id);
		Ok(())
	}

	/// Dispatch every ready response row for this node to its waiter.
	///
	/// Rows whose waiter is gone (timed out) or unknown are logged and
	/// dropped; either way the row is marked delivered so the sweep does not
	/// loop on it.
	pub async fn deliver_ready(&self) -> Result<usize> {
		let ready = self.repo.undelivered_responses(&self.node_id).await?;
		let mut delivered = 0;

		for row in ready {
			let payload: JobResponsePayload = match serde_json::from_str(&row.payload) {
				Ok(payload) => payload,
				Err(e) => {
					tracing::error!(submission_id = %row.submission_id, error = %e, "undecodable response payload");
					self.repo.mark_delivered(&row.submission_id).await?;
					continue;
				}
			};

			if self.waiters.deliver(&row.submission_id, payload) {
				delivered += 1;
			} else {
				tracing::warn!(submission_id = %row.submission_id, "response without a waiter, dropped");
			}
			self.repo.mark_delivered(&row.submission_id).await?;
		}

		Ok(delivered)
	}
}
