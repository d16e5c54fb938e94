// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable job queue between API nodes and live-database workers.
//!
//! An API node serialises each live operation into a job envelope, persists
//! it, and pokes the target worker's notification channel. The worker claims
//! the row (exactly one winner), executes it against the single SQLite file
//! it owns for that database, writes a response row and pokes the
//! submitter's channel. A per-node listener task hands responses to blocked
//! request waiters; a periodic sweep redelivers anything the listener
//! missed, so delivery is at-least-once even across restarts.

pub mod envelope;
pub mod error;
pub mod hub;
pub mod listener;
pub mod service;
pub mod waiters;

pub use envelope::{JobEnvelope, JobOperation, JobResponsePayload};
pub use error::{QueueError, Result};
pub use hub::{job_channel, response_channel, NotifyHub};
pub use listener::ResponseRouter;
pub use service::JobQueue;
pub use waiters::ResponseWaiters;
