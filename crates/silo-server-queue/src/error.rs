// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use silo_server_db::DbError;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
	/// The submitter's wait elapsed before the worker replied. The job is
	/// not cancelled; a late response is discarded.
	#[error("timed out waiting for the live node to respond")]
	Timeout,

	#[error(transparent)]
	Db(#[from] DbError),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;
