// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use silo_server_db::DbError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
	/// Missing, unknown or expired credential. Deliberately a single
	/// variant: callers must not learn which condition failed.
	#[error("Unknown API key")]
	Unauthenticated,

	#[error("Rate limit exceeded")]
	RateLimited,

	#[error(transparent)]
	Db(#[from] DbError),
}

pub type Result<T> = std::result::Result<T, AuthError>;
