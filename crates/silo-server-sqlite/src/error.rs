// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum SqliteError {
	#[error("SQLite error: {0}")]
	Sqlite(#[from] rusqlite::Error),

	#[error("not a valid SQLite database: {0}")]
	NotSqlite(String),

	#[error("{0}")]
	NotReadOnly(String),

	#[error("no such table or view: {0}")]
	UnknownObject(String),

	#[error("query aborted: statement budget exceeded")]
	BudgetExceeded,
}

impl SqliteError {
	/// Whether an execution failure was the progress handler firing.
	pub fn is_interrupt(err: &rusqlite::Error) -> bool {
		matches!(
			err,
			rusqlite::Error::SqliteFailure(e, _)
				if e.code == rusqlite::ErrorCode::OperationInterrupted
		)
	}
}

pub type Result<T> = std::result::Result<T, SqliteError>;
