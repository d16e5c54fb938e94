// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("blob not found: {0}")]
	NotFound(String),

	#[error("invalid blob address: {0}")]
	InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
