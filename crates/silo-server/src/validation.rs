// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Field validation for the v1 endpoints.
//!
//! Every user-supplied identifier is matched against a fixed grammar before
//! it reaches the store or the filesystem.

use regex::Regex;
use std::sync::LazyLock;

use crate::api_response::ApiError;

static USERNAME_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]{0,62}$").unwrap());

static DBNAME_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 .\-_()+]{0,255}$").unwrap());

static COMMIT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-f0-9]{64}$").unwrap());

static BRANCH_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 ._\-]{0,255}$").unwrap());

static LICENCE_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 .\-_()+]{0,63}$").unwrap());

pub fn require_username(value: &str) -> Result<(), ApiError> {
	if USERNAME_REGEX.is_match(value) {
		Ok(())
	} else {
		Err(ApiError::BadRequest("Invalid database owner name".to_string()))
	}
}

pub fn require_dbname(value: &str) -> Result<(), ApiError> {
	if DBNAME_REGEX.is_match(value) {
		Ok(())
	} else {
		Err(ApiError::BadRequest("Invalid database name".to_string()))
	}
}

/// Commit ids are 64 lowercase hex characters.
pub fn require_commit(value: &str) -> Result<(), ApiError> {
	if COMMIT_REGEX.is_match(value) {
		Ok(())
	} else {
		Err(ApiError::BadRequest("Invalid commit ID".to_string()))
	}
}

pub fn require_commit_opt(value: Option<&str>) -> Result<(), ApiError> {
	match value {
		Some(commit) => require_commit(commit),
		None => Ok(()),
	}
}

pub fn require_branch(value: &str) -> Result<(), ApiError> {
	if BRANCH_REGEX.is_match(value) {
		Ok(())
	} else {
		Err(ApiError::BadRequest("Invalid branch name".to_string()))
	}
}

pub fn require_licence(value: &str) -> Result<(), ApiError> {
	if LICENCE_REGEX.is_match(value) {
		Ok(())
	} else {
		Err(ApiError::BadRequest("Invalid licence name".to_string()))
	}
}

/// Boolean form fields arrive as "true"/"false" or "1"/"0".
pub fn flag(value: Option<&str>) -> bool {
	matches!(value, Some("true") | Some("1"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_usernames() {
		assert!(require_username("alice").is_ok());
		assert!(require_username("Alice-2").is_ok());
		assert!(require_username("").is_err());
		assert!(require_username("-alice").is_err());
		assert!(require_username("a/../b").is_err());
	}

	#[test]
	fn test_dbnames() {
		assert!(require_dbname("weather.sqlite").is_ok());
		assert!(require_dbname("My Data (2024).db").is_ok());
		assert!(require_dbname("deleted-database-a1B2c3D4e5F6g7H8i9J0").is_ok());
		assert!(require_dbname("").is_err());
		assert!(require_dbname("../etc/passwd").is_err());
		assert!(require_dbname("a\nb").is_err());
	}

	#[test]
	fn test_commits() {
		assert!(require_commit(&"a1".repeat(32)).is_ok());
		assert!(require_commit("xyz").is_err());
		assert!(require_commit(&"A1".repeat(32)).is_err());
		assert!(require_commit_opt(None).is_ok());
	}

	#[test]
	fn test_flags() {
		assert!(flag(Some("true")));
		assert!(flag(Some("1")));
		assert!(!flag(Some("false")));
		assert!(!flag(Some("0")));
		assert!(!flag(None));
	}

	proptest! {
		// Nothing that passes the grammar can smuggle path separators or
		// control characters.
		#[test]
		fn accepted_dbnames_are_path_safe(name in ".{0,300}") {
			if require_dbname(&name).is_ok() {
				prop_assert!(!name.contains('/'));
				prop_assert!(!name.contains('\\'));
				prop_assert!(!name.chars().any(|c| c.is_control()));
			}
		}

		#[test]
		fn accepted_commits_are_lowercase_hex(commit in ".{0,100}") {
			if require_commit(&commit).is_ok() {
				prop_assert_eq!(commit.len(), 64);
				prop_assert!(commit.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
			}
		}
	}
}
