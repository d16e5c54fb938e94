// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared store types.

use serde::{Deserialize, Serialize};

/// Access level carried by an API key or a share grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
	ReadOnly,
	ReadWrite,
}

impl Permission {
	pub fn as_str(&self) -> &'static str {
		match self {
			Permission::ReadOnly => "read_only",
			Permission::ReadWrite => "read_write",
		}
	}

	/// Whether this permission satisfies a request for `write`.
	pub fn allows_write(&self) -> bool {
		matches!(self, Permission::ReadWrite)
	}
}

impl std::str::FromStr for Permission {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"read_only" => Ok(Permission::ReadOnly),
			"read_write" => Ok(Permission::ReadWrite),
			_ => Err(format!("unknown permission: {s}")),
		}
	}
}

/// Refill period of a token-bucket rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPeriod {
	Second,
	Minute,
	Hour,
	Day,
	Month,
}

impl LimitPeriod {
	pub fn as_secs(&self) -> i64 {
		match self {
			LimitPeriod::Second => 1,
			LimitPeriod::Minute => 60,
			LimitPeriod::Hour => 3600,
			LimitPeriod::Day => 86_400,
			LimitPeriod::Month => 30 * 86_400,
		}
	}
}

/// One token-bucket rule of a usage-limits profile.
///
/// A profile is an ordered list of these; an empty list means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitRule {
	/// Bucket capacity.
	pub limit: i64,
	pub period: LimitPeriod,
	/// Tokens restored every `period`.
	pub increase: i64,
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::str::FromStr;

	#[test]
	fn test_permission_round_trip() {
		for p in [Permission::ReadOnly, Permission::ReadWrite] {
			assert_eq!(Permission::from_str(p.as_str()).unwrap(), p);
		}
		assert!(Permission::from_str("admin").is_err());
	}

	#[test]
	fn test_permission_write_check() {
		assert!(!Permission::ReadOnly.allows_write());
		assert!(Permission::ReadWrite.allows_write());
	}

	#[test]
	fn test_limit_rule_json_shape() {
		let rule = LimitRule {
			limit: 10,
			period: LimitPeriod::Second,
			increase: 10,
		};
		let json = serde_json::to_string(&rule).unwrap();
		assert_eq!(json, r#"{"limit":10,"period":"second","increase":10}"#);
	}
}
