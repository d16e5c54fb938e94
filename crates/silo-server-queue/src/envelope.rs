// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job envelopes and response payloads.
//!
//! The payload is a tagged variant per operation rather than one opaque
//! union: unknown operations fail deserialisation on receipt and never reach
//! a worker's execution path.

use serde::{Deserialize, Serialize};

/// Work a live node can perform, with its per-operation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum JobOperation {
	Tables,
	Views,
	Indexes,
	Columns { table: String },
	/// Read-only SQL.
	Query { sql: String },
	/// Mutating SQL; the only operation that requires a live database.
	Execute { sql: String },
	/// Materialise a fresh live database from a stored blob.
	Create { blob_sha: String },
	Delete,
}

impl JobOperation {
	pub fn name(&self) -> &'static str {
		match self {
			JobOperation::Tables => "tables",
			JobOperation::Views => "views",
			JobOperation::Indexes => "indexes",
			JobOperation::Columns { .. } => "columns",
			JobOperation::Query { .. } => "query",
			JobOperation::Execute { .. } => "execute",
			JobOperation::Create { .. } => "create",
			JobOperation::Delete => "delete",
		}
	}
}

/// A unit of work dispatched from an API node to a worker node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvelope {
	#[serde(flatten)]
	pub operation: JobOperation,
	pub submitter_node: String,
	pub target_node: String,
	pub caller: String,
	pub owner: String,
	pub name: String,
}

/// A worker's reply: a structured result or an error message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResponsePayload {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<serde_json::Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl JobResponsePayload {
	pub fn ok(result: serde_json::Value) -> Self {
		Self {
			result: Some(result),
			error: None,
		}
	}

	pub fn err(message: impl Into<String>) -> Self {
		Self {
			result: None,
			error: Some(message.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_envelope_round_trip() {
		let envelope = JobEnvelope {
			operation: JobOperation::Query {
				sql: "SELECT 1".to_string(),
			},
			submitter_node: "api-1".to_string(),
			target_node: "node-7".to_string(),
			caller: "alice".to_string(),
			owner: "alice".to_string(),
			name: "live.db".to_string(),
		};

		let json = serde_json::to_string(&envelope).unwrap();
		assert!(json.contains(r#""operation":"query""#));
		let back: JobEnvelope = serde_json::from_str(&json).unwrap();
		assert_eq!(back, envelope);
	}

	#[test]
	fn test_unknown_operation_rejected_on_receipt() {
		let json = r#"{
			"operation": "shutdown",
			"submitter_node": "api-1",
			"target_node": "node-7",
			"caller": "alice",
			"owner": "alice",
			"name": "live.db"
		}"#;
		assert!(serde_json::from_str::<JobEnvelope>(json).is_err());
	}

	#[test]
	fn test_response_payload_shapes() {
		let ok = JobResponsePayload::ok(serde_json::json!([["row"]]));
		assert!(serde_json::to_string(&ok).unwrap().starts_with(r#"{"result""#));

		let err = JobResponsePayload::err("worker exploded");
		assert_eq!(
			serde_json::to_string(&err).unwrap(),
			r#"{"error":"worker exploded"}"#
		);
	}
}
