// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Form bodies accepted by the v1 endpoints.
//!
//! `dbowner` and `dbname` arrive URL-encoded; the form decoder undoes that.
//! Booleans arrive as the strings "true"/"false" ("0"/"1" for
//! `include_data`), matching what existing clients send.

use serde::Deserialize;

/// Fields shared by every database-addressed read endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseReadRequest {
	pub apikey: String,
	pub dbowner: String,
	pub dbname: String,
	/// Commit id (64 lowercase hex); defaults to the head of the default
	/// branch.
	#[serde(default)]
	pub commit: Option<String>,
}

/// `/v1/columns`.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnsRequest {
	pub apikey: String,
	pub dbowner: String,
	pub dbname: String,
	#[serde(default)]
	pub commit: Option<String>,
	pub table: String,
}

/// `/v1/query` and `/v1/execute`; `sql` is base64-encoded.
#[derive(Debug, Clone, Deserialize)]
pub struct SqlRequest {
	pub apikey: String,
	pub dbowner: String,
	pub dbname: String,
	#[serde(default)]
	pub commit: Option<String>,
	pub sql: String,
}

/// `/v1/delete`. The target is always the caller's own namespace.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRequest {
	pub apikey: String,
	pub dbname: String,
}

/// `/v1/databases`.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabasesRequest {
	pub apikey: String,
	#[serde(default)]
	pub live: Option<String>,
}

/// `/v1/diff`.
#[derive(Debug, Clone, Deserialize)]
pub struct DiffRequest {
	pub apikey: String,
	pub dbowner_a: String,
	pub dbname_a: String,
	pub commit_a: String,
	pub commit_b: String,
	#[serde(default)]
	pub dbowner_b: Option<String>,
	#[serde(default)]
	pub dbname_b: Option<String>,
	/// One of `none`, `preserve_pk`, `new_pk`; defaults to `none`.
	#[serde(default)]
	pub merge: Option<String>,
	/// "0" or "1"; defaults to "0".
	#[serde(default)]
	pub include_data: Option<String>,
}

/// Text fields of a `/v1/upload` multipart body (the `file` part streams
/// separately).
#[derive(Debug, Clone, Default)]
pub struct UploadFields {
	pub apikey: String,
	pub dbowner: Option<String>,
	pub dbname: String,
	pub branch: Option<String>,
	pub commitmsg: Option<String>,
	pub sourceurl: Option<String>,
	pub lastmodified: Option<String>,
	pub licence: Option<String>,
	pub public: Option<String>,
	pub live: Option<String>,
	pub commit: Option<String>,
	pub force: Option<String>,
}
