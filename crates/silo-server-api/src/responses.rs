// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! JSON response bodies of the v1 endpoints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use silo_server_sqlite::{ColumnInfo, DataValue, Diff, IndexInfo};
use silo_server_vcs::{BranchEntry, CommitEntry, ReleaseEntry, TagEntry};

/// `/v1/branches`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchesResponse {
	pub default_branch: String,
	pub branches: BTreeMap<String, BranchEntry>,
}

/// `/v1/commits`: commit id → commit entry.
pub type CommitsResponse = BTreeMap<String, CommitEntry>;

/// `/v1/tags`: tag name → tag entry.
pub type TagsResponse = BTreeMap<String, TagEntry>;

/// `/v1/releases`: release name → release entry.
pub type ReleasesResponse = BTreeMap<String, ReleaseEntry>;

/// `/v1/metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataResponse {
	pub branches: BTreeMap<String, BranchEntry>,
	pub commits: CommitsResponse,
	pub default_branch: String,
	pub releases: ReleasesResponse,
	pub tags: TagsResponse,
	pub web_page: String,
}

/// `/v1/webpage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebPageResponse {
	pub web_page: String,
}

/// `/v1/tables` and `/v1/views`: sorted names.
pub type NamesResponse = Vec<String>;

/// `/v1/indexes`.
pub type IndexesResponse = Vec<IndexInfo>;

/// `/v1/columns`.
pub type ColumnsResponse = Vec<ColumnInfo>;

/// `/v1/query`: array of row arrays.
pub type QueryResponse = Vec<Vec<DataValue>>;

/// `/v1/execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
	pub rows_changed: i64,
	pub status: String,
}

/// `/v1/upload`; status 201.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
	/// Absent for live databases, which have no commit graph.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub commit_id: Option<String>,
	pub url: String,
}

/// `/v1/delete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
	pub status: String,
}

impl StatusResponse {
	pub fn ok() -> Self {
		Self {
			status: "OK".to_string(),
		}
	}
}

/// `/v1/databases`.
pub type DatabasesResponse = Vec<String>;

/// `/v1/diff`.
pub type DiffResponse = Diff;
