// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Structured diff of two database bodies.
//!
//! Both bodies are opened read-only. The schema diff covers tables, views
//! and indexes (added, removed, altered by SQL text); tables present on both
//! sides additionally get a row-level diff keyed by primary key, falling
//! back to `rowid` for tables without one.

use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Result, SqliteError};
use crate::query::DataValue;
use crate::reader::SqliteFile;

/// How primary keys are treated in emitted row images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
	/// Plain report, full row images.
	None,
	/// Row images keep their primary keys for replay on the target.
	PreservePk,
	/// Row images drop primary keys so the target assigns fresh ones.
	NewPk,
}

impl std::str::FromStr for MergeStrategy {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"none" => Ok(MergeStrategy::None),
			"preserve_pk" => Ok(MergeStrategy::PreservePk),
			"new_pk" => Ok(MergeStrategy::NewPk),
			_ => Err(format!("unknown merge strategy: {s}")),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
	Added,
	Removed,
	Altered,
	Modified,
}

/// One schema object that differs between the two sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaObjectDiff {
	pub object_type: String,
	pub name: String,
	pub change: ChangeKind,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sql_a: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sql_b: Option<String>,
}

/// One row that differs, identified by its key tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowChange {
	pub change: ChangeKind,
	/// Stringified primary-key tuple.
	pub key: Vec<String>,
	/// Full row image from the side that has the row (side B for added and
	/// modified rows, side A for removed ones). Absent when the caller did
	/// not ask for data.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub row: Option<Vec<DataValue>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRowDiff {
	pub table: String,
	pub pk_columns: Vec<String>,
	pub changes: Vec<RowChange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diff {
	pub schema: Vec<SchemaObjectDiff>,
	pub tables: Vec<TableRowDiff>,
}

/// Compare two database bodies.
#[tracing::instrument(skip(path_a, path_b))]
pub fn diff_databases(
	path_a: &Path,
	path_b: &Path,
	merge: MergeStrategy,
	include_data: bool,
) -> Result<Diff> {
	let a = SqliteFile::open_read_only(path_a)?;
	let b = SqliteFile::open_read_only(path_b)?;

	let mut diff = Diff::default();
	for object_type in ["table", "view", "index"] {
		diff
			.schema
			.extend(schema_diff(&a, &b, object_type)?);
	}

	let tables_a = a.tables()?;
	let tables_b = b.tables()?;
	for table in &tables_a {
		if !tables_b.contains(table) {
			continue;
		}
		let row_diff = table_diff(&a, &b, table, merge, include_data)?;
		if !row_diff.changes.is_empty() {
			diff.tables.push(row_diff);
		}
	}

	Ok(diff)
}

fn schema_sql(file: &SqliteFile, object_type: &str) -> Result<BTreeMap<String, String>> {
	let conn = file.connection();
	let mut stmt = conn.prepare(
		"SELECT name, COALESCE(sql, '') FROM sqlite_master WHERE type = ?1 AND name NOT LIKE 'sqlite_%'",
	)?;
	let map = stmt
		.query_map([object_type], |row| {
			Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
		})?
		.collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
	Ok(map)
}

fn schema_diff(
	a: &SqliteFile,
	b: &SqliteFile,
	object_type: &str,
) -> Result<Vec<SchemaObjectDiff>> {
	let side_a = schema_sql(a, object_type)?;
	let side_b = schema_sql(b, object_type)?;

	let mut out = Vec::new();
	for (name, sql_a) in &side_a {
		match side_b.get(name) {
			None => out.push(SchemaObjectDiff {
				object_type: object_type.to_string(),
				name: name.clone(),
				change: ChangeKind::Removed,
				sql_a: Some(sql_a.clone()),
				sql_b: None,
			}),
			Some(sql_b) if sql_b != sql_a => out.push(SchemaObjectDiff {
				object_type: object_type.to_string(),
				name: name.clone(),
				change: ChangeKind::Altered,
				sql_a: Some(sql_a.clone()),
				sql_b: Some(sql_b.clone()),
			}),
			Some(_) => {}
		}
	}
	for (name, sql_b) in &side_b {
		if !side_a.contains_key(name) {
			out.push(SchemaObjectDiff {
				object_type: object_type.to_string(),
				name: name.clone(),
				change: ChangeKind::Added,
				sql_a: None,
				sql_b: Some(sql_b.clone()),
			});
		}
	}
	Ok(out)
}

// Rows keyed by their stringified pk tuple.
type RowMap = BTreeMap<Vec<String>, Vec<DataValue>>;

fn table_diff(
	a: &SqliteFile,
	b: &SqliteFile,
	table: &str,
	merge: MergeStrategy,
	include_data: bool,
) -> Result<TableRowDiff> {
	let mut pk = a.primary_key(table)?;
	if pk.is_empty() {
		pk = vec!["rowid".to_string()];
	}

	let rows_a = read_rows(a, table, &pk)?;
	let rows_b = read_rows(b, table, &pk)?;

	let mut changes = Vec::new();
	for (key, row_a) in &rows_a {
		match rows_b.get(key) {
			None => changes.push(row_change(ChangeKind::Removed, key, row_a, &pk, merge, include_data)),
			Some(row_b) if row_b != row_a => {
				changes.push(row_change(ChangeKind::Modified, key, row_b, &pk, merge, include_data));
			}
			Some(_) => {}
		}
	}
	for (key, row_b) in &rows_b {
		if !rows_a.contains_key(key) {
			changes.push(row_change(ChangeKind::Added, key, row_b, &pk, merge, include_data));
		}
	}

	Ok(TableRowDiff {
		table: table.to_string(),
		pk_columns: pk,
		changes,
	})
}

fn row_change(
	change: ChangeKind,
	key: &[String],
	row: &[DataValue],
	pk: &[String],
	merge: MergeStrategy,
	include_data: bool,
) -> RowChange {
	let row = include_data.then(|| {
		row
			.iter()
			.filter(|cell| merge != MergeStrategy::NewPk || !pk.contains(&cell.name))
			.cloned()
			.collect()
	});

	RowChange {
		change,
		key: key.to_vec(),
		row,
	}
}

fn read_rows(file: &SqliteFile, table: &str, pk: &[String]) -> Result<RowMap> {
	let conn = file.connection();
	let order = pk
		.iter()
		.map(|c| quote_identifier(c))
		.collect::<Vec<_>>()
		.join(", ");
	let select_rowid = if pk == ["rowid"] { "rowid, " } else { "" };
	let sql = format!(
		"SELECT {select_rowid}* FROM {} ORDER BY {order}",
		quote_identifier(table)
	);

	let mut stmt = conn.prepare(&sql)?;
	let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

	let pk_indices: Vec<usize> = pk
		.iter()
		.map(|name| {
			column_names
				.iter()
				.position(|c| c == name)
				.ok_or_else(|| SqliteError::UnknownObject(format!("{table}.{name}")))
		})
		.collect::<Result<_>>()?;

	let mut map = RowMap::new();
	let mut raw = stmt.query([])?;
	while let Some(row) = raw.next()? {
		let mut cells = Vec::with_capacity(column_names.len());
		for (idx, name) in column_names.iter().enumerate() {
			cells.push(data_value(name, row.get_ref(idx)?));
		}
		let key = pk_indices
			.iter()
			.map(|&i| cells[i].value.clone())
			.collect::<Vec<_>>();
		map.insert(key, cells);
	}
	Ok(map)
}

fn quote_identifier(name: &str) -> String {
	format!("\"{}\"", name.replace('"', "\"\""))
}

fn data_value(name: &str, value: ValueRef<'_>) -> DataValue {
	use base64::engine::general_purpose::STANDARD as BASE64;
	use base64::Engine;

	let (value_type, value) = match value {
		ValueRef::Null => (2, String::new()),
		ValueRef::Integer(i) => (4, i.to_string()),
		ValueRef::Real(f) => (5, f.to_string()),
		ValueRef::Text(t) => (3, String::from_utf8_lossy(t).into_owned()),
		ValueRef::Blob(b) => (0, BASE64.encode(b)),
	};
	DataValue {
		name: name.to_string(),
		value_type,
		value,
	}
}
