// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Defensive execution of user SQL.
//!
//! The query path accepts exactly one read-only statement. Mutating verbs
//! are rejected up front, the prepared statement must report itself
//! read-only, and a progress handler aborts execution past the configured
//! time budget.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::{Result, SqliteError};
use crate::reader::SqliteFile;

/// Value type tags on the wire.
const TYPE_BINARY: i32 = 0;
const TYPE_NULL: i32 = 2;
const TYPE_TEXT: i32 = 3;
const TYPE_INTEGER: i32 = 4;
const TYPE_FLOAT: i32 = 5;

/// One cell of a result row: column name, type tag, stringified value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
	#[serde(rename = "Name")]
	pub name: String,
	#[serde(rename = "Type")]
	pub value_type: i32,
	#[serde(rename = "Value")]
	pub value: String,
}

/// Execution limits for a single statement.
#[derive(Debug, Clone, Copy)]
pub struct QueryBudget {
	pub max_duration: Duration,
}

impl Default for QueryBudget {
	fn default() -> Self {
		Self {
			max_duration: Duration::from_secs(10),
		}
	}
}

/// Result rows plus execution stats.
#[derive(Debug, Clone)]
pub struct QueryOutput {
	pub rows: Vec<Vec<DataValue>>,
	/// SQLite memory high-water mark observed after execution, in bytes.
	pub memory_hwm: i64,
}

// Verbs that can never appear on the read-only path, checked before the
// statement is even prepared.
const FORBIDDEN_VERBS: &[&str] = &[
	"INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "REPLACE", "ATTACH", "DETACH",
	"PRAGMA", "VACUUM", "REINDEX",
];

fn first_word(sql: &str) -> String {
	sql
		.trim_start()
		.split(|c: char| c.is_whitespace() || c == '(')
		.next()
		.unwrap_or("")
		.to_ascii_uppercase()
}

// Conservative: a semicolon followed by anything is treated as a second
// statement, even inside a string literal.
fn has_trailing_statement(sql: &str) -> bool {
	match sql.find(';') {
		Some(pos) => !sql[pos + 1..].trim().is_empty(),
		None => false,
	}
}

/// Run a single read-only statement against a database body.
#[tracing::instrument(skip(path, sql))]
pub fn run_read_query(path: &Path, sql: &str, budget: QueryBudget) -> Result<QueryOutput> {
	let verb = first_word(sql);
	if FORBIDDEN_VERBS.contains(&verb.as_str()) {
		return Err(SqliteError::NotReadOnly(format!(
			"{verb} is not available on the query endpoint"
		)));
	}
	if has_trailing_statement(sql) {
		return Err(SqliteError::NotReadOnly(
			"only a single statement is accepted".to_string(),
		));
	}

	let file = SqliteFile::open_read_only(path)?;
	let conn = file.connection();

	let deadline = Instant::now() + budget.max_duration;
	conn.progress_handler(1000, Some(move || Instant::now() >= deadline));

	let result = execute(conn, sql);
	conn.progress_handler(1000, None::<fn() -> bool>);
	result
}

fn execute(conn: &rusqlite::Connection, sql: &str) -> Result<QueryOutput> {
	// prepare() fails with MultipleStatement when anything trails the first
	// statement, which covers piggybacked writes.
	let mut stmt = conn.prepare(sql)?;
	if !stmt.readonly() {
		return Err(SqliteError::NotReadOnly(
			"only read-only statements are accepted".to_string(),
		));
	}

	let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

	let mut rows = Vec::new();
	let mut raw = stmt.query([]).map_err(map_interrupt)?;
	loop {
		match raw.next() {
			Ok(Some(row)) => {
				let mut out_row = Vec::with_capacity(column_names.len());
				for (idx, name) in column_names.iter().enumerate() {
					out_row.push(cell(name, row.get_ref(idx)?));
				}
				rows.push(out_row);
			}
			Ok(None) => break,
			Err(e) => return Err(map_interrupt(e)),
		}
	}

	// Safety: sqlite3_memory_highwater only reads (and optionally resets)
	// a process-wide counter.
	let memory_hwm = unsafe { rusqlite::ffi::sqlite3_memory_highwater(0) };

	Ok(QueryOutput { rows, memory_hwm })
}

fn map_interrupt(err: rusqlite::Error) -> SqliteError {
	if SqliteError::is_interrupt(&err) {
		SqliteError::BudgetExceeded
	} else {
		SqliteError::Sqlite(err)
	}
}

fn cell(name: &str, value: ValueRef<'_>) -> DataValue {
	let (value_type, value) = match value {
		ValueRef::Null => (TYPE_NULL, String::new()),
		ValueRef::Integer(i) => (TYPE_INTEGER, i.to_string()),
		ValueRef::Real(f) => (TYPE_FLOAT, f.to_string()),
		ValueRef::Text(t) => (TYPE_TEXT, String::from_utf8_lossy(t).into_owned()),
		ValueRef::Blob(b) => (TYPE_BINARY, BASE64.encode(b)),
	};
	DataValue {
		name: name.to_string(),
		value_type,
		value,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::reader::fixtures::weather_db;

	#[test]
	fn test_select_one_matches_wire_shape() {
		let dir = tempfile::tempdir().unwrap();
		let path = weather_db(dir.path());

		let output = run_read_query(&path, "SELECT 1", QueryBudget::default()).unwrap();
		assert_eq!(output.rows.len(), 1);
		assert_eq!(
			output.rows[0],
			vec![DataValue {
				name: "1".to_string(),
				value_type: TYPE_INTEGER,
				value: "1".to_string(),
			}]
		);

		let json = serde_json::to_string(&output.rows).unwrap();
		assert_eq!(json, r#"[[{"Name":"1","Type":4,"Value":"1"}]]"#);
	}

	#[test]
	fn test_rows_carry_column_names_and_types() {
		let dir = tempfile::tempdir().unwrap();
		let path = weather_db(dir.path());

		let output = run_read_query(
			&path,
			"SELECT name, temp FROM cities JOIN measurements ON city_id = cities.id ORDER BY cities.id",
			QueryBudget::default(),
		)
		.unwrap();
		assert_eq!(output.rows.len(), 2);
		assert_eq!(output.rows[0][0].name, "name");
		assert_eq!(output.rows[0][0].value_type, TYPE_TEXT);
		assert_eq!(output.rows[0][1].value_type, TYPE_FLOAT);
	}

	#[test]
	fn test_null_cells() {
		let dir = tempfile::tempdir().unwrap();
		let path = weather_db(dir.path());

		let output = run_read_query(&path, "SELECT NULL", QueryBudget::default()).unwrap();
		assert_eq!(output.rows[0][0].value_type, TYPE_NULL);
		assert_eq!(output.rows[0][0].value, "");
	}

	#[test]
	fn test_write_verbs_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = weather_db(dir.path());

		for sql in [
			"INSERT INTO cities (id, name) VALUES (9, 'Cairns')",
			"update cities set name = 'x'",
			"DELETE FROM cities",
			"CREATE TABLE t (a)",
			"DROP TABLE cities",
		] {
			let err = run_read_query(&path, sql, QueryBudget::default()).unwrap_err();
			assert!(matches!(err, SqliteError::NotReadOnly(_)), "sql: {sql}");
		}
	}

	#[test]
	fn test_multiple_statements_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = weather_db(dir.path());

		let err = run_read_query(
			&path,
			"SELECT 1; SELECT 2",
			QueryBudget::default(),
		)
		.unwrap_err();
		assert!(matches!(err, SqliteError::NotReadOnly(_)));
	}

	#[test]
	fn test_budget_aborts_runaway_statement() {
		let dir = tempfile::tempdir().unwrap();
		let path = weather_db(dir.path());

		// Cartesian explosion over a recursive CTE; never finishes inside
		// one millisecond.
		let sql = r#"
			WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n LIMIT 10000000)
			SELECT COUNT(*) FROM n a, n b
		"#;
		let budget = QueryBudget {
			max_duration: Duration::from_millis(1),
		};
		let err = run_read_query(&path, sql, budget).unwrap_err();
		assert!(matches!(err, SqliteError::BudgetExceeded));
	}

	#[test]
	fn test_memory_stats_reported() {
		let dir = tempfile::tempdir().unwrap();
		let path = weather_db(dir.path());

		let output = run_read_query(&path, "SELECT * FROM cities", QueryBudget::default()).unwrap();
		assert!(output.memory_hwm >= 0);
	}
}
