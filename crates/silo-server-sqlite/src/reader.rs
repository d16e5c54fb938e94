// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Read-only schema access.

use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SqliteError};

/// One column of a table or view, as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
	pub cid: i64,
	pub name: String,
	pub datatype: String,
	pub notnull: bool,
	pub dflt_value: Option<String>,
	pub pk: i64,
}

/// One index with the columns it covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
	pub name: String,
	pub table: String,
	pub columns: Vec<String>,
}

/// A user database body, open read-only.
pub struct SqliteFile {
	conn: Connection,
}

impl SqliteFile {
	/// Open a database body without write access.
	pub fn open_read_only(path: &Path) -> Result<Self> {
		let conn = Connection::open_with_flags(
			path,
			OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
		)?;
		Ok(Self { conn })
	}

	/// Verify a file is a readable SQLite database by opening it and probing
	/// the schema. Used on uploads before anything is stored.
	pub fn probe(path: &Path) -> Result<()> {
		let file = Self::open_read_only(path).map_err(|e| match e {
			SqliteError::Sqlite(inner) => SqliteError::NotSqlite(inner.to_string()),
			other => other,
		})?;
		file
			.conn
			.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
				row.get::<_, i64>(0)
			})
			.map_err(|e| SqliteError::NotSqlite(e.to_string()))?;
		Ok(())
	}

	pub(crate) fn connection(&self) -> &Connection {
		&self.conn
	}

	/// Sorted table names, internal SQLite tables excluded.
	pub fn tables(&self) -> Result<Vec<String>> {
		self.schema_names("table")
	}

	/// Sorted view names.
	pub fn views(&self) -> Result<Vec<String>> {
		self.schema_names("view")
	}

	fn schema_names(&self, object_type: &str) -> Result<Vec<String>> {
		let mut stmt = self.conn.prepare(
			"SELECT name FROM sqlite_master WHERE type = ?1 AND name NOT LIKE 'sqlite_%' ORDER BY name",
		)?;
		let names = stmt
			.query_map([object_type], |row| row.get::<_, String>(0))?
			.collect::<std::result::Result<Vec<_>, _>>()?;
		Ok(names)
	}

	/// Whether a table or view with this name exists.
	pub fn object_exists(&self, name: &str) -> Result<bool> {
		let count: i64 = self.conn.query_row(
			"SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
			[name],
			|row| row.get(0),
		)?;
		Ok(count > 0)
	}

	/// Column details of a table or view.
	///
	/// Fails with [`SqliteError::UnknownObject`] when no such object exists
	/// in the schema.
	pub fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
		if !self.object_exists(table)? {
			return Err(SqliteError::UnknownObject(table.to_string()));
		}

		let mut stmt = self
			.conn
			.prepare("SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1)")?;
		let columns = stmt
			.query_map([table], |row| {
				Ok(ColumnInfo {
					cid: row.get(0)?,
					name: row.get(1)?,
					datatype: row.get(2)?,
					notnull: row.get::<_, i64>(3)? != 0,
					dflt_value: row.get(4)?,
					pk: row.get(5)?,
				})
			})?
			.collect::<std::result::Result<Vec<_>, _>>()?;
		Ok(columns)
	}

	/// Primary-key column names of a table, in key order.
	pub fn primary_key(&self, table: &str) -> Result<Vec<String>> {
		let mut pk: Vec<(i64, String)> = self
			.columns(table)?
			.into_iter()
			.filter(|c| c.pk > 0)
			.map(|c| (c.pk, c.name))
			.collect();
		pk.sort_by_key(|(order, _)| *order);
		Ok(pk.into_iter().map(|(_, name)| name).collect())
	}

	/// All indexes with their covered columns, sorted by index name.
	pub fn indexes(&self) -> Result<Vec<IndexInfo>> {
		let mut out = Vec::new();
		for table in self.tables()? {
			let mut stmt = self
				.conn
				.prepare("SELECT name FROM pragma_index_list(?1) ORDER BY name")?;
			let index_names = stmt
				.query_map([table.as_str()], |row| row.get::<_, String>(0))?
				.collect::<std::result::Result<Vec<_>, _>>()?;

			for index in index_names {
				let mut col_stmt = self
					.conn
					.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
				let columns = col_stmt
					.query_map([index.as_str()], |row| {
						row.get::<_, Option<String>>(0)
					})?
					.collect::<std::result::Result<Vec<_>, _>>()?
					.into_iter()
					.flatten()
					.collect();

				out.push(IndexInfo {
					name: index,
					table: table.clone(),
					columns,
				});
			}
		}
		out.sort_by(|a, b| a.name.cmp(&b.name));
		Ok(out)
	}
}


#[cfg(test)]
mod tests {
	use super::fixtures::weather_db;
	use super::*;

	#[test]
	fn test_tables_sorted_without_internal() {
		let dir = tempfile::tempdir().unwrap();
		let file = SqliteFile::open_read_only(&weather_db(dir.path())).unwrap();
		assert_eq!(file.tables().unwrap(), vec!["cities", "measurements"]);
		assert_eq!(file.views().unwrap(), vec!["warm"]);
	}

	#[test]
	fn test_open_read_only_rejects_writes() {
		let dir = tempfile::tempdir().unwrap();
		let file = SqliteFile::open_read_only(&weather_db(dir.path())).unwrap();
		let result = file
			.conn
			.execute("INSERT INTO cities (id, name) VALUES (3, 'Darwin')", []);
		assert!(result.is_err());
	}

	#[test]
	fn test_columns_with_existence_check() {
		let dir = tempfile::tempdir().unwrap();
		let file = SqliteFile::open_read_only(&weather_db(dir.path())).unwrap();

		let columns = file.columns("measurements").unwrap();
		let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
		assert_eq!(names, vec!["id", "city_id", "temp", "taken_at"]);
		assert_eq!(columns[0].pk, 1);
		assert!(columns[1].notnull);
		assert_eq!(columns[3].dflt_value.as_deref(), Some("'unknown'"));

		// Views answer too.
		assert!(!file.columns("warm").unwrap().is_empty());

		let err = file.columns("nope").unwrap_err();
		assert!(matches!(err, SqliteError::UnknownObject(_)));
	}

	#[test]
	fn test_indexes_with_columns() {
		let dir = tempfile::tempdir().unwrap();
		let file = SqliteFile::open_read_only(&weather_db(dir.path())).unwrap();

		let indexes = file.indexes().unwrap();
		let named: Vec<&IndexInfo> = indexes
			.iter()
			.filter(|i| i.name == "idx_measurements_city")
			.collect();
		assert_eq!(named.len(), 1);
		assert_eq!(named[0].table, "measurements");
		assert_eq!(named[0].columns, vec!["city_id"]);
	}

	#[test]
	fn test_primary_key() {
		let dir = tempfile::tempdir().unwrap();
		let file = SqliteFile::open_read_only(&weather_db(dir.path())).unwrap();
		assert_eq!(file.primary_key("cities").unwrap(), vec!["id"]);
	}

	#[test]
	fn test_probe_rejects_garbage() {
		let dir = tempfile::tempdir().unwrap();
		let garbage = dir.path().join("garbage.bin");
		std::fs::write(&garbage, b"definitely not a database").unwrap();
		assert!(matches!(
			SqliteFile::probe(&garbage).unwrap_err(),
			SqliteError::NotSqlite(_)
		));

		let real = weather_db(dir.path());
		SqliteFile::probe(&real).unwrap();
	}
}
