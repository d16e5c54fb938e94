// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database repository.
//!
//! A database row is identified by `(owner, name)` with `name` unique per
//! owner among non-deleted rows. Standard databases own their commit graph
//! in JSON columns; live databases have no graph and instead record the
//! worker node that owns their single mutable body.
//!
//! Deleted rows keep their history for audit but get `public = 0` and a
//! randomised name so the uniqueness index never blocks reuse of the
//! original name.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use silo_server_vcs::{
	ancestry_count, contributor_count, BranchEntry, CommitEntry, ForkSource, ReleaseEntry, TagEntry,
};

use crate::error::{DbError, Result};

/// A database row with its commit graph maps decoded.
#[derive(Debug, Clone)]
pub struct DatabaseRow {
	pub id: String,
	pub owner_id: String,
	/// Username of the owner, joined for convenience.
	pub owner_name: String,
	pub name: String,
	pub public: bool,
	pub live: bool,
	pub is_deleted: bool,
	pub forked_from: Option<String>,
	pub root_database: String,
	pub watchers: i64,
	pub stars: i64,
	pub forks: i64,
	pub discussions: i64,
	pub merge_requests: i64,
	pub download_count: i64,
	pub contributors: i64,
	pub default_branch: String,
	pub default_table: Option<String>,
	pub licence_sha: Option<String>,
	pub source_url: Option<String>,
	pub live_node: Option<String>,
	pub live_blob: Option<String>,
	pub branch_heads: BTreeMap<String, BranchEntry>,
	pub commit_list: BTreeMap<String, CommitEntry>,
	pub tag_list: BTreeMap<String, TagEntry>,
	pub release_list: BTreeMap<String, ReleaseEntry>,
	pub last_modified: DateTime<Utc>,
	pub created_at: DateTime<Utc>,
}

impl DatabaseRow {
	/// Head commit id of the given branch, if the branch exists.
	pub fn branch_head(&self, branch: &str) -> Option<&str> {
		self.branch_heads.get(branch).map(|b| b.commit.as_str())
	}
}

/// Fields for inserting a fresh database row.
#[derive(Debug, Clone, Default)]
pub struct NewDatabase {
	pub owner_id: String,
	pub name: String,
	pub public: bool,
	pub live: bool,
	pub live_node: Option<String>,
	pub live_blob: Option<String>,
	pub source_url: Option<String>,
	pub licence_sha: Option<String>,
	pub default_branch: String,
}

#[async_trait]
pub trait DatabaseStore: Send + Sync {
	async fn insert(&self, new: NewDatabase) -> Result<DatabaseRow>;
	async fn get_by_id(&self, id: &str) -> Result<Option<DatabaseRow>>;
	async fn get_by_owner_name(&self, owner: &str, name: &str) -> Result<Option<DatabaseRow>>;
	async fn list_names_for_user(&self, user_id: &str, live: Option<bool>) -> Result<Vec<String>>;
	async fn append_commit(
		&self,
		db_id: &str,
		branch: &str,
		commit: &CommitEntry,
		force: bool,
	) -> Result<DatabaseRow>;
	async fn mark_deleted(&self, db_id: &str) -> Result<String>;
	async fn fork(&self, src_id: &str, dst_owner_id: &str) -> Result<DatabaseRow>;
	async fn increment_download_count(&self, db_id: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct DatabaseRepository {
	pool: SqlitePool,
}

const SELECT_COLUMNS: &str = r#"
	SELECT d.id, d.owner_id, u.username AS owner_name, d.name, d.public, d.live,
	       d.is_deleted, d.forked_from, d.root_database, d.watchers, d.stars,
	       d.forks, d.discussions, d.merge_requests, d.download_count,
	       d.contributors, d.default_branch, d.default_table, d.licence_sha,
	       d.source_url, d.live_node, d.live_blob, d.branch_heads, d.commit_list,
	       d.tag_list, d.release_list, d.last_modified, d.created_at
	FROM databases d
	JOIN users u ON u.id = d.owner_id
"#;

impl DatabaseRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, new), fields(owner_id = %new.owner_id, name = %new.name))]
	pub async fn insert(&self, new: NewDatabase) -> Result<DatabaseRow> {
		let id = Uuid::new_v4().to_string();
		let now = rfc3339_now();
		let default_branch = if new.default_branch.is_empty() {
			"main"
		} else {
			new.default_branch.as_str()
		};

		sqlx::query(
			r#"
			INSERT INTO databases (
				id, owner_id, name, public, live, root_database, default_branch,
				default_table, licence_sha, source_url, live_node, live_blob,
				last_modified, created_at
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&id)
		.bind(&new.owner_id)
		.bind(&new.name)
		.bind(new.public)
		.bind(new.live)
		.bind(&id)
		.bind(default_branch)
		.bind(Option::<String>::None)
		.bind(&new.licence_sha)
		.bind(&new.source_url)
		.bind(&new.live_node)
		.bind(&new.live_blob)
		.bind(&now)
		.bind(&now)
		.execute(&self.pool)
		.await?;

		tracing::debug!(db_id = %id, "database created");
		self
			.get_by_id(&id)
			.await?
			.ok_or_else(|| DbError::Internal("database vanished after insert".to_string()))
	}

	/// Fetch a row by id, including deleted rows.
	#[tracing::instrument(skip(self))]
	pub async fn get_by_id(&self, id: &str) -> Result<Option<DatabaseRow>> {
		let sql = format!("{SELECT_COLUMNS} WHERE d.id = ?");
		let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
		row.map(|r| parse_database_row(&r)).transpose()
	}

	/// Resolve `(owner, name)` among non-deleted rows.
	///
	/// Deleted databases are indistinguishable from never-existed ones.
	#[tracing::instrument(skip(self))]
	pub async fn get_by_owner_name(&self, owner: &str, name: &str) -> Result<Option<DatabaseRow>> {
		let sql =
			format!("{SELECT_COLUMNS} WHERE u.username = ? COLLATE NOCASE AND d.name = ? AND d.is_deleted = 0");
		let row = sqlx::query(&sql)
			.bind(owner)
			.bind(name)
			.fetch_optional(&self.pool)
			.await?;
		row.map(|r| parse_database_row(&r)).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_names_for_user(
		&self,
		user_id: &str,
		live: Option<bool>,
	) -> Result<Vec<String>> {
		let rows: Vec<(String,)> = match live {
			Some(live) => {
				sqlx::query_as(
					"SELECT name FROM databases WHERE owner_id = ? AND is_deleted = 0 AND live = ? ORDER BY name",
				)
				.bind(user_id)
				.bind(live)
				.fetch_all(&self.pool)
				.await?
			}
			None => {
				sqlx::query_as(
					"SELECT name FROM databases WHERE owner_id = ? AND is_deleted = 0 ORDER BY name",
				)
				.bind(user_id)
				.fetch_all(&self.pool)
				.await?
			}
		};
		Ok(rows.into_iter().map(|(name,)| name).collect())
	}

	/// Append a commit and advance the branch head, inside one transaction.
	///
	/// The commit's parent must equal the branch's current head unless
	/// `force` is set; a forced append rewrites the head to the new commit
	/// and recomputes the commit count from its ancestry. Pushing a commit
	/// id that is already in the list is a collision and is rejected.
	#[tracing::instrument(skip(self, commit), fields(db_id = %db_id, branch = %branch, commit_id = %commit.id))]
	pub async fn append_commit(
		&self,
		db_id: &str,
		branch: &str,
		commit: &CommitEntry,
		force: bool,
	) -> Result<DatabaseRow> {
		let mut tx = self.pool.begin().await?;

		let row = sqlx::query(
			"SELECT branch_heads, commit_list FROM databases WHERE id = ? AND is_deleted = 0",
		)
		.bind(db_id)
		.fetch_optional(&mut *tx)
		.await?
		.ok_or_else(|| DbError::NotFound(db_id.to_string()))?;

		let branch_heads_json: String = row.get("branch_heads");
		let commit_list_json: String = row.get("commit_list");
		let mut branches: BTreeMap<String, BranchEntry> = serde_json::from_str(&branch_heads_json)?;
		let mut commits: BTreeMap<String, CommitEntry> = serde_json::from_str(&commit_list_json)?;

		if commits.contains_key(&commit.id) {
			return Err(DbError::Conflict(format!(
				"commit {} already exists in the commit list",
				commit.id
			)));
		}

		let head = branches
			.get(branch)
			.map(|b| b.commit.clone())
			.unwrap_or_default();
		if commit.parent != head && !force {
			return Err(DbError::Conflict(format!(
				"Outdated commit '{}' supplied; branch '{}' HEAD is '{}'",
				commit.parent, branch, head
			)));
		}

		commits.insert(commit.id.clone(), commit.clone());
		let commit_count = ancestry_count(&commits, &commit.id);
		let description = branches
			.get(branch)
			.map(|b| b.description.clone())
			.unwrap_or_default();
		branches.insert(
			branch.to_string(),
			BranchEntry {
				commit: commit.id.clone(),
				commit_count,
				description,
			},
		);

		let contributors = contributor_count(&commits);
		let last_modified = commit.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);

		sqlx::query(
			r#"
			UPDATE databases
			SET branch_heads = ?, commit_list = ?, contributors = ?, last_modified = ?
			WHERE id = ?
			"#,
		)
		.bind(serde_json::to_string(&branches)?)
		.bind(serde_json::to_string(&commits)?)
		.bind(contributors)
		.bind(&last_modified)
		.bind(db_id)
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;

		tracing::debug!(db_id = %db_id, branch = %branch, commit_id = %commit.id, "commit appended");
		self
			.get_by_id(db_id)
			.await?
			.ok_or_else(|| DbError::Internal("database vanished after commit".to_string()))
	}

	/// Soft-delete a row, freeing the name for reuse.
	///
	/// Returns the randomised replacement name.
	#[tracing::instrument(skip(self))]
	pub async fn mark_deleted(&self, db_id: &str) -> Result<String> {
		let row = self
			.get_by_id(db_id)
			.await?
			.ok_or_else(|| DbError::NotFound(db_id.to_string()))?;

		let new_name = deleted_name();
		let result = sqlx::query(
			"UPDATE databases SET is_deleted = 1, public = 0, name = ? WHERE id = ? AND is_deleted = 0",
		)
		.bind(&new_name)
		.bind(db_id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(db_id.to_string()));
		}

		self.recompute_root_forks(&row.root_database).await?;
		tracing::info!(db_id = %db_id, "database deleted");
		Ok(new_name)
	}

	/// Copy a standard database into another user's namespace.
	///
	/// The fork shares no commit storage: commit list, branch heads and tags
	/// are copied at fork time. Releases and social counters start empty.
	#[tracing::instrument(skip(self))]
	pub async fn fork(&self, src_id: &str, dst_owner_id: &str) -> Result<DatabaseRow> {
		let src = self
			.get_by_id(src_id)
			.await?
			.ok_or_else(|| DbError::NotFound(src_id.to_string()))?;
		if src.is_deleted {
			return Err(DbError::NotFound(src_id.to_string()));
		}
		if src.live {
			return Err(DbError::Conflict("live databases cannot be forked".to_string()));
		}

		let id = Uuid::new_v4().to_string();
		let now = rfc3339_now();

		sqlx::query(
			r#"
			INSERT INTO databases (
				id, owner_id, name, public, live, forked_from, root_database,
				contributors, default_branch, default_table, licence_sha, source_url,
				branch_heads, commit_list, tag_list, last_modified, created_at
			) VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&id)
		.bind(dst_owner_id)
		.bind(&src.name)
		.bind(src.public)
		.bind(&src.id)
		.bind(&src.root_database)
		.bind(src.contributors)
		.bind(&src.default_branch)
		.bind(&src.default_table)
		.bind(&src.licence_sha)
		.bind(&src.source_url)
		.bind(serde_json::to_string(&src.branch_heads)?)
		.bind(serde_json::to_string(&src.commit_list)?)
		.bind(serde_json::to_string(&src.tag_list)?)
		.bind(&now)
		.bind(&now)
		.execute(&self.pool)
		.await?;

		self.recompute_root_forks(&src.root_database).await?;
		tracing::info!(src_id = %src_id, fork_id = %id, "database forked");

		self
			.get_by_id(&id)
			.await?
			.ok_or_else(|| DbError::Internal("fork vanished after insert".to_string()))
	}

	/// Recompute a root's fork counter as the number of non-deleted
	/// descendants sharing its `root_database`.
	#[tracing::instrument(skip(self))]
	pub async fn recompute_root_forks(&self, root_id: &str) -> Result<i64> {
		sqlx::query(
			r#"
			UPDATE databases
			SET forks = (
				SELECT COUNT(*) FROM databases d2
				WHERE d2.root_database = ? AND d2.is_deleted = 0 AND d2.id != ?
			)
			WHERE id = ?
			"#,
		)
		.bind(root_id)
		.bind(root_id)
		.bind(root_id)
		.execute(&self.pool)
		.await?;

		let (forks,): (i64,) = sqlx::query_as("SELECT forks FROM databases WHERE id = ?")
			.bind(root_id)
			.fetch_one(&self.pool)
			.await?;
		Ok(forks)
	}

	/// All rows of a fork tree, parent data included, in creation order.
	#[tracing::instrument(skip(self))]
	pub async fn fork_sources(&self, root_id: &str) -> Result<Vec<ForkSource>> {
		let rows = sqlx::query(
			r#"
			SELECT d.id, u.username AS owner_name, d.name, d.forked_from, d.public, d.is_deleted
			FROM databases d
			JOIN users u ON u.id = d.owner_id
			WHERE d.root_database = ?
			ORDER BY d.created_at, d.id
			"#,
		)
		.bind(root_id)
		.fetch_all(&self.pool)
		.await?;

		Ok(
			rows
				.into_iter()
				.map(|r| ForkSource {
					id: r.get("id"),
					owner: r.get("owner_name"),
					name: r.get("name"),
					forked_from: r.get("forked_from"),
					public: r.get("public"),
					deleted: r.get("is_deleted"),
				})
				.collect(),
		)
	}

	#[tracing::instrument(skip(self))]
	pub async fn increment_download_count(&self, db_id: &str) -> Result<()> {
		sqlx::query("UPDATE databases SET download_count = download_count + 1 WHERE id = ?")
			.bind(db_id)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn update_public(&self, db_id: &str, public: bool) -> Result<()> {
		let result = sqlx::query("UPDATE databases SET public = ? WHERE id = ? AND is_deleted = 0")
			.bind(public)
			.bind(db_id)
			.execute(&self.pool)
			.await?;
		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(db_id.to_string()));
		}
		Ok(())
	}

	/// Record the worker node and blob object backing a live database.
	#[tracing::instrument(skip(self))]
	pub async fn set_live_details(&self, db_id: &str, node: &str, blob: &str) -> Result<()> {
		let result =
			sqlx::query("UPDATE databases SET live_node = ?, live_blob = ? WHERE id = ? AND live = 1")
				.bind(node)
				.bind(blob)
				.bind(db_id)
				.execute(&self.pool)
				.await?;
		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(db_id.to_string()));
		}
		Ok(())
	}

	/// Create a branch pointing at an existing commit.
	#[tracing::instrument(skip(self))]
	pub async fn create_branch(
		&self,
		db_id: &str,
		name: &str,
		from_commit: &str,
		description: &str,
	) -> Result<()> {
		let mut tx = self.pool.begin().await?;
		let row = sqlx::query(
			"SELECT branch_heads, commit_list FROM databases WHERE id = ? AND is_deleted = 0",
		)
		.bind(db_id)
		.fetch_optional(&mut *tx)
		.await?
		.ok_or_else(|| DbError::NotFound(db_id.to_string()))?;

		let branch_heads_json: String = row.get("branch_heads");
		let commit_list_json: String = row.get("commit_list");
		let mut branches: BTreeMap<String, BranchEntry> = serde_json::from_str(&branch_heads_json)?;
		let commits: BTreeMap<String, CommitEntry> = serde_json::from_str(&commit_list_json)?;

		if branches.contains_key(name) {
			return Err(DbError::Conflict(format!("branch '{name}' already exists")));
		}
		if !commits.contains_key(from_commit) {
			return Err(DbError::NotFound(format!(
				"commit '{from_commit}' is not in the commit list"
			)));
		}

		branches.insert(
			name.to_string(),
			BranchEntry {
				commit: from_commit.to_string(),
				commit_count: ancestry_count(&commits, from_commit),
				description: description.to_string(),
			},
		);

		sqlx::query("UPDATE databases SET branch_heads = ? WHERE id = ?")
			.bind(serde_json::to_string(&branches)?)
			.bind(db_id)
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;
		Ok(())
	}

	/// Remove a branch. The default branch and the last remaining branch
	/// cannot be removed.
	#[tracing::instrument(skip(self))]
	pub async fn delete_branch(&self, db_id: &str, name: &str) -> Result<()> {
		let mut tx = self.pool.begin().await?;
		let row = sqlx::query(
			"SELECT branch_heads, default_branch FROM databases WHERE id = ? AND is_deleted = 0",
		)
		.bind(db_id)
		.fetch_optional(&mut *tx)
		.await?
		.ok_or_else(|| DbError::NotFound(db_id.to_string()))?;

		let branch_heads_json: String = row.get("branch_heads");
		let default_branch: String = row.get("default_branch");
		let mut branches: BTreeMap<String, BranchEntry> = serde_json::from_str(&branch_heads_json)?;

		if !branches.contains_key(name) {
			return Err(DbError::NotFound(format!("branch '{name}' does not exist")));
		}
		if name == default_branch {
			return Err(DbError::Conflict(format!(
				"branch '{name}' is the default branch"
			)));
		}
		if branches.len() == 1 {
			return Err(DbError::Conflict(
				"the last branch cannot be removed".to_string(),
			));
		}
		branches.remove(name);

		sqlx::query("UPDATE databases SET branch_heads = ? WHERE id = ?")
			.bind(serde_json::to_string(&branches)?)
			.bind(db_id)
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;
		Ok(())
	}

	/// Change the default branch. The new default must exist in the branch
	/// map.
	#[tracing::instrument(skip(self))]
	pub async fn set_default_branch(&self, db_id: &str, name: &str) -> Result<()> {
		let mut tx = self.pool.begin().await?;
		let row = sqlx::query("SELECT branch_heads FROM databases WHERE id = ? AND is_deleted = 0")
			.bind(db_id)
			.fetch_optional(&mut *tx)
			.await?
			.ok_or_else(|| DbError::NotFound(db_id.to_string()))?;

		let branch_heads_json: String = row.get("branch_heads");
		let branches: BTreeMap<String, BranchEntry> = serde_json::from_str(&branch_heads_json)?;
		if !branches.contains_key(name) {
			return Err(DbError::NotFound(format!("branch '{name}' does not exist")));
		}

		sqlx::query("UPDATE databases SET default_branch = ? WHERE id = ?")
			.bind(name)
			.bind(db_id)
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;
		Ok(())
	}

	/// Add a tag; tag names are unique within a database.
	#[tracing::instrument(skip(self, entry))]
	pub async fn add_tag(&self, db_id: &str, name: &str, entry: TagEntry) -> Result<()> {
		let mut tx = self.pool.begin().await?;
		let row = sqlx::query("SELECT tag_list FROM databases WHERE id = ? AND is_deleted = 0")
			.bind(db_id)
			.fetch_optional(&mut *tx)
			.await?
			.ok_or_else(|| DbError::NotFound(db_id.to_string()))?;

		let json: String = row.get("tag_list");
		let mut tags: BTreeMap<String, TagEntry> = serde_json::from_str(&json)?;
		if tags.contains_key(name) {
			return Err(DbError::Conflict(format!("tag '{name}' already exists")));
		}
		tags.insert(name.to_string(), entry);

		sqlx::query("UPDATE databases SET tag_list = ? WHERE id = ?")
			.bind(serde_json::to_string(&tags)?)
			.bind(db_id)
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;
		Ok(())
	}

	/// Add a release; release names are unique within a database.
	#[tracing::instrument(skip(self, entry))]
	pub async fn add_release(&self, db_id: &str, name: &str, entry: ReleaseEntry) -> Result<()> {
		let mut tx = self.pool.begin().await?;
		let row = sqlx::query("SELECT release_list FROM databases WHERE id = ? AND is_deleted = 0")
			.bind(db_id)
			.fetch_optional(&mut *tx)
			.await?
			.ok_or_else(|| DbError::NotFound(db_id.to_string()))?;

		let json: String = row.get("release_list");
		let mut releases: BTreeMap<String, ReleaseEntry> = serde_json::from_str(&json)?;
		if releases.contains_key(name) {
			return Err(DbError::Conflict(format!("release '{name}' already exists")));
		}
		releases.insert(name.to_string(), entry);

		sqlx::query("UPDATE databases SET release_list = ? WHERE id = ?")
			.bind(serde_json::to_string(&releases)?)
			.bind(db_id)
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;
		Ok(())
	}
}

#[async_trait]
impl DatabaseStore for DatabaseRepository {
	async fn insert(&self, new: NewDatabase) -> Result<DatabaseRow> {
		self.insert(new).await
	}

	async fn get_by_id(&self, id: &str) -> Result<Option<DatabaseRow>> {
		self.get_by_id(id).await
	}

	async fn get_by_owner_name(&self, owner: &str, name: &str) -> Result<Option<DatabaseRow>> {
		self.get_by_owner_name(owner, name).await
	}

	async fn list_names_for_user(&self, user_id: &str, live: Option<bool>) -> Result<Vec<String>> {
		self.list_names_for_user(user_id, live).await
	}

	async fn append_commit(
		&self,
		db_id: &str,
		branch: &str,
		commit: &CommitEntry,
		force: bool,
	) -> Result<DatabaseRow> {
		self.append_commit(db_id, branch, commit, force).await
	}

	async fn mark_deleted(&self, db_id: &str) -> Result<String> {
		self.mark_deleted(db_id).await
	}

	async fn fork(&self, src_id: &str, dst_owner_id: &str) -> Result<DatabaseRow> {
		self.fork(src_id, dst_owner_id).await
	}

	async fn increment_download_count(&self, db_id: &str) -> Result<()> {
		self.increment_download_count(db_id).await
	}
}

fn deleted_name() -> String {
	let suffix: String = rand::thread_rng()
		.sample_iter(&Alphanumeric)
		.take(20)
		.map(char::from)
		.collect();
	format!("deleted-database-{suffix}")
}

fn rfc3339_now() -> String {
	Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(value: String, column: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(&value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("Invalid {column}: {e}")))
}

fn parse_database_row(row: &SqliteRow) -> Result<DatabaseRow> {
	let branch_heads_json: String = row.get("branch_heads");
	let commit_list_json: String = row.get("commit_list");
	let tag_list_json: String = row.get("tag_list");
	let release_list_json: String = row.get("release_list");

	Ok(DatabaseRow {
		id: row.get("id"),
		owner_id: row.get("owner_id"),
		owner_name: row.get("owner_name"),
		name: row.get("name"),
		public: row.get("public"),
		live: row.get("live"),
		is_deleted: row.get("is_deleted"),
		forked_from: row.get("forked_from"),
		root_database: row.get("root_database"),
		watchers: row.get("watchers"),
		stars: row.get("stars"),
		forks: row.get("forks"),
		discussions: row.get("discussions"),
		merge_requests: row.get("merge_requests"),
		download_count: row.get("download_count"),
		contributors: row.get("contributors"),
		default_branch: row.get("default_branch"),
		default_table: row.get("default_table"),
		licence_sha: row.get("licence_sha"),
		source_url: row.get("source_url"),
		live_node: row.get("live_node"),
		live_blob: row.get("live_blob"),
		branch_heads: serde_json::from_str(&branch_heads_json)?,
		commit_list: serde_json::from_str(&commit_list_json)?,
		tag_list: serde_json::from_str(&tag_list_json)?,
		release_list: serde_json::from_str(&release_list_json)?,
		last_modified: parse_timestamp(row.get("last_modified"), "last_modified")?,
		created_at: parse_timestamp(row.get("created_at"), "created_at")?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_migrated_pool, seed_user};
	use chrono::TimeZone;
	use silo_server_vcs::{blob_tree, build_commit};

	fn commit_at(parent: Option<&str>, message: &str, secs: i64) -> CommitEntry {
		let ts = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
		build_commit(
			blob_tree("weather.sqlite", &"ab".repeat(32), 2048, ts, None),
			parent,
			"Alice",
			"alice@example.com",
			message,
			ts,
		)
	}

	async fn standard_db(pool: &SqlitePool, owner_id: &str, name: &str) -> DatabaseRow {
		DatabaseRepository::new(pool.clone())
			.insert(NewDatabase {
				owner_id: owner_id.to_string(),
				name: name.to_string(),
				public: true,
				default_branch: "main".to_string(),
				..Default::default()
			})
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn test_insert_and_lookup() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let repo = DatabaseRepository::new(pool.clone());

		let db = standard_db(&pool, &alice.id, "weather.sqlite").await;
		assert_eq!(db.root_database, db.id);
		assert_eq!(db.default_branch, "main");

		let found = repo
			.get_by_owner_name("ALICE", "weather.sqlite")
			.await
			.unwrap();
		assert!(found.is_some());
		assert!(repo
			.get_by_owner_name("alice", "missing.sqlite")
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn test_append_commit_advances_head() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let repo = DatabaseRepository::new(pool.clone());
		let db = standard_db(&pool, &alice.id, "weather.sqlite").await;

		let c1 = commit_at(None, "c1", 0);
		let db = repo.append_commit(&db.id, "main", &c1, false).await.unwrap();
		assert_eq!(db.branch_head("main"), Some(c1.id.as_str()));
		assert_eq!(db.branch_heads["main"].commit_count, 1);

		let c2 = commit_at(Some(&c1.id), "c2", 60);
		let db = repo.append_commit(&db.id, "main", &c2, false).await.unwrap();
		assert_eq!(db.branch_head("main"), Some(c2.id.as_str()));
		assert_eq!(db.branch_heads["main"].commit_count, 2);
		assert_eq!(db.commit_list.len(), 2);
		assert_eq!(db.contributors, 1);
	}

	#[tokio::test]
	async fn test_append_commit_rejects_stale_parent() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let repo = DatabaseRepository::new(pool.clone());
		let db = standard_db(&pool, &alice.id, "weather.sqlite").await;

		let c1 = commit_at(None, "c1", 0);
		repo.append_commit(&db.id, "main", &c1, false).await.unwrap();
		let c2 = commit_at(Some(&c1.id), "c2", 60);
		repo.append_commit(&db.id, "main", &c2, false).await.unwrap();

		// Parent c1 is no longer the head.
		let stale = commit_at(Some(&c1.id), "stale", 120);
		let err = repo
			.append_commit(&db.id, "main", &stale, false)
			.await
			.unwrap_err();
		match err {
			DbError::Conflict(msg) => assert!(msg.contains("Outdated commit")),
			other => panic!("expected conflict, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_forced_append_rewrites_history() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let repo = DatabaseRepository::new(pool.clone());
		let db = standard_db(&pool, &alice.id, "weather.sqlite").await;

		let c1 = commit_at(None, "c1", 0);
		repo.append_commit(&db.id, "main", &c1, false).await.unwrap();
		let c2 = commit_at(Some(&c1.id), "c2", 60);
		repo.append_commit(&db.id, "main", &c2, false).await.unwrap();

		let c3 = commit_at(Some(&c1.id), "c3", 120);
		let db = repo.append_commit(&db.id, "main", &c3, true).await.unwrap();
		assert_eq!(db.branch_head("main"), Some(c3.id.as_str()));
		assert_eq!(db.branch_heads["main"].commit_count, 2);
		// c2 stays in the list for audit.
		assert!(db.commit_list.contains_key(&c2.id));
	}

	#[tokio::test]
	async fn test_append_commit_detects_collision() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let repo = DatabaseRepository::new(pool.clone());
		let db = standard_db(&pool, &alice.id, "weather.sqlite").await;

		let c1 = commit_at(None, "c1", 0);
		repo.append_commit(&db.id, "main", &c1, false).await.unwrap();
		let err = repo
			.append_commit(&db.id, "main", &c1, true)
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
	}

	#[tokio::test]
	async fn test_delete_frees_name_for_reuse() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let repo = DatabaseRepository::new(pool.clone());
		let db = standard_db(&pool, &alice.id, "weather.sqlite").await;

		let new_name = repo.mark_deleted(&db.id).await.unwrap();
		assert!(new_name.starts_with("deleted-database-"));
		assert_eq!(new_name.len(), "deleted-database-".len() + 20);

		assert!(repo
			.get_by_owner_name("alice", "weather.sqlite")
			.await
			.unwrap()
			.is_none());

		// Same original name can be used again.
		standard_db(&pool, &alice.id, "weather.sqlite").await;
	}

	#[tokio::test]
	async fn test_fork_copies_graph_and_counts_descendants() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let bob = seed_user(&pool, "bob").await;
		let repo = DatabaseRepository::new(pool.clone());
		let db = standard_db(&pool, &alice.id, "weather.sqlite").await;

		let c1 = commit_at(None, "c1", 0);
		repo.append_commit(&db.id, "main", &c1, false).await.unwrap();

		let fork = repo.fork(&db.id, &bob.id).await.unwrap();
		assert_eq!(fork.forked_from.as_deref(), Some(db.id.as_str()));
		assert_eq!(fork.root_database, db.id);
		assert_eq!(fork.forks, 0);
		assert_eq!(fork.commit_list.len(), 1);
		assert!(fork.release_list.is_empty());

		let root = repo.get_by_id(&db.id).await.unwrap().unwrap();
		assert_eq!(root.forks, 1);

		// New commits on the fork leave the source untouched.
		let c2 = commit_at(Some(&c1.id), "fork work", 60);
		repo
			.append_commit(&fork.id, "main", &c2, false)
			.await
			.unwrap();
		let root = repo.get_by_id(&db.id).await.unwrap().unwrap();
		assert_eq!(root.commit_list.len(), 1);
	}

	#[tokio::test]
	async fn test_deleted_fork_decrements_root_counter() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let bob = seed_user(&pool, "bob").await;
		let repo = DatabaseRepository::new(pool.clone());
		let db = standard_db(&pool, &alice.id, "weather.sqlite").await;

		let fork = repo.fork(&db.id, &bob.id).await.unwrap();
		assert_eq!(repo.get_by_id(&db.id).await.unwrap().unwrap().forks, 1);

		repo.mark_deleted(&fork.id).await.unwrap();
		assert_eq!(repo.get_by_id(&db.id).await.unwrap().unwrap().forks, 0);
	}

	#[tokio::test]
	async fn test_branch_lifecycle() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let repo = DatabaseRepository::new(pool.clone());
		let db = standard_db(&pool, &alice.id, "weather.sqlite").await;

		let c1 = commit_at(None, "c1", 0);
		repo.append_commit(&db.id, "main", &c1, false).await.unwrap();
		let c2 = commit_at(Some(&c1.id), "c2", 60);
		repo.append_commit(&db.id, "main", &c2, false).await.unwrap();

		// A feature branch starting at c1 counts one commit.
		repo
			.create_branch(&db.id, "feature", &c1.id, "work in progress")
			.await
			.unwrap();
		let row = repo.get_by_id(&db.id).await.unwrap().unwrap();
		assert_eq!(row.branch_heads["feature"].commit, c1.id);
		assert_eq!(row.branch_heads["feature"].commit_count, 1);

		let err = repo
			.create_branch(&db.id, "feature", &c1.id, "")
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));

		let err = repo
			.create_branch(&db.id, "orphan", &"f".repeat(64), "")
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));

		// The default branch moves, then the old default can be removed.
		repo.set_default_branch(&db.id, "feature").await.unwrap();
		let err = repo.delete_branch(&db.id, "feature").await.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));

		repo.delete_branch(&db.id, "main").await.unwrap();
		let row = repo.get_by_id(&db.id).await.unwrap().unwrap();
		assert_eq!(row.default_branch, "feature");
		assert!(!row.branch_heads.contains_key("main"));

		let err = repo.delete_branch(&db.id, "feature").await.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
	}

	#[tokio::test]
	async fn test_fork_sources_feed_the_tree_walk() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let bob = seed_user(&pool, "bob").await;
		let carol = seed_user(&pool, "carol").await;
		let repo = DatabaseRepository::new(pool.clone());
		let root = standard_db(&pool, &alice.id, "weather.sqlite").await;

		let bob_fork = repo.fork(&root.id, &bob.id).await.unwrap();
		repo.fork(&bob_fork.id, &carol.id).await.unwrap();

		let sources = repo.fork_sources(&root.id).await.unwrap();
		assert_eq!(sources.len(), 3);

		let tree = silo_server_vcs::render_fork_tree(&sources, Some("alice"));
		assert_eq!(tree[0].owner, "alice");
		assert_eq!(tree[1].owner, "bob");
		assert_eq!(tree[2].owner, "carol");
	}

	#[tokio::test]
	async fn test_tags_are_unique() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let repo = DatabaseRepository::new(pool.clone());
		let db = standard_db(&pool, &alice.id, "weather.sqlite").await;

		let entry = TagEntry {
			commit: "c".repeat(64),
			date: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
			description: String::new(),
			tagger_name: "Alice".to_string(),
			tagger_email: "alice@example.com".to_string(),
		};
		repo.add_tag(&db.id, "v1", entry.clone()).await.unwrap();
		let err = repo.add_tag(&db.id, "v1", entry).await.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
	}

	#[tokio::test]
	async fn test_live_database_has_no_graph() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let repo = DatabaseRepository::new(pool.clone());

		let db = repo
			.insert(NewDatabase {
				owner_id: alice.id.clone(),
				name: "live.db".to_string(),
				live: true,
				live_node: Some("node-7".to_string()),
				default_branch: "main".to_string(),
				..Default::default()
			})
			.await
			.unwrap();

		assert!(db.live);
		assert!(db.commit_list.is_empty());
		assert!(db.branch_heads.is_empty());
		assert_eq!(db.live_node.as_deref(), Some("node-7"));
	}
}
