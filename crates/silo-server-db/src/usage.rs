// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Usage-limits profiles and token buckets.
//!
//! A profile is an ordered list of token-bucket rules; the empty list means
//! unlimited. Each caller holds one bucket per rule. A request must debit
//! every bucket atomically: if any bucket would go negative the whole check
//! fails and no bucket is charged.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::SqlitePool;

use crate::error::{DbError, Result};
use crate::types::LimitRule;

#[derive(Clone)]
pub struct UsageRepository {
	pool: SqlitePool,
}

impl UsageRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, rules))]
	pub async fn upsert_profile(&self, name: &str, rules: &[LimitRule]) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO usage_profiles (name, rules)
			VALUES (?, ?)
			ON CONFLICT(name) DO UPDATE SET rules = excluded.rules
			"#,
		)
		.bind(name)
		.bind(serde_json::to_string(rules)?)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_profile(&self, name: &str) -> Result<Option<Vec<LimitRule>>> {
		let row: Option<(String,)> =
			sqlx::query_as("SELECT rules FROM usage_profiles WHERE name = ?")
				.bind(name)
				.fetch_optional(&self.pool)
				.await?;

		row
			.map(|(json,)| serde_json::from_str(&json).map_err(DbError::from))
			.transpose()
	}

	/// Atomically debit one token from every bucket of the caller's rules.
	///
	/// Buckets refill by `increase` tokens per elapsed whole `period`,
	/// capped at `limit`; a fresh bucket starts full. Returns `false`
	/// without charging anything when any bucket would go negative.
	#[tracing::instrument(skip(self, rules), fields(user_id = %user_id))]
	pub async fn check_and_debit(&self, user_id: &str, rules: &[LimitRule]) -> Result<bool> {
		if rules.is_empty() {
			return Ok(true);
		}

		let now = Utc::now();
		let mut tx = self.pool.begin().await?;
		let mut charged: Vec<(i64, i64, DateTime<Utc>)> = Vec::with_capacity(rules.len());

		for (idx, rule) in rules.iter().enumerate() {
			let idx = idx as i64;
			let row: Option<(i64, String)> = sqlx::query_as(
				"SELECT tokens, updated_at FROM rate_buckets WHERE user_id = ? AND rule_idx = ?",
			)
			.bind(user_id)
			.bind(idx)
			.fetch_optional(&mut *tx)
			.await?;

			let (mut tokens, mut updated_at) = match row {
				Some((tokens, updated_at_str)) => {
					let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
						.map_err(|e| DbError::Internal(format!("Invalid bucket timestamp: {e}")))?
						.with_timezone(&Utc);
					(tokens, updated_at)
				}
				None => (rule.limit, now),
			};

			let period_secs = rule.period.as_secs();
			let elapsed = (now - updated_at).num_seconds();
			if elapsed > 0 {
				let periods = elapsed / period_secs;
				if periods > 0 {
					tokens = (tokens + periods * rule.increase).min(rule.limit);
					updated_at += Duration::seconds(periods * period_secs);
				}
			}

			if tokens < 1 {
				tracing::debug!(user_id = %user_id, rule_idx = idx, "rate bucket exhausted");
				return Ok(false);
			}
			charged.push((idx, tokens - 1, updated_at));
		}

		for (idx, tokens, updated_at) in charged {
			sqlx::query(
				r#"
				INSERT INTO rate_buckets (user_id, rule_idx, tokens, updated_at)
				VALUES (?, ?, ?, ?)
				ON CONFLICT(user_id, rule_idx) DO UPDATE SET
					tokens = excluded.tokens,
					updated_at = excluded.updated_at
				"#,
			)
			.bind(user_id)
			.bind(idx)
			.bind(tokens)
			.bind(updated_at.to_rfc3339_opts(SecondsFormat::Secs, true))
			.execute(&mut *tx)
			.await?;
		}

		tx.commit().await?;
		Ok(true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_migrated_pool;
	use crate::types::LimitPeriod;

	fn per_second(limit: i64) -> Vec<LimitRule> {
		vec![LimitRule {
			limit,
			period: LimitPeriod::Second,
			increase: limit,
		}]
	}

	#[tokio::test]
	async fn test_empty_profile_is_unlimited() {
		let pool = create_migrated_pool().await;
		let repo = UsageRepository::new(pool);

		for _ in 0..100 {
			assert!(repo.check_and_debit("u-1", &[]).await.unwrap());
		}
	}

	#[tokio::test]
	async fn test_bucket_exhausts_at_limit() {
		let pool = create_migrated_pool().await;
		let repo = UsageRepository::new(pool);
		let rules = per_second(10);

		for _ in 0..10 {
			assert!(repo.check_and_debit("u-1", &rules).await.unwrap());
		}
		assert!(!repo.check_and_debit("u-1", &rules).await.unwrap());
	}

	#[tokio::test]
	async fn test_buckets_are_per_user() {
		let pool = create_migrated_pool().await;
		let repo = UsageRepository::new(pool);
		let rules = per_second(1);

		assert!(repo.check_and_debit("u-1", &rules).await.unwrap());
		assert!(!repo.check_and_debit("u-1", &rules).await.unwrap());
		assert!(repo.check_and_debit("u-2", &rules).await.unwrap());
	}

	#[tokio::test]
	async fn test_failed_check_charges_nothing() {
		let pool = create_migrated_pool().await;
		let repo = UsageRepository::new(pool);

		// Second rule starts with a single token; once it is gone the first
		// rule must not be charged by failing checks.
		let rules = vec![
			LimitRule {
				limit: 5,
				period: LimitPeriod::Hour,
				increase: 5,
			},
			LimitRule {
				limit: 1,
				period: LimitPeriod::Hour,
				increase: 1,
			},
		];

		assert!(repo.check_and_debit("u-1", &rules).await.unwrap());
		for _ in 0..10 {
			assert!(!repo.check_and_debit("u-1", &rules).await.unwrap());
		}

		let (tokens,): (i64,) = sqlx::query_as(
			"SELECT tokens FROM rate_buckets WHERE user_id = 'u-1' AND rule_idx = 0",
		)
		.fetch_one(&repo.pool)
		.await
		.unwrap();
		assert_eq!(tokens, 4);
	}

	#[tokio::test]
	async fn test_refill_after_period() {
		let pool = create_migrated_pool().await;
		let repo = UsageRepository::new(pool.clone());
		let rules = per_second(2);

		assert!(repo.check_and_debit("u-1", &rules).await.unwrap());
		assert!(repo.check_and_debit("u-1", &rules).await.unwrap());
		assert!(!repo.check_and_debit("u-1", &rules).await.unwrap());

		// Backdate the bucket a full period; the next check refills it.
		let past = (Utc::now() - Duration::seconds(2)).to_rfc3339_opts(SecondsFormat::Secs, true);
		sqlx::query("UPDATE rate_buckets SET updated_at = ? WHERE user_id = 'u-1'")
			.bind(&past)
			.execute(&pool)
			.await
			.unwrap();

		assert!(repo.check_and_debit("u-1", &rules).await.unwrap());
	}

	#[tokio::test]
	async fn test_profile_round_trip() {
		let pool = create_migrated_pool().await;
		let repo = UsageRepository::new(pool);

		let rules = per_second(7);
		repo.upsert_profile("tier-1", &rules).await.unwrap();
		assert_eq!(repo.get_profile("tier-1").await.unwrap().unwrap(), rules);
		assert!(repo.get_profile("missing").await.unwrap().is_none());

		// Seeded profiles from migrations.
		let default = repo.get_profile("default").await.unwrap().unwrap();
		assert_eq!(default.len(), 1);
		assert_eq!(default[0].limit, 10);
		assert!(repo
			.get_profile("unlimited")
			.await
			.unwrap()
			.unwrap()
			.is_empty());
	}
}
