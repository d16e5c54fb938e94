// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Synchronous pre-handler rate limiting.
//!
//! Each caller's usage-limits profile names an ordered list of token-bucket
//! rules evaluated by the store. A request either debits every bucket or
//! none of them.

use silo_server_db::{UsageRepository, UserRepository};

use crate::error::{AuthError, Result};

/// Profile name whose callers bypass the limiter entirely.
const UNLIMITED_PROFILE: &str = "unlimited";

#[derive(Clone)]
pub struct RateLimiter {
	users: UserRepository,
	usage: UsageRepository,
}

impl RateLimiter {
	pub fn new(users: UserRepository, usage: UsageRepository) -> Self {
		Self { users, usage }
	}

	/// Debit one token from each of the caller's buckets.
	///
	/// Fails with [`AuthError::RateLimited`] when any bucket would go
	/// negative; in that case nothing is charged.
	#[tracing::instrument(skip(self))]
	pub async fn check(&self, user_id: &str) -> Result<()> {
		let profile = match self.users.get_by_id(user_id).await? {
			Some(user) => user.limits_profile,
			// An unknown caller has nothing to debit; the access check will
			// reject the request on its own.
			None => return Ok(()),
		};

		if profile == UNLIMITED_PROFILE {
			return Ok(());
		}

		let rules = self.usage.get_profile(&profile).await?.unwrap_or_default();
		if rules.is_empty() {
			return Ok(());
		}

		if self.usage.check_and_debit(user_id, &rules).await? {
			Ok(())
		} else {
			Err(AuthError::RateLimited)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use silo_server_db::testing::{create_migrated_pool, seed_user};

	#[tokio::test]
	async fn test_default_profile_allows_ten_per_second() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let limiter = RateLimiter::new(
			UserRepository::new(pool.clone()),
			UsageRepository::new(pool),
		);

		for _ in 0..10 {
			limiter.check(&alice.id).await.unwrap();
		}
		let err = limiter.check(&alice.id).await.unwrap_err();
		assert!(matches!(err, AuthError::RateLimited));
	}

	#[tokio::test]
	async fn test_unlimited_profile_bypasses() {
		let pool = create_migrated_pool().await;
		let alice = seed_user(&pool, "alice").await;
		let users = UserRepository::new(pool.clone());
		users
			.set_limits_profile(&alice.id, "unlimited")
			.await
			.unwrap();

		let limiter = RateLimiter::new(users, UsageRepository::new(pool));
		for _ in 0..100 {
			limiter.check(&alice.id).await.unwrap();
		}
	}
}
