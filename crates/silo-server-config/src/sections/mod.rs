// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections, one module per concern.

mod cache;
mod database;
mod http;
mod limits;
mod logging;
mod queue;
mod storage;

pub use cache::{CacheConfig, CacheConfigLayer};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use limits::{LimitsConfig, LimitsConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use queue::{QueueConfig, QueueConfigLayer};
pub use storage::{StorageConfig, StorageConfigLayer};
