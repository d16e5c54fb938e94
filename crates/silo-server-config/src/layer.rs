// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration layer used for merging sources.

use serde::Deserialize;

use crate::sections::{
	CacheConfigLayer, DatabaseConfigLayer, HttpConfigLayer, LimitsConfigLayer, LoggingConfigLayer,
	QueueConfigLayer, StorageConfigLayer,
};

/// Partial server configuration, one optional layer per section.
///
/// Sources each produce one of these; later sources override earlier ones
/// field by field via [`ServerConfigLayer::merge`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub storage: Option<StorageConfigLayer>,
	#[serde(default)]
	pub cache: Option<CacheConfigLayer>,
	#[serde(default)]
	pub queue: Option<QueueConfigLayer>,
	#[serde(default)]
	pub limits: Option<LimitsConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl ServerConfigLayer {
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_section(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(&mut self.storage, other.storage, StorageConfigLayer::merge);
		merge_section(&mut self.cache, other.cache, CacheConfigLayer::merge);
		merge_section(&mut self.queue, other.queue, QueueConfigLayer::merge);
		merge_section(&mut self.limits, other.limits, LimitsConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_section<T>(target: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	match (target.as_mut(), other) {
		(Some(t), Some(o)) => merge(t, o),
		(None, Some(o)) => *target = Some(o),
		(_, None) => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_overrides_field_by_field() {
		let mut base = ServerConfigLayer {
			http: Some(HttpConfigLayer {
				host: Some("0.0.0.0".to_string()),
				port: Some(8080),
				..Default::default()
			}),
			..Default::default()
		};

		base.merge(ServerConfigLayer {
			http: Some(HttpConfigLayer {
				port: Some(9090),
				..Default::default()
			}),
			..Default::default()
		});

		let http = base.http.unwrap();
		assert_eq!(http.host.as_deref(), Some("0.0.0.0"));
		assert_eq!(http.port, Some(9090));
	}

	#[test]
	fn test_merge_fills_missing_section() {
		let mut base = ServerConfigLayer::default();
		base.merge(ServerConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: Some("sqlite:/tmp/test.db".to_string()),
				..Default::default()
			}),
			..Default::default()
		});
		assert!(base.database.is_some());
	}
}
