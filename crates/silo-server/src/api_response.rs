// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The API error taxonomy and its response mapping.
//!
//! Every failure leaves the server as `{"error": message}` with one of the
//! status codes below. Conversions from the subsystem error types decide
//! which bucket a failure lands in; store breakage is surfaced as 500, not
//! retried inside the request.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use silo_server_api::ErrorResponse;
use silo_server_auth::AuthError;
use silo_server_db::DbError;
use silo_server_queue::QueueError;
use silo_server_sqlite::SqliteError;
use silo_server_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
	#[error("Unknown API key")]
	Unauthenticated,

	#[error("{0}")]
	Unauthorised(String),

	#[error("{0}")]
	Forbidden(String),

	#[error("Database not found")]
	NotFound,

	#[error("{0}")]
	BadRequest(String),

	#[error("{0}")]
	Conflict(String),

	#[error("Rate limit exceeded")]
	RateLimited,

	#[error("{0}")]
	PayloadTooLarge(String),

	#[error("{0}")]
	UpgradeRequired(String),

	#[error("{0}")]
	GatewayTimeout(String),

	#[error("{0}")]
	Internal(String),
}

impl ApiError {
	pub fn status(&self) -> StatusCode {
		match self {
			ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
			ApiError::Unauthorised(_) => StatusCode::FORBIDDEN,
			ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
			ApiError::NotFound => StatusCode::NOT_FOUND,
			ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
			ApiError::Conflict(_) => StatusCode::CONFLICT,
			ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
			ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
			ApiError::UpgradeRequired(_) => StatusCode::UPGRADE_REQUIRED,
			ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
			ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status.is_server_error() {
			tracing::error!(status = %status, error = %self, "request failed");
		}
		(status, Json(ErrorResponse::new(self.to_string()))).into_response()
	}
}

impl From<AuthError> for ApiError {
	fn from(err: AuthError) -> Self {
		match err {
			AuthError::Unauthenticated => ApiError::Unauthenticated,
			AuthError::RateLimited => ApiError::RateLimited,
			AuthError::Db(e) => e.into(),
		}
	}
}

impl From<DbError> for ApiError {
	fn from(err: DbError) -> Self {
		match err {
			DbError::NotFound(_) => ApiError::NotFound,
			DbError::Conflict(msg) => ApiError::Conflict(msg),
			other => ApiError::Internal(other.to_string()),
		}
	}
}

impl From<StoreError> for ApiError {
	fn from(err: StoreError) -> Self {
		ApiError::Internal(err.to_string())
	}
}

impl From<SqliteError> for ApiError {
	fn from(err: SqliteError) -> Self {
		match err {
			SqliteError::NotSqlite(msg) => {
				ApiError::BadRequest(format!("not a valid SQLite database: {msg}"))
			}
			SqliteError::NotReadOnly(msg) => ApiError::BadRequest(msg),
			SqliteError::UnknownObject(name) => {
				ApiError::BadRequest(format!("no such table or view: {name}"))
			}
			SqliteError::BudgetExceeded => {
				ApiError::BadRequest("query aborted: statement budget exceeded".to_string())
			}
			// User SQL failed inside SQLite; the message is theirs to act on.
			SqliteError::Sqlite(e) => ApiError::BadRequest(e.to_string()),
		}
	}
}

impl From<QueueError> for ApiError {
	fn from(err: QueueError) -> Self {
		match err {
			QueueError::Timeout => {
				ApiError::GatewayTimeout("the live node did not respond in time".to_string())
			}
			QueueError::Db(e) => e.into(),
			QueueError::Serialization(e) => ApiError::Internal(e.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_mapping() {
		assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
		assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
		assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
		assert_eq!(
			ApiError::UpgradeRequired(String::new()).status(),
			StatusCode::UPGRADE_REQUIRED
		);
		assert_eq!(
			ApiError::GatewayTimeout(String::new()).status(),
			StatusCode::GATEWAY_TIMEOUT
		);
	}

	#[test]
	fn test_db_not_found_translates() {
		let err: ApiError = DbError::NotFound("db-1".to_string()).into();
		assert!(matches!(err, ApiError::NotFound));
	}

	#[test]
	fn test_queue_timeout_translates() {
		let err: ApiError = QueueError::Timeout.into();
		assert!(matches!(err, ApiError::GatewayTimeout(_)));
	}
}
