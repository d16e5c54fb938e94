// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP server hosting versioned and live SQLite databases.
//!
//! Every request runs the same dispatch sequence: credential resolution,
//! rate limiting, field validation, access control, then a branch on the
//! database's `live` flag into the standard handlers (blob store + commit
//! graph) or the live handlers (job queue round-trip).

pub mod api;
pub mod api_response;
pub mod dispatch;
pub mod routes;
pub mod validation;

pub use api::{create_app_state, create_router, AppState};
pub use api_response::ApiError;
