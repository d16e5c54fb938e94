// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request and response types for the v1 API.
//!
//! Requests arrive as form-encoded POST bodies; responses are JSON. The
//! error envelope is always `{"error": message}`.

pub mod error;
pub mod requests;
pub mod responses;

pub use error::ErrorResponse;
pub use requests::*;
pub use responses::*;
