// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy translated to HTTP by both the Control Daemon and
//! the Approval Gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// Semantic error kinds shared across the daemon's HTTP surfaces.
///
/// Variant names are the kind, not a type name — each maps to exactly one
/// HTTP status and a stable `as_str()` used in logs.
#[derive(Debug, Clone)]
pub enum ApiError {
    Validation(String),
    Auth,
    NotFound(String),
    Conflict(String),
    PayloadTooLarge,
    RateLimited,
    CapacityExceeded(String),
    Timeout,
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited | ApiError::CapacityExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::Auth => "auth_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::PayloadTooLarge => "payload_too_large",
            ApiError::RateLimited => "rate_limited",
            ApiError::CapacityExceeded(_) => "capacity_exceeded",
            ApiError::Timeout => "timeout",
            ApiError::Internal(_) => "internal",
        }
    }

    /// The message put in the response body. `AuthError` never reveals
    /// which perimeter check failed — always the same generic message.
    fn message(&self) -> String {
        match self {
            ApiError::Validation(m) => m.clone(),
            ApiError::Auth => "forbidden".to_string(),
            ApiError::NotFound(m) => m.clone(),
            ApiError::Conflict(m) => m.clone(),
            ApiError::PayloadTooLarge => "payload too large".to_string(),
            ApiError::RateLimited => "rate limited".to_string(),
            ApiError::CapacityExceeded(m) => m.clone(),
            ApiError::Timeout => "timeout".to_string(),
            ApiError::Internal(_) => "internal error".to_string(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.as_str(), self.message())
    }
}

impl std::error::Error for ApiError {}

#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, ApiError::Internal(ref detail)) {
            tracing::error!(detail, "internal error");
        }
        let body = ErrorEnvelope {
            success: false,
            error: self.message(),
        };
        (self.status(), axum::Json(body)).into_response()
    }
}
