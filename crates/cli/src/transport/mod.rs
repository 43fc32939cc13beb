// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control Daemon: HTTP+SSE surface over the PTY Supervisor and Worktree
//! Manager, behind the security perimeter in `perimeter.rs`. Route table
//! shape follows one `Router::new().route(...)` per concern, with an
//! explicit reject-by-default perimeter instead of a permissive CORS
//! layer.

pub mod http;
pub mod perimeter;
pub mod rate_limit;
pub mod sse;
pub mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;

use state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    success: bool,
    status: &'static str,
}

async fn health() -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse { success: true, status: "ok" })
}

#[derive(Serialize)]
struct VersionResponse {
    success: bool,
    version: &'static str,
}

async fn version() -> axum::Json<VersionResponse> {
    axum::Json(VersionResponse { success: true, version: env!("CARGO_PKG_VERSION") })
}

/// Builds the Control Daemon's router. Middleware is added bottom-up:
/// the LAST `.layer()` call here is the FIRST to run (loopback check
/// first, body cap last before the handler).
pub fn build_core_router(state: Arc<AppState>) -> Router {
    let max_body_bytes = state.config.max_body_bytes;

    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/version", get(version))
        .route("/v1/events", get(sse::events))
        .route("/v1/pty/sessions", get(http::pty::list_sessions))
        .route("/v1/pty/create", post(http::pty::create))
        .route("/v1/pty/attach", post(http::pty::attach))
        .route("/v1/pty/detach", post(http::pty::detach))
        .route("/v1/pty/write", post(http::pty::write))
        .route("/v1/pty/resize", post(http::pty::resize))
        .route("/v1/pty/destroy", post(http::pty::destroy))
        .route("/v1/git/validate", post(http::git::validate_source))
        .route("/v1/git/worktree/create", post(http::git::create_worktree))
        .route("/v1/git/worktree/list", post(http::git::list_worktrees))
        .route("/v1/git/branches/list", post(http::git::list_branches))
        .route("/v1/git/worktree/remove", post(http::git::remove_worktree))
        .route("/v1/git/worktree/merge", post(http::git::merge_worktree))
        .route("/v1/git/diff", post(http::git::diff))
        .route("/v1/git/modified-files", post(http::git::modified_files))
        // Step 6: body cap. Applied as a layer so it governs every route's
        // body extraction uniformly rather than duplicating a limit check
        // per handler.
        .layer(DefaultBodyLimit::max(max_body_bytes))
        // Step 5: auth.
        .layer(middleware::from_fn_with_state(Arc::clone(&state), perimeter::require_auth::<AppState>))
        // Step 4: rate limit.
        .layer(middleware::from_fn_with_state(Arc::clone(&state), perimeter::rate_limit::<AppState>))
        // Step 3: reject OPTIONS.
        .layer(middleware::from_fn(perimeter::reject_options))
        // Step 2: reject cross-origin.
        .layer(middleware::from_fn(perimeter::reject_cross_origin))
        // Step 1: loopback only.
        .layer(middleware::from_fn(perimeter::reject_non_loopback))
        .with_state(state)
}
