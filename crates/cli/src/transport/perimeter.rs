// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Security perimeter middleware stack, applied in a fixed order:
//! loopback check, origin rejection, method rejection, rate limit, auth.
//! Body cap is a separate `DefaultBodyLimit` layer applied by each
//! router's assembly (`transport::build_core_router` /
//! `approval::build_agent_router`).
//!
//! A single five-stage stack shared by both the Control Daemon and the
//! Approval Gateway, parameterized over `PerimeterState` so one
//! implementation serves both `AppState` and `AgentState`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::token::constant_time_eq;
use crate::transport::rate_limit::RateLimiter;

/// Shared surface both `AppState` and `AgentState` expose to the perimeter
/// middleware stack.
pub trait PerimeterState {
    fn rate_limiter(&self) -> &RateLimiter;
    fn auth_token(&self) -> &str;
    /// Routes that skip the bearer-token check (health/version only; never
    /// the event stream or any mutating route).
    fn is_public(&self, path: &str) -> bool;
}

impl PerimeterState for crate::transport::state::AppState {
    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
    fn auth_token(&self) -> &str {
        &self.auth_token
    }
    fn is_public(&self, path: &str) -> bool {
        path == "/v1/health" || path == "/v1/version"
    }
}

impl PerimeterState for crate::transport::state::AgentState {
    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
    fn auth_token(&self) -> &str {
        &self.auth_token
    }
    fn is_public(&self, _path: &str) -> bool {
        false
    }
}

/// Step 1: reject any remote address that isn't loopback. Defense in depth
/// alongside binding only to loopback — a misconfigured reverse proxy or a
/// container NAT hop should not change this service's trust boundary.
pub async fn reject_non_loopback(req: Request<Body>, next: Next) -> Response {
    let addr = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0.ip());
    match addr {
        Some(ip) if ip.is_loopback() => next.run(req).await,
        _ => ApiError::Auth.into_response(),
    }
}

/// Step 2: reject any request carrying an `Origin` header, unconditionally.
/// Blocks browser-origin calls (including same-origin, since this service
/// is never itself the page origin) outright rather than maintaining an
/// allowlist.
pub async fn reject_cross_origin(req: Request<Body>, next: Next) -> Response {
    if req.headers().contains_key(axum::http::header::ORIGIN) {
        return ApiError::Auth.into_response();
    }
    next.run(req).await
}

/// Step 3: reject `OPTIONS` outright — no CORS preflight is supported.
pub async fn reject_options(req: Request<Body>, next: Next) -> Response {
    if req.method() == axum::http::Method::OPTIONS {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    next.run(req).await
}

/// Step 4: per-remote rolling-window rate limit.
pub async fn rate_limit<S: PerimeterState + Send + Sync + 'static>(
    State(state): State<Arc<S>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let addr = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0.ip());
    if let Some(ip) = addr {
        if !state.rate_limiter().check(ip) {
            return ApiError::RateLimited.into_response();
        }
    }
    next.run(req).await
}

/// Step 5: bearer token, constant-time compared, skipped for public routes.
pub async fn require_auth<S: PerimeterState + Send + Sync + 'static>(
    State(state): State<Arc<S>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if state.is_public(req.uri().path()) {
        return next.run(req).await;
    }

    let header_token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| req.headers().get("x-forkline-token").and_then(|v| v.to_str().ok()));

    match header_token {
        Some(token) if constant_time_eq(token.as_bytes(), state.auth_token().as_bytes()) => {
            next.run(req).await
        }
        _ => ApiError::Auth.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::state::AppState;

    fn state_with_token(token: &str) -> Arc<AppState> {
        let config = Arc::new(crate::config::Config {
            host: "127.0.0.1".to_string(),
            port: 34600,
            agent_port: 34567,
            token: None,
            token_file: None,
            max_body_bytes: 2_000_000,
            max_pty_write_bytes: 64_000,
            max_sse_clients: 64,
            rate_limit_per_minute: 1200,
            max_pty_sessions: 256,
            ring_size: 1_048_576,
            worktree_root: None,
            approval_wait_secs: 600,
            approval_retention_days: 7,
            log_format: "json".to_string(),
            log_level: "info".to_string(),
        });
        let fleet = Arc::new(crate::fleet::Fleet::new(4, 4096, 1024));
        Arc::new(AppState::new(fleet, config, token.to_string()))
    }

    #[test]
    fn health_and_version_are_public() {
        let state = state_with_token("secret");
        assert!(state.is_public("/v1/health"));
        assert!(state.is_public("/v1/version"));
        assert!(!state.is_public("/v1/pty/sessions"));
        assert!(!state.is_public("/v1/events"));
    }
}
