// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the Control Daemon's router, exercising the
//! security perimeter and a couple of routes end to end via
//! `axum_test::TestServer`.

use std::sync::Arc;

use axum::http::StatusCode;

use forkline::config::Config;
use forkline::fleet::Fleet;
use forkline::transport::build_core_router;
use forkline::transport::state::AppState;

fn test_config() -> Config {
    Config {
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
    }
}

fn test_server(token: &str) -> axum_test::TestServer {
    let config = Arc::new(test_config());
    let fleet = Arc::new(Fleet::new(4, 4096, 1024));
    let state = Arc::new(AppState::new(fleet, config, token.to_string()));
    axum_test::TestServer::new(build_core_router(state)).expect("test server")
}

#[tokio::test]
async fn health_is_public_and_needs_no_token() {
    let server = test_server("secret");
    let resp = server.get("/v1/health").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn sessions_without_token_is_forbidden() {
    let server = test_server("secret");
    let resp = server.get("/v1/pty/sessions").await;
    resp.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn sessions_with_valid_token_lists_empty_fleet() {
    let server = test_server("secret");
    let resp = server
        .get("/v1/pty/sessions")
        .add_header("authorization", "Bearer secret")
        .await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["sessions"], serde_json::json!([]));
}

#[tokio::test]
async fn request_carrying_origin_header_is_rejected_even_with_valid_token() {
    let server = test_server("secret");
    let resp = server
        .get("/v1/pty/sessions")
        .add_header("authorization", "Bearer secret")
        .add_header("origin", "https://evil.example")
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn write_to_unknown_session_is_not_found() {
    let server = test_server("secret");
    let data = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"hello");
    let resp = server
        .post("/v1/pty/write")
        .add_header("authorization", "Bearer secret")
        .json(&serde_json::json!({ "taskId": "nonexistent", "data": data }))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_rejects_relative_cwd() {
    let server = test_server("secret");
    let resp = server
        .post("/v1/pty/create")
        .add_header("authorization", "Bearer secret")
        .json(&serde_json::json!({ "taskId": "t1", "cwd": "relative/path" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}
