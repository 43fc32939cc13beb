// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent Control API: the second loopback HTTP server, accepting
//! agent-originated callbacks under the same perimeter discipline as the
//! Control Daemon (see `transport::perimeter`).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::approval::{ApprovalRequest, ApprovalStatus, ApprovalStore};
use crate::error::ApiError;
use crate::events::FleetEvent;
use crate::transport::perimeter;
use crate::transport::state::AgentState;

/// 1 MB request cap for agent callbacks.
const AGENT_BODY_LIMIT: usize = 1_000_000;

pub fn build_agent_router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/api/task/{task_id}/{action}", post(task_callback))
        .route("/api/approval/{request_id}", get(get_approval))
        .route("/api/internal/approval/{request_id}/resolve", post(resolve_approval))
        .layer(DefaultBodyLimit::max(AGENT_BODY_LIMIT))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), perimeter::require_auth::<AgentState>))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), perimeter::rate_limit::<AgentState>))
        .layer(middleware::from_fn(perimeter::reject_options))
        .layer(middleware::from_fn(perimeter::reject_cross_origin))
        .layer(middleware::from_fn(perimeter::reject_non_loopback))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct WaitQuery {
    #[serde(default)]
    pub wait: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PendingResponse {
    success: bool,
    status: &'static str,
    request_id: String,
    poll_url: String,
}

/// `POST /api/task/:taskId/:action`. `todos`/`message`/`usage` (and its
/// alias `metrics`) are synchronous notifications; `merge` is
/// approval-gated.
pub async fn task_callback(
    State(state): State<Arc<AgentState>>,
    Path((task_id, action)): Path<(String, String)>,
    Query(query): Query<WaitQuery>,
    Json(payload): Json<serde_json::Value>,
) -> Result<axum::response::Response, ApiError> {
    let normalized = if action == "metrics" { "usage" } else { action.as_str() };

    match normalized {
        "todos" | "message" | "usage" => {
            tracing::info!(task_id, action = normalized, "agent callback notification");
            let _ = state.events.send(FleetEvent::AgentNotification {
                task_id: task_id.clone(),
                action: normalized.to_string(),
                payload,
            });
            Ok(Json(serde_json::json!({ "success": true })).into_response())
        }
        "merge" => {
            let request = state.approvals.create(&task_id, "merge", payload, state.config.approval_wait_secs).await;
            tracing::info!(task_id, request_id = %request.request_id, "approval request created");
            let _ = state.events.send(FleetEvent::ApprovalPending {
                task_id: task_id.clone(),
                request_id: request.request_id.clone(),
                action: request.action.clone(),
            });

            if query.wait.as_deref() == Some("1") {
                let timeout = Duration::from_secs(state.config.approval_wait_secs);
                return Ok(match state.approvals.wait(&request.request_id, timeout).await {
                    Some(resolved) => Json(approval_body(&resolved)).into_response(),
                    None => ApiError::Timeout.into_response(),
                });
            }

            Ok((
                StatusCode::ACCEPTED,
                Json(PendingResponse {
                    success: true,
                    status: "pending",
                    request_id: request.request_id.clone(),
                    poll_url: format!("/api/approval/{}", request.request_id),
                }),
            )
                .into_response())
        }
        _ => Err(ApiError::Validation(format!("unknown action: {action}"))),
    }
}

fn approval_body(request: &ApprovalRequest) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "requestId": request.request_id,
        "taskId": request.task_id,
        "action": request.action,
        "status": request.status,
        "decision": request.decision,
        "decidedBy": request.decided_by,
        "createdAt": request.created_at,
        "updatedAt": request.resolved_at.unwrap_or(request.created_at),
    })
}

pub async fn get_approval(
    State(state): State<Arc<AgentState>>,
    Path(request_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request = state
        .approvals
        .get(&request_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no such approval request: {request_id}")))?;
    Ok(Json(approval_body(&request)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub approved: bool,
    #[serde(default)]
    pub decision: Option<serde_json::Value>,
    #[serde(default)]
    pub decided_by: Option<String>,
}

/// Internal operator endpoint: resolves a pending approval and unblocks
/// any `?wait=1` long-poll responder. Still behind the same auth gate as
/// every other route here — there is no separate operator credential.
pub async fn resolve_approval(
    State(state): State<Arc<AgentState>>,
    Path(request_id): Path<String>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let resolved = state
        .approvals
        .resolve(&request_id, body.approved, body.decision, body.decided_by)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no such approval request: {request_id}")))?;
    let _ = state.events.send(FleetEvent::ApprovalResolved {
        task_id: resolved.task_id.clone(),
        request_id: resolved.request_id.clone(),
        approved: resolved.status == ApprovalStatus::Approved,
    });
    Ok(Json(approval_body(&resolved)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let approvals = Arc::new(ApprovalStore::load(dir.path().join("approvals.json"), 7).await.unwrap());
        let config = Arc::new(test_config());
        let (events, _rx) = tokio::sync::broadcast::channel(16);
        let state = Arc::new(AgentState::new(approvals, config, "token".to_string(), events));

        let result = task_callback(
            State(state),
            Path(("task-1".to_string(), "launch-missiles".to_string())),
            Query(WaitQuery { wait: None }),
            Json(serde_json::Value::Null),
        )
        .await;
        assert!(result.is_err());
    }

    fn test_config() -> crate::config::Config {
        crate::config::Config {
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
}
