// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/v1/pty/*` handlers: thin JSON wrappers over `Fleet`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::psm::ModeState;
use crate::transport::state::AppState;
use crate::validate;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub task_id: String,
    pub cwd: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub success: bool,
    pub running: bool,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRequest>,
) -> Result<Json<CreateResponse>, ApiError> {
    let cwd = validate::absolute_path(&req.cwd)?;
    let outcome = state.fleet.create(&req.task_id, &cwd, req.env, req.cols, req.rows).await?;
    Ok(Json(CreateResponse { success: outcome.created, running: outcome.running }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskIdRequest {
    pub task_id: String,
}

pub async fn list_sessions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sessions = state.fleet.list_sessions().await;
    Json(serde_json::json!({ "success": true, "sessions": sessions }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRequest {
    pub task_id: String,
    pub subscriber_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachResponse {
    pub success: bool,
    pub buffer: String,
    pub mode_state: ModeState,
}

pub async fn attach(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AttachRequest>,
) -> Result<Json<AttachResponse>, ApiError> {
    let (buffer, mode_state) = state.fleet.attach(&req.task_id, &req.subscriber_id).await?;
    Ok(Json(AttachResponse {
        success: true,
        buffer: base64::engine::general_purpose::STANDARD.encode(buffer),
        mode_state,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachRequest {
    pub task_id: String,
    pub subscriber_id: String,
}

pub async fn detach(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DetachRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.fleet.detach(&req.task_id, &req.subscriber_id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    pub task_id: String,
    /// Base64-encoded raw bytes, since PTY input is not guaranteed UTF-8.
    pub data: String,
}

pub async fn write(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WriteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(req.data)
        .map_err(|e| ApiError::Validation(format!("invalid base64 data: {e}")))?;
    state.fleet.write(&req.task_id, &bytes).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeRequest {
    pub task_id: String,
    pub cols: u16,
    pub rows: u16,
}

pub async fn resize(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResizeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.fleet.resize(&req.task_id, req.cols, req.rows).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn destroy(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TaskIdRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.fleet.destroy(&req.task_id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
