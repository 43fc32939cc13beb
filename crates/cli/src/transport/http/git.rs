// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/v1/git/*` handlers: thin JSON wrappers over the Worktree Manager.
//!
//! WM operations never throw across the boundary — a git
//! failure comes back as 200 `{success:false, error}`, not an HTTP error
//! status. HTTP error statuses here are reserved for malformed requests
//! (bad path syntax), which `validate::absolute_path` catches before WM
//! ever runs.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::transport::state::AppState;
use crate::validate;
use crate::worktree;

#[derive(Debug, Deserialize)]
pub struct PathRequest {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateSourceResponse {
    pub success: bool,
    #[serde(flatten)]
    pub result: worktree::ValidateSourceResult,
}

pub async fn validate_source(
    State(_state): State<Arc<AppState>>,
    Json(req): Json<PathRequest>,
) -> Result<Json<ValidateSourceResponse>, ApiError> {
    let path = validate::absolute_path(&req.path)?;
    let result = worktree::validate_source(&path).await;
    Ok(Json(ValidateSourceResponse { success: true, result }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorktreeRequest {
    pub base_path: String,
    pub task_name: String,
    #[serde(default)]
    pub base_branch: Option<String>,
    #[serde(default)]
    pub dependency_bootstrap: bool,
}

pub async fn create_worktree(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateWorktreeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let base_path = validate::absolute_path(&req.base_path)?;
    let clone_source = if req.dependency_bootstrap {
        Some((worktree::CloneMode::CopyOnWrite, base_path.as_path()))
    } else {
        None
    };
    let result = worktree::create_worktree(
        &base_path,
        &req.task_name,
        req.base_branch.as_deref(),
        clone_source,
        state.config.worktree_root.as_deref(),
    )
    .await;
    Ok(Json(serde_json::to_value(result).unwrap_or(serde_json::Value::Null)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasePathRequest {
    pub base_path: String,
}

pub async fn list_worktrees(
    State(_state): State<Arc<AppState>>,
    Json(req): Json<BasePathRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let base_path = validate::absolute_path(&req.base_path)?;
    match worktree::list_worktrees(&base_path).await {
        Ok(worktrees) => Ok(Json(serde_json::json!({ "success": true, "worktrees": worktrees }))),
        Err(e) => Ok(Json(serde_json::json!({ "success": false, "error": e.to_string() }))),
    }
}

pub async fn list_branches(
    State(_state): State<Arc<AppState>>,
    Json(req): Json<BasePathRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let base_path = validate::absolute_path(&req.base_path)?;
    match worktree::list_branches(&base_path).await {
        Ok(branches) => Ok(Json(serde_json::json!({ "success": true, "branches": branches }))),
        Err(e) => Ok(Json(serde_json::json!({ "success": false, "error": e.to_string() }))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveWorktreeRequest {
    pub base_path: String,
    pub task_name: String,
    pub worktree_path: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct OpResponse {
    pub success: bool,
    pub error: Option<String>,
}

pub async fn remove_worktree(
    State(_state): State<Arc<AppState>>,
    Json(req): Json<RemoveWorktreeRequest>,
) -> Result<Json<OpResponse>, ApiError> {
    let base_path = validate::absolute_path(&req.base_path)?;
    let worktree_path = validate::absolute_path(&req.worktree_path)?;
    let result = worktree::remove_worktree(&base_path, &req.task_name, &worktree_path, req.force).await;
    Ok(Json(OpResponse { success: result.success, error: result.error }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeWorktreeRequest {
    pub base_path: String,
    pub task_name: String,
    pub worktree_path: String,
}

pub async fn merge_worktree(
    State(_state): State<Arc<AppState>>,
    Json(req): Json<MergeWorktreeRequest>,
) -> Result<Json<OpResponse>, ApiError> {
    let base_path = validate::absolute_path(&req.base_path)?;
    let worktree_path = validate::absolute_path(&req.worktree_path)?;
    let result = worktree::merge_worktree(&base_path, &req.task_name, &worktree_path).await;
    Ok(Json(OpResponse { success: result.success, error: result.error }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRequest {
    pub worktree_path: String,
    #[serde(default)]
    pub syntax_aware: bool,
}

pub async fn diff(
    State(_state): State<Arc<AppState>>,
    Json(req): Json<DiffRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let worktree_path = validate::absolute_path(&req.worktree_path)?;
    match worktree::get_diff(&worktree_path, req.syntax_aware).await {
        Ok(result) => Ok(Json(serde_json::json!({ "success": true, "diff": result.diff }))),
        Err(e) => Ok(Json(serde_json::json!({ "success": false, "error": e.to_string() }))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedFilesRequest {
    pub worktree_path: String,
}

pub async fn modified_files(
    State(_state): State<Arc<AppState>>,
    Json(req): Json<ModifiedFilesRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let worktree_path = validate::absolute_path(&req.worktree_path)?;
    let files = worktree::get_modified_files(&worktree_path).await;
    Ok(Json(serde_json::json!({ "success": true, "files": files })))
}
