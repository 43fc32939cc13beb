// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event bus: typed events published by PS/PSM/WM, fanned out to the
//! Control Daemon's SSE stream by a single broadcast channel.
//!
//! Rather than callbacks crossing component boundaries, components publish
//! to this bus; the Control Daemon is the only consumer that serializes it.

use serde::Serialize;
use serde_json::Value;

use crate::psm::ModeState;

/// A fleet-level event, always scoped to a `taskId`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetEvent {
    #[serde(rename = "pty.started")]
    #[serde(rename_all = "camelCase")]
    PtyStarted { task_id: String, pid: Option<i32> },
    #[serde(rename = "pty.state")]
    #[serde(rename_all = "camelCase")]
    PtyState { task_id: String, running: bool },
    #[serde(rename = "pty.activity")]
    #[serde(rename_all = "camelCase")]
    PtyActivity { task_id: String },
    #[serde(rename = "pty.data")]
    #[serde(rename_all = "camelCase")]
    PtyData {
        task_id: String,
        offset: u64,
        #[serde(skip_serializing)]
        data: bytes::Bytes,
    },
    #[serde(rename = "pty.mode")]
    #[serde(rename_all = "camelCase")]
    PtyMode { task_id: String, mode: ModeState },
    #[serde(rename = "pty.blocked")]
    #[serde(rename_all = "camelCase")]
    PtyBlocked {
        task_id: String,
        is_blocked: bool,
        blocked_reason: Option<String>,
    },
    #[serde(rename = "pty.exit")]
    #[serde(rename_all = "camelCase")]
    PtyExit {
        task_id: String,
        exit_code: Option<i32>,
        exit_signal: Option<i32>,
        reason: Option<String>,
    },
    #[serde(rename = "pty.destroyed")]
    #[serde(rename_all = "camelCase")]
    PtyDestroyed { task_id: String },
    /// A `todos`/`message`/`usage` callback the agent posted to the
    /// Approval Gateway, forwarded here for the operator surface.
    #[serde(rename = "agent.notification")]
    #[serde(rename_all = "camelCase")]
    AgentNotification {
        task_id: String,
        action: String,
        payload: Value,
    },
    /// A `merge` callback created an approval request awaiting an
    /// operator decision.
    #[serde(rename = "approval.pending")]
    #[serde(rename_all = "camelCase")]
    ApprovalPending { task_id: String, request_id: String, action: String },
    /// An approval request was resolved, approved or not.
    #[serde(rename = "approval.resolved")]
    #[serde(rename_all = "camelCase")]
    ApprovalResolved {
        task_id: String,
        request_id: String,
        approved: bool,
    },
}

impl FleetEvent {
    /// The SSE `type` dot-path, e.g. `"pty.started"`.
    pub fn type_name(&self) -> &'static str {
        match self {
            FleetEvent::PtyStarted { .. } => "pty.started",
            FleetEvent::PtyState { .. } => "pty.state",
            FleetEvent::PtyActivity { .. } => "pty.activity",
            FleetEvent::PtyData { .. } => "pty.data",
            FleetEvent::PtyMode { .. } => "pty.mode",
            FleetEvent::PtyBlocked { .. } => "pty.blocked",
            FleetEvent::PtyExit { .. } => "pty.exit",
            FleetEvent::PtyDestroyed { .. } => "pty.destroyed",
            FleetEvent::AgentNotification { .. } => "agent.notification",
            FleetEvent::ApprovalPending { .. } => "approval.pending",
            FleetEvent::ApprovalResolved { .. } => "approval.resolved",
        }
    }

    /// Payload as a JSON value for the SSE envelope. `pty.data`'s raw bytes
    /// are lossily decoded for transport; binary-unsafe clients should use
    /// `/v1/pty/attach` to fetch exact bytes instead.
    pub fn payload(&self) -> Value {
        match self {
            FleetEvent::PtyData { task_id, offset, data } => serde_json::json!({
                "taskId": task_id,
                "offset": offset,
                "data": String::from_utf8_lossy(data),
            }),
            other => serde_json::to_value(other).unwrap_or(Value::Null),
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            FleetEvent::PtyStarted { task_id, .. }
            | FleetEvent::PtyState { task_id, .. }
            | FleetEvent::PtyActivity { task_id, .. }
            | FleetEvent::PtyData { task_id, .. }
            | FleetEvent::PtyMode { task_id, .. }
            | FleetEvent::PtyBlocked { task_id, .. }
            | FleetEvent::PtyExit { task_id, .. }
            | FleetEvent::PtyDestroyed { task_id, .. }
            | FleetEvent::AgentNotification { task_id, .. }
            | FleetEvent::ApprovalPending { task_id, .. }
            | FleetEvent::ApprovalResolved { task_id, .. } => task_id,
        }
    }
}
