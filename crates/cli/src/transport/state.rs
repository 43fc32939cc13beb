// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state passed to every handler via axum's `State`
//! extractor, organized by concern.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::approval::ApprovalStore;
use crate::config::Config;
use crate::events::FleetEvent;
use crate::fleet::Fleet;
use crate::transport::rate_limit::RateLimiter;

/// State shared by the Control Daemon's routes.
pub struct AppState {
    pub fleet: Arc<Fleet>,
    pub config: Arc<Config>,
    pub auth_token: String,
    pub rate_limiter: RateLimiter,
    pub sse_clients: AtomicUsize,
}

impl AppState {
    pub fn new(fleet: Arc<Fleet>, config: Arc<Config>, auth_token: String) -> Self {
        AppState {
            rate_limiter: RateLimiter::new(config.rate_limit_per_minute),
            fleet,
            config,
            auth_token,
            sse_clients: AtomicUsize::new(0),
        }
    }
}

/// State shared by the Approval Gateway's routes.
pub struct AgentState {
    pub approvals: Arc<ApprovalStore>,
    pub config: Arc<Config>,
    pub auth_token: String,
    pub rate_limiter: RateLimiter,
    /// The fleet's event bus, shared with the Control Daemon's SSE stream
    /// so agent callbacks reach the operator surface without a network
    /// hop (see `crate::fleet::Fleet::event_sender`).
    pub events: broadcast::Sender<FleetEvent>,
}

impl AgentState {
    pub fn new(
        approvals: Arc<ApprovalStore>,
        config: Arc<Config>,
        auth_token: String,
        events: broadcast::Sender<FleetEvent>,
    ) -> Self {
        AgentState {
            rate_limiter: RateLimiter::new(config.rate_limit_per_minute),
            approvals,
            config,
            auth_token,
            events,
        }
    }
}

/// Current SSE client count check, shared by the `/v1/events` handler.
pub fn try_acquire_sse_slot(state: &AppState) -> bool {
    let max = state.config.max_sse_clients;
    let mut current = state.sse_clients.load(Ordering::Acquire);
    loop {
        if current >= max {
            return false;
        }
        match state.sse_clients.compare_exchange_weak(
            current,
            current + 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return true,
            Err(observed) => current = observed,
        }
    }
}

pub fn release_sse_slot(state: &AppState) {
    state.sse_clients.fetch_sub(1, Ordering::AcqRel);
}
