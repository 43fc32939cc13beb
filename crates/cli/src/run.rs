// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level daemon runner: resolves shared state, binds both loopback
//! listeners, and runs the Control Daemon and Approval Gateway
//! concurrently until either exits or the process receives a shutdown
//! signal.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::approval::server::build_agent_router;
use crate::approval::ApprovalStore;
use crate::config::Config;
use crate::fleet::Fleet;
use crate::token;
use crate::transport::build_core_router;
use crate::transport::state::{AgentState, AppState};

pub struct RunResult {
    pub exit_code: i32,
}

pub async fn run(config: Config) -> anyhow::Result<RunResult> {
    let config = Arc::new(config);

    let (auth_token, token_source) = token::resolve(config.token.as_deref(), &config.token_file_path())?;

    let fleet = Arc::new(Fleet::new(config.max_pty_sessions, config.ring_size, config.max_pty_write_bytes));

    let approvals_path = std::env::var("HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("."))
        .join(".forkline")
        .join("approvals.json");
    let approvals = Arc::new(ApprovalStore::load(approvals_path, config.approval_retention_days).await?);

    let core_state = Arc::new(AppState::new(Arc::clone(&fleet), Arc::clone(&config), auth_token.clone()));
    let agent_state =
        Arc::new(AgentState::new(approvals, Arc::clone(&config), auth_token, fleet.event_sender()));

    let core_router = build_core_router(core_state);
    let agent_router = build_agent_router(agent_state);

    let core_listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let agent_listener = TcpListener::bind((config.host.as_str(), config.agent_port)).await?;

    println!(
        "forkline listening on {}:{} (agent {}:{}), token {}",
        config.host,
        config.port,
        config.host,
        config.agent_port,
        token_source.as_str()
    );
    info!(host = %config.host, port = config.port, agent_port = config.agent_port, "forkline starting");

    let shutdown = tokio::signal::ctrl_c();

    tokio::select! {
        result = axum::serve(
            core_listener,
            core_router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        ) => {
            if let Err(e) = result {
                error!(error = %e, "control daemon server error");
            }
        }
        result = axum::serve(
            agent_listener,
            agent_router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        ) => {
            if let Err(e) = result {
                error!(error = %e, "agent control api server error");
            }
        }
        _ = shutdown => {
            info!("received shutdown signal");
        }
    }

    Ok(RunResult { exit_code: 0 })
}
