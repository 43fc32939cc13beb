// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY Supervisor: owns the fleet of live PTY children, keyed by `taskId`.
//!
//! A table of independently supervised entries, each following the same
//! spawn → pump-output → reap-exit shape.

pub mod entry;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::error::ApiError;
use crate::events::FleetEvent;
use crate::psm::ModeState;
use crate::pty::spawn::{sanitize_env, NativePty};
use crate::validate;

pub use entry::{FleetEntry, SessionSummary, WriteError};

const DYNAMIC_PORT_BASE: u16 = 20000;
const DYNAMIC_PORT_RANGE: u16 = 20000;

/// The fleet of live sessions, plus the resource limits that bound it.
pub struct Fleet {
    sessions: RwLock<HashMap<String, Arc<FleetEntry>>>,
    events: broadcast::Sender<FleetEvent>,
    max_sessions: usize,
    ring_size: usize,
    max_write_bytes: usize,
    next_port: AtomicU16,
}

pub struct CreateOutcome {
    pub created: bool,
    pub running: bool,
}

impl Fleet {
    pub fn new(max_sessions: usize, ring_size: usize, max_write_bytes: usize) -> Self {
        let (tx, _rx) = broadcast::channel(4096);
        Fleet {
            sessions: RwLock::new(HashMap::new()),
            events: tx,
            max_sessions,
            ring_size,
            max_write_bytes,
            next_port: AtomicU16::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.events.subscribe()
    }

    /// The fan-out sender backing [`subscribe`](Self::subscribe). Lets
    /// other in-process components (the Approval Gateway, notably) publish
    /// onto the same bus the Control Daemon's SSE stream drains, rather
    /// than opening a second channel.
    pub fn event_sender(&self) -> broadcast::Sender<FleetEvent> {
        self.events.clone()
    }

    fn allocate_port(&self) -> u16 {
        let slot = self.next_port.fetch_add(1, Ordering::Relaxed) % DYNAMIC_PORT_RANGE;
        DYNAMIC_PORT_BASE + slot
    }

    /// `create(taskId, cwd, envOverrides, cols, rows)`.
    pub async fn create(
        &self,
        task_id: &str,
        cwd: &Path,
        env_overrides: HashMap<String, String>,
        cols: u16,
        rows: u16,
    ) -> Result<CreateOutcome, ApiError> {
        validate::task_id(task_id)?;
        let (cols, rows) = validate::pty_geometry(cols, rows)?;

        {
            let sessions = self.sessions.read().await;
            if sessions.contains_key(task_id) {
                return Err(ApiError::Conflict(format!("session already exists: {task_id}")));
            }
            if sessions.len() >= self.max_sessions {
                return Err(ApiError::CapacityExceeded("max_pty_sessions reached".to_string()));
            }
        }

        let allocated_port = self.allocate_port();
        let env = sanitize_env(&env_overrides, task_id, allocated_port);
        let shell = login_shell();

        let entry = Arc::new(FleetEntry::new(
            task_id.to_string(),
            cwd.to_path_buf(),
            env.clone(),
            cols,
            rows,
            allocated_port,
            self.ring_size,
            self.max_write_bytes,
        ));

        {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(task_id) {
                return Err(ApiError::Conflict(format!("session already exists: {task_id}")));
            }
            sessions.insert(task_id.to_string(), Arc::clone(&entry));
        }

        match NativePty::spawn(&shell, &[], cwd, &env, cols, rows) {
            Ok(pty) => {
                entry::spawn_supervisor(Arc::clone(&entry), Arc::new(pty), self.events.clone());
                // Grace window: a child that dies immediately (e.g. bad cwd)
                // is surfaced as running:false rather than a synchronous error.
                tokio::time::sleep(std::time::Duration::from_millis(80)).await;
                let running = entry.running.load(std::sync::atomic::Ordering::Acquire);
                Ok(CreateOutcome { created: true, running })
            }
            Err(e) => {
                let _ = self.events.send(FleetEvent::PtyExit {
                    task_id: task_id.to_string(),
                    exit_code: None,
                    exit_signal: None,
                    reason: Some(e.to_string()),
                });
                Ok(CreateOutcome { created: true, running: false })
            }
        }
    }

    pub async fn get(&self, task_id: &str) -> Result<Arc<FleetEntry>, ApiError> {
        self.sessions
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("no such session: {task_id}")))
    }

    pub async fn attach(&self, task_id: &str, subscriber_id: &str) -> Result<(Vec<u8>, ModeState), ApiError> {
        let entry = self.get(task_id).await?;
        Ok(entry.attach(subscriber_id).await)
    }

    pub async fn detach(&self, task_id: &str, subscriber_id: &str) -> Result<(), ApiError> {
        let entry = self.get(task_id).await?;
        entry.detach(subscriber_id).await;
        Ok(())
    }

    pub async fn write(&self, task_id: &str, data: &[u8]) -> Result<(), ApiError> {
        let entry = self.get(task_id).await?;
        entry.write_input(data).await.map_err(|e| match e {
            WriteError::NotRunning => ApiError::Conflict(format!("session not running: {task_id}")),
            WriteError::TooLarge => ApiError::PayloadTooLarge,
        })
    }

    pub async fn resize(&self, task_id: &str, cols: u16, rows: u16) -> Result<(), ApiError> {
        let (cols, rows) = validate::pty_geometry(cols, rows)?;
        let entry = self.get(task_id).await?;
        entry
            .resize(cols, rows)
            .await
            .map_err(|_| ApiError::Conflict(format!("session not running: {task_id}")))
    }

    /// SIGTERM then SIGKILL after a grace period; releases the allocated
    /// port and emits `pty.destroyed`.
    pub async fn destroy(&self, task_id: &str) -> Result<(), ApiError> {
        let entry = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(task_id).ok_or_else(|| ApiError::NotFound(format!("no such session: {task_id}")))?
        };

        if let Some(pty) = entry.pty.lock().await.clone() {
            let _ = pty.send_signal(nix::sys::signal::Signal::SIGTERM);
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            let _ = pty.send_signal(nix::sys::signal::Signal::SIGKILL);
        }
        entry.cancel();

        let _ = self.events.send(FleetEvent::PtyDestroyed { task_id: task_id.to_string() });
        Ok(())
    }

    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut out = Vec::with_capacity(sessions.len());
        for entry in sessions.values() {
            out.push(entry.summary().await);
        }
        out.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        out
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Resolves the login shell: `$SHELL`, falling back to `/bin/sh`.
fn login_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_rejects_invalid_task_id() {
        let fleet = Fleet::new(4, 4096, 1024);
        let result = fleet.create("has spaces", Path::new("/tmp"), HashMap::new(), 80, 24).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn destroy_unknown_session_returns_not_found() {
        let fleet = Fleet::new(4, 4096, 1024);
        let result = fleet.destroy("nope").await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
