// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One fleet entry: everything owned for a single live (or just-exited)
//! PTY session, plus the supervising task that pumps its output.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::events::FleetEvent;
use crate::psm::{ModeState, Psm};
use crate::pty::spawn::{wait_for_exit, NativePty};
use crate::ring::RingBuffer;

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// A live (or just-exited, not yet destroyed) PTY session.
pub struct FleetEntry {
    pub task_id: String,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub created_at: u64,
    pub last_activity_at: AtomicU64,
    pub running: AtomicBool,
    pub pid: AtomicI32,
    pub cols: AtomicU16,
    pub rows: AtomicU16,
    pub exit_code: Mutex<Option<i32>>,
    pub exit_signal: Mutex<Option<i32>>,
    pub allocated_port: u16,

    pub(super) ring: RwLock<RingBuffer>,
    pub(super) psm: Mutex<Psm>,
    pub(super) pty: Mutex<Option<Arc<NativePty>>>,
    pub(super) subscribers: Mutex<HashSet<String>>,
    pub(super) cancel: CancellationToken,
    pub(super) max_write_bytes: usize,
}

/// Snapshot returned by `listSessions`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub task_id: String,
    pub cwd: String,
    pub pid: Option<i32>,
    pub created_at: u64,
    pub last_activity_at: u64,
    pub running: bool,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
    pub cols: u16,
    pub rows: u16,
    pub tail_preview: Vec<String>,
    pub allocated_port: u16,
    pub mode_state: ModeState,
}

impl FleetEntry {
    pub fn new(
        task_id: String,
        cwd: PathBuf,
        env: HashMap<String, String>,
        cols: u16,
        rows: u16,
        allocated_port: u16,
        ring_size: usize,
        max_write_bytes: usize,
    ) -> Self {
        let now = now_millis();
        FleetEntry {
            task_id,
            cwd,
            env,
            created_at: now,
            last_activity_at: AtomicU64::new(now),
            running: AtomicBool::new(false),
            pid: AtomicI32::new(0),
            cols: AtomicU16::new(cols),
            rows: AtomicU16::new(rows),
            exit_code: Mutex::new(None),
            exit_signal: Mutex::new(None),
            allocated_port,
            ring: RwLock::new(RingBuffer::new(ring_size)),
            psm: Mutex::new(Psm::new()),
            pty: Mutex::new(None),
            subscribers: Mutex::new(HashSet::new()),
            cancel: CancellationToken::new(),
            max_write_bytes,
        }
    }

    fn touch(&self) {
        self.last_activity_at.store(now_millis(), Ordering::Relaxed);
    }

    pub async fn mode_state(&self) -> ModeState {
        self.psm.lock().await.current()
    }

    /// Delivers the entire ring buffer once, per `attach` semantics.
    pub async fn attach(&self, subscriber_id: &str) -> (Vec<u8>, ModeState) {
        self.subscribers.lock().await.insert(subscriber_id.to_string());
        let ring = self.ring.read().await;
        let (a, b) = ring.read_from(0).unwrap_or((&[], &[]));
        let buf = [a, b].concat();
        drop(ring);
        (buf, self.mode_state().await)
    }

    /// Idempotent: detaching a subscriber id that is not attached is a no-op.
    pub async fn detach(&self, subscriber_id: &str) {
        self.subscribers.lock().await.remove(subscriber_id);
    }

    pub async fn write_input(&self, data: &[u8]) -> Result<(), WriteError> {
        if data.len() > self.max_write_bytes {
            return Err(WriteError::TooLarge);
        }
        let guard = self.pty.lock().await;
        let pty = guard.as_ref().ok_or(WriteError::NotRunning)?;
        if !self.running.load(Ordering::Acquire) {
            return Err(WriteError::NotRunning);
        }
        pty.write_all(data).await.map_err(|_| WriteError::NotRunning)?;
        drop(guard);
        self.touch();
        self.psm.lock().await.consume_input(data);
        Ok(())
    }

    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), WriteError> {
        let guard = self.pty.lock().await;
        let pty = guard.as_ref().ok_or(WriteError::NotRunning)?;
        pty.resize(cols, rows).map_err(|_| WriteError::NotRunning)?;
        self.cols.store(cols, Ordering::Relaxed);
        self.rows.store(rows, Ordering::Relaxed);
        Ok(())
    }

    /// Last up-to-3 non-empty normalized lines of output, for `listSessions`.
    pub async fn tail_preview(&self) -> Vec<String> {
        let ring = self.ring.read().await;
        let (a, b) = ring.read_from(0).unwrap_or((&[], &[]));
        let combined = [a, b].concat();
        drop(ring);
        let text = String::from_utf8_lossy(&combined);
        text.lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .rev()
            .take(3)
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    pub async fn summary(&self) -> SessionSummary {
        SessionSummary {
            task_id: self.task_id.clone(),
            cwd: self.cwd.to_string_lossy().to_string(),
            pid: {
                let p = self.pid.load(Ordering::Acquire);
                if p == 0 {
                    None
                } else {
                    Some(p)
                }
            },
            created_at: self.created_at,
            last_activity_at: self.last_activity_at.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Acquire),
            exit_code: *self.exit_code.lock().await,
            exit_signal: *self.exit_signal.lock().await,
            cols: self.cols.load(Ordering::Relaxed),
            rows: self.rows.load(Ordering::Relaxed),
            tail_preview: self.tail_preview().await,
            allocated_port: self.allocated_port,
            mode_state: self.mode_state().await,
        }
    }

    /// Stops the supervising task and sends SIGTERM/SIGKILL to the child.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    NotRunning,
    TooLarge,
}

/// Spawns the supervising task: runs the child, pumps output into the ring
/// buffer and PSM, and emits fleet events until the child exits or the
/// entry is cancelled.
pub fn spawn_supervisor(
    entry: Arc<FleetEntry>,
    pty: Arc<NativePty>,
    events: broadcast::Sender<FleetEvent>,
) {
    let pid = pty.child_pid();
    entry.pid.store(pid, Ordering::Release);
    entry.running.store(true, Ordering::Release);

    tokio::spawn(async move {
        *entry.pty.lock().await = Some(Arc::clone(&pty));
        let _ = events.send(FleetEvent::PtyStarted { task_id: entry.task_id.clone(), pid: Some(pid) });

        let mut buf = vec![0u8; 8192];
        let cancel = entry.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                read = pty.read_chunk(&mut buf) => {
                    match read {
                        Ok(0) => break,
                        Ok(n) => {
                            let chunk = Bytes::copy_from_slice(&buf[..n]);
                            entry.last_activity_at.store(now_millis(), Ordering::Relaxed);
                            let offset = {
                                let mut ring = entry.ring.write().await;
                                ring.write(&chunk);
                                ring.total_written()
                            };
                            let _ = events.send(FleetEvent::PtyActivity { task_id: entry.task_id.clone() });
                            let mode_before = entry.psm.lock().await.current();
                            let mode_after = entry.psm.lock().await.consume_output(&chunk);
                            let _ = events.send(FleetEvent::PtyData {
                                task_id: entry.task_id.clone(),
                                offset,
                                data: chunk,
                            });
                            if mode_after.mode_seq != mode_before.mode_seq {
                                let _ = events.send(FleetEvent::PtyMode {
                                    task_id: entry.task_id.clone(),
                                    mode: mode_after.clone(),
                                });
                                if mode_after.is_blocked != mode_before.is_blocked {
                                    let _ = events.send(FleetEvent::PtyBlocked {
                                        task_id: entry.task_id.clone(),
                                        is_blocked: mode_after.is_blocked,
                                        blocked_reason: mode_after.blocked_reason.clone(),
                                    });
                                }
                            }
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        let pid_for_wait = pty.child_pid();
        let (code, signal) = tokio::task::spawn_blocking(move || {
            wait_for_exit(nix::unistd::Pid::from_raw(pid_for_wait))
        })
        .await
        .unwrap_or((None, None));

        entry.running.store(false, Ordering::Release);
        *entry.exit_code.lock().await = code;
        *entry.exit_signal.lock().await = signal;
        *entry.pty.lock().await = None;

        let mode = entry.psm.lock().await.consume_exit(code, signal);
        let _ = events.send(FleetEvent::PtyMode { task_id: entry.task_id.clone(), mode });
        let _ = events.send(FleetEvent::PtyState { task_id: entry.task_id.clone(), running: false });
        let _ = events.send(FleetEvent::PtyExit {
            task_id: entry.task_id.clone(),
            exit_code: code,
            exit_signal: signal,
            reason: None,
        });
    });
}
