// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Approval Gateway persistence: a file-backed store of `ApprovalRequest`
//! records keyed by `requestId`, surviving restart.
//!
//! Follows a create-pending → notify → externally-resolved →
//! unblock-waiter pattern, backed by a persistent store rather than an
//! in-memory one so pending requests survive a daemon restart.

pub mod server;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};

/// Upper bound on retained records regardless of age ("bounded by
/// count").
const MAX_RECORDS: usize = 5000;

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

static REQUEST_SEQ: AtomicU32 = AtomicU32::new(0);

/// `requestId` is time-sorted: a millisecond timestamp prefix (so
/// lexicographic order matches creation order) followed by a monotonic
/// sequence and a random salt to break ties within the same
/// millisecond, same scheme as the SSE envelope's `id` (`transport/sse.rs`).
fn new_request_id() -> String {
    let ts = now_millis();
    let seq = REQUEST_SEQ.fetch_add(1, Ordering::Relaxed);
    let salt: u32 = rand::rng().random();
    format!("{ts:016x}-{seq:x}{salt:x}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub request_id: String,
    pub task_id: String,
    pub action: String,
    pub payload: serde_json::Value,
    pub status: ApprovalStatus,
    pub decision: Option<serde_json::Value>,
    pub decided_by: Option<String>,
    pub created_at: u64,
    pub resolved_at: Option<u64>,
    pub deadline_at: u64,
}

struct StoreInner {
    requests: HashMap<String, ApprovalRequest>,
    waiters: HashMap<String, Vec<oneshot::Sender<ApprovalRequest>>>,
}

pub struct ApprovalStore {
    path: PathBuf,
    retention: Duration,
    inner: Mutex<StoreInner>,
}

impl ApprovalStore {
    /// Loads the store from `path` if present, sweeping already-expired
    /// pending records to `Expired` before returning.
    pub async fn load(path: PathBuf, retention_days: u64) -> std::io::Result<Self> {
        let requests = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let records: Vec<ApprovalRequest> = serde_json::from_str(&contents).unwrap_or_default();
                records.into_iter().map(|r| (r.request_id.clone(), r)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e),
        };

        let store = ApprovalStore {
            path,
            retention: Duration::from_secs(retention_days * 86_400),
            inner: Mutex::new(StoreInner { requests, waiters: HashMap::new() }),
        };
        store.sweep().await;
        Ok(store)
    }

    /// Sweeps expired pending records to `Expired` and prunes retention.
    /// Called at startup; also safe to call periodically.
    pub async fn sweep(&self) {
        let now = now_millis();
        let mut inner = self.inner.lock().await;
        let retention_ms = self.retention.as_millis() as u64;

        for req in inner.requests.values_mut() {
            if req.status == ApprovalStatus::Pending && req.deadline_at <= now {
                req.status = ApprovalStatus::Expired;
                req.resolved_at = Some(now);
            }
        }

        inner.requests.retain(|_, r| match r.resolved_at {
            Some(resolved) => now.saturating_sub(resolved) < retention_ms,
            None => true,
        });

        if inner.requests.len() > MAX_RECORDS {
            let mut by_age: Vec<(String, u64)> =
                inner.requests.iter().map(|(id, r)| (id.clone(), r.created_at)).collect();
            by_age.sort_by_key(|(_, created_at)| *created_at);
            let overflow = inner.requests.len() - MAX_RECORDS;
            for (id, _) in by_age.into_iter().take(overflow) {
                inner.requests.remove(&id);
            }
        }

        drop(inner);
        self.persist().await;
    }

    /// Creates a new `pending` record and persists it before returning.
    pub async fn create(
        &self,
        task_id: &str,
        action: &str,
        payload: serde_json::Value,
        wait_secs: u64,
    ) -> ApprovalRequest {
        let now = now_millis();
        let request = ApprovalRequest {
            request_id: new_request_id(),
            task_id: task_id.to_string(),
            action: action.to_string(),
            payload,
            status: ApprovalStatus::Pending,
            decision: None,
            decided_by: None,
            created_at: now,
            resolved_at: None,
            deadline_at: now + wait_secs * 1000,
        };

        {
            let mut inner = self.inner.lock().await;
            inner.requests.insert(request.request_id.clone(), request.clone());
        }
        self.persist().await;
        request
    }

    pub async fn get(&self, request_id: &str) -> Option<ApprovalRequest> {
        self.inner.lock().await.requests.get(request_id).cloned()
    }

    /// Resolves a pending request, persists the change, and wakes any
    /// `wait=1` long-poll responders blocked on it.
    pub async fn resolve(
        &self,
        request_id: &str,
        approved: bool,
        decision: Option<serde_json::Value>,
        decided_by: Option<String>,
    ) -> Option<ApprovalRequest> {
        let (resolved, waiters) = {
            let mut inner = self.inner.lock().await;
            let req = inner.requests.get_mut(request_id)?;
            if req.status != ApprovalStatus::Pending {
                return Some(req.clone());
            }
            req.status = if approved { ApprovalStatus::Approved } else { ApprovalStatus::Rejected };
            req.decision = decision;
            req.decided_by = decided_by;
            req.resolved_at = Some(now_millis());
            let resolved = req.clone();
            let waiters = inner.waiters.remove(request_id).unwrap_or_default();
            (resolved, waiters)
        };
        self.persist().await;
        for waiter in waiters {
            let _ = waiter.send(resolved.clone());
        }
        Some(resolved)
    }

    /// Blocks until `request_id` resolves or `timeout` elapses. Returns
    /// `None` on timeout (caller responds 408) or if the record never
    /// transitions before the channel is dropped.
    pub async fn wait(&self, request_id: &str, timeout: Duration) -> Option<ApprovalRequest> {
        {
            let inner = self.inner.lock().await;
            if let Some(req) = inner.requests.get(request_id) {
                if req.status != ApprovalStatus::Pending {
                    return Some(req.clone());
                }
            } else {
                return None;
            }
        }

        let rx = {
            let mut inner = self.inner.lock().await;
            let (tx, rx) = oneshot::channel();
            inner.waiters.entry(request_id.to_string()).or_default().push(tx);
            rx
        };

        tokio::time::timeout(timeout, rx).await.ok().and_then(|r| r.ok())
    }

    /// Atomic replace-file write: `.tmp` sibling, fsync, rename.
    async fn persist(&self) {
        let records: Vec<ApprovalRequest> = self.inner.lock().await.requests.values().cloned().collect();
        if let Err(e) = write_atomic(&self.path, &records).await {
            tracing::warn!(error = %e, "failed to persist approval store");
        }
    }
}

async fn write_atomic(path: &Path, records: &[ApprovalRequest]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(records).unwrap_or_default();
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, &body).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn create_then_resolve_round_trips() {
        let dir = tempdir().unwrap();
        let store = ApprovalStore::load(dir.path().join("approvals.json"), 7).await.unwrap();

        let request = store.create("task-1", "merge", serde_json::json!({"branch": "x"}), 600).await;
        assert_eq!(request.status, ApprovalStatus::Pending);

        let resolved =
            store.resolve(&request.request_id, true, Some(serde_json::json!({"ok": true})), None).await;
        assert!(matches!(resolved, Some(r) if r.status == ApprovalStatus::Approved));
    }

    #[tokio::test]
    async fn reload_recovers_persisted_pending_requests() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("approvals.json");
        let store = ApprovalStore::load(path.clone(), 7).await.unwrap();
        let request = store.create("task-1", "merge", serde_json::Value::Null, 600).await;

        let reloaded = ApprovalStore::load(path, 7).await.unwrap();
        let fetched = reloaded.get(&request.request_id).await;
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn sweep_expires_stale_pending_requests_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("approvals.json");
        let expired = ApprovalRequest {
            request_id: "r1".to_string(),
            task_id: "task-1".to_string(),
            action: "merge".to_string(),
            payload: serde_json::Value::Null,
            status: ApprovalStatus::Pending,
            decision: None,
            decided_by: None,
            created_at: 0,
            resolved_at: None,
            deadline_at: 1,
        };
        write_atomic(&path, &[expired]).await.unwrap();

        let store = ApprovalStore::load(path, 7).await.unwrap();
        let fetched = store.get("r1").await.unwrap();
        assert_eq!(fetched.status, ApprovalStatus::Expired);
    }

    #[tokio::test]
    async fn wait_returns_resolution_once_resolved_concurrently() {
        let dir = tempdir().unwrap();
        let store = Arc::new(ApprovalStore::load(dir.path().join("approvals.json"), 7).await.unwrap());
        let request = store.create("task-1", "merge", serde_json::Value::Null, 600).await;

        let waiter_store = Arc::clone(&store);
        let request_id = request.request_id.clone();
        let waiter = tokio::spawn(async move {
            waiter_store.wait(&request_id, Duration::from_secs(5)).await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        store.resolve(&request.request_id, true, None, None).await;

        let result = waiter.await.unwrap();
        assert!(matches!(result, Some(r) if r.status == ApprovalStatus::Approved));
    }

    use std::sync::Arc;
}
