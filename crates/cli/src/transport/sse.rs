// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GET /v1/events`: fans the fleet's single broadcast bus out to SSE
//! clients as an ordered `{id, ts, type, payload}` envelope. No backfill —
//! clients reconcile state via `/v1/pty/sessions`.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::stream::{Stream, StreamExt};
use rand::Rng;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::ApiError;
use crate::transport::state::{release_sse_slot, try_acquire_sse_slot, AppState};

static EVENT_SEQ: AtomicU32 = AtomicU32::new(0);

fn next_event_id() -> String {
    let ts = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
    let seq = EVENT_SEQ.fetch_add(1, Ordering::Relaxed);
    let salt: u32 = rand::rng().random();
    format!("{ts}-{seq:x}{salt:x}")
}

pub async fn events(State(state): State<Arc<AppState>>) -> axum::response::Response {
    if !try_acquire_sse_slot(&state) {
        return ApiError::RateLimited.into_response();
    }

    let rx = state.fleet.subscribe();
    let state_for_drop = Arc::clone(&state);
    let stream = BroadcastStream::new(rx).filter_map(move |item| {
        let event = match item {
            Ok(event) => event,
            Err(_lagged) => return std::future::ready(None),
        };
        tracing::debug!(task_id = event.task_id(), event = event.type_name(), "relaying fleet event to SSE client");
        let envelope = serde_json::json!({
            "id": next_event_id(),
            "ts": SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0),
            "type": event.type_name(),
            "payload": event.payload(),
        });
        std::future::ready(Some(Ok::<Event, Infallible>(
            Event::default().data(envelope.to_string()),
        )))
    });

    let guarded = GuardedStream {
        inner: Box::pin(stream),
        _guard: SseSlotGuard(state_for_drop),
    };
    Sse::new(guarded).keep_alive(KeepAlive::default()).into_response()
}

/// Releases this client's SSE slot when the stream (and thus the
/// connection) is dropped, regardless of how it ends.
struct SseSlotGuard(Arc<AppState>);

impl Drop for SseSlotGuard {
    fn drop(&mut self) {
        release_sse_slot(&self.0);
    }
}

/// Wraps the event stream with a slot-release guard. `inner` is already
/// heap-pinned, and `_guard` holds no self-referential state, so the whole
/// struct is `Unpin` and needs no pin-projection machinery.
struct GuardedStream {
    inner: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>,
    _guard: SseSlotGuard,
}

impl Stream for GuardedStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}
