// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-remote-address rolling-window rate limiter for the security
//! perimeter. Guarded by a plain mutex (not `tokio::sync::Mutex`): the
//! critical section never awaits, so a blocking lock is both correct and
//! cheaper — no yield to the scheduler for a handful of arithmetic ops.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

struct Counter {
    window_start: Instant,
    count: u32,
}

/// Fixed-window counter per remote address. Not as precise as a sliding
/// log, but good enough for a rolling-window limit without retaining a
/// timestamp per request.
pub struct RateLimiter {
    per_minute: u32,
    counters: Mutex<HashMap<IpAddr, Counter>>,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        RateLimiter { per_minute, counters: Mutex::new(HashMap::new()) }
    }

    /// Returns `true` if `addr` is still within its budget for the current
    /// window, incrementing its count as a side effect.
    pub fn check(&self, addr: IpAddr) -> bool {
        let now = Instant::now();
        let mut counters = self.counters.lock();
        let entry = counters.entry(addr).or_insert(Counter { window_start: now, count: 0 });

        if now.duration_since(entry.window_start) >= WINDOW {
            entry.window_start = now;
            entry.count = 0;
        }

        entry.count += 1;
        entry.count <= self.per_minute
    }

    /// Drops idle entries whose window has long since expired. Not
    /// required for correctness — bounds memory growth over a
    /// long-lived daemon serving many distinct remotes.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut counters = self.counters.lock();
        counters.retain(|_, c| now.duration_since(c.window_start) < WINDOW * 10);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_within_budget() {
        let limiter = RateLimiter::new(3);
        let addr: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(addr));
        assert!(limiter.check(addr));
        assert!(limiter.check(addr));
        assert!(!limiter.check(addr));
    }

    #[test]
    fn tracks_distinct_remotes_independently() {
        let limiter = RateLimiter::new(1);
        let a: IpAddr = "127.0.0.1".parse().unwrap();
        let b: IpAddr = "127.0.0.2".parse().unwrap();
        assert!(limiter.check(a));
        assert!(limiter.check(b));
        assert!(!limiter.check(a));
    }
}
