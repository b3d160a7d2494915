//! Rate limiter (C4).
//!
//! Fixed-window counter, generalizing the INCR-then-EXPIRE shape of a
//! Redis-backed limiter into an in-process, per-tenant counter map: each
//! tenant engine owns one `RateLimiter`, so there is no cross-tenant
//! contention and no external backend to provision.
//!
//! "Atomic" per the design means concurrent requests against the same
//! `(endpoint, window)` key can never both observe `count == limit - 1`
//! and both succeed. `dashmap`'s per-shard entry lock gives us that: the
//! read-or-reject-or-increment decision happens while holding the entry,
//! never as a separate read followed by a separate write.

use crate::ids::EndpointId;
use dashmap::DashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CounterKey {
    endpoint_id: EndpointId,
    window_start: u64,
}

pub struct RateLimitOutcome {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch seconds at which the current window ends.
    pub reset_at: u64,
}

impl RateLimitOutcome {
    /// Seconds until the window ends, rounded up, for `Retry-After`.
    pub fn retry_after_secs(&self, now: u64) -> u64 {
        self.reset_at.saturating_sub(now)
    }
}

pub struct RateLimiter {
    window_secs: u64,
    counters: DashMap<CounterKey, u32>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self { window_secs: window.as_secs().max(1), counters: DashMap::new() }
    }

    fn now_secs() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }

    fn window_start(&self, now: u64) -> u64 {
        now / self.window_secs
    }

    /// Checks the counter for `endpoint_id` against `limit` and, if under
    /// limit, increments it. Returns the outcome either way; denied
    /// requests leave the counter untouched.
    pub fn check_and_increment(&self, endpoint_id: &EndpointId, limit: u32) -> RateLimitOutcome {
        let now = Self::now_secs();
        let window_start = self.window_start(now);
        let reset_at = (window_start + 1) * self.window_secs;
        let key = CounterKey { endpoint_id: endpoint_id.clone(), window_start };

        let mut entry = self.counters.entry(key).or_insert(0);
        if *entry >= limit {
            RateLimitOutcome { allowed: false, limit, remaining: 0, reset_at }
        } else {
            *entry += 1;
            let remaining = limit.saturating_sub(*entry);
            RateLimitOutcome { allowed: true, limit, remaining, reset_at }
        }
    }

    /// Drops counters more than one full window stale (equivalent to the
    /// 2·W Redis TTL: a counter survives its own window plus one grace
    /// window before it disappears).
    pub fn sweep(&self) {
        let now = Self::now_secs();
        let current_window = self.window_start(now);
        self.counters.retain(|key, _| current_window.saturating_sub(key.window_start) <= 1);
    }

    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }
}
