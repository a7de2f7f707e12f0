//! Sliding-window request limiting.
//!
//! Each key keeps two fixed-window counters. The estimate for "the last
//! `window`" is the current count plus the previous count weighted by how
//! much of the previous window still overlaps the sliding one.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::CoreResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub name: String,
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn per_minute(name: &str, limit: u32) -> Self {
        Self { name: name.to_string(), limit, window: Duration::from_secs(60) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Set on denials
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    /// What a limiter reports when its backend is unavailable.
    pub fn fail_open(limit: u32) -> Self {
        Self { allowed: true, limit, remaining: limit, retry_after: None }
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one hit for `key` under `policy` and say whether it may pass.
    async fn check(&self, key: &str, policy: &RateLimitPolicy) -> CoreResult<RateLimitDecision>;
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    window_index: u64,
    current: u32,
    previous: u32,
    last_seen_ms: u64,
}

/// In-process limiter bounded to `max_keys` entries; the least recently
/// seen keys are evicted first.
pub struct SlidingWindowLimiter {
    windows: DashMap<String, WindowState>,
    max_keys: usize,
    origin: Instant,
}

impl SlidingWindowLimiter {
    pub fn new(max_keys: usize) -> Self {
        Self {
            windows: DashMap::new(),
            max_keys: max_keys.max(1),
            origin: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Evaluate a hit at `now_ms` milliseconds on the limiter's clock.
    pub fn check_at(&self, key: &str, policy: &RateLimitPolicy, now_ms: u64) -> RateLimitDecision {
        let window_ms = (policy.window.as_millis() as u64).max(1);
        let index = now_ms / window_ms;

        if !self.windows.contains_key(key) && self.windows.len() >= self.max_keys {
            self.evict();
        }

        let mut entry = self.windows.entry(key.to_string()).or_insert(WindowState {
            window_index: index,
            current: 0,
            previous: 0,
            last_seen_ms: now_ms,
        });
        let state = entry.value_mut();

        if index != state.window_index {
            state.previous = if index == state.window_index + 1 { state.current } else { 0 };
            state.current = 0;
            state.window_index = index;
        }
        state.last_seen_ms = now_ms;

        let into_window = now_ms - index * window_ms;
        let overlap = 1.0 - into_window as f64 / window_ms as f64;
        let estimate = state.previous as f64 * overlap + state.current as f64;
        let limit = policy.limit as f64;

        if estimate + 1.0 > limit {
            return RateLimitDecision {
                allowed: false,
                limit: policy.limit,
                remaining: 0,
                retry_after: Some(retry_after(state, policy.limit, into_window, window_ms)),
            };
        }

        state.current += 1;
        let remaining = (limit - estimate - 1.0).floor().max(0.0) as u32;
        RateLimitDecision { allowed: true, limit: policy.limit, remaining, retry_after: None }
    }

    /// Drop the least recently seen tenth of the keys (at least one).
    fn evict(&self) {
        let mut seen: Vec<(String, u64)> = self
            .windows
            .iter()
            .map(|e| (e.key().clone(), e.value().last_seen_ms))
            .collect();
        seen.sort_by_key(|(_, last)| *last);
        let count = (self.max_keys / 10).max(1);
        for (key, _) in seen.into_iter().take(count) {
            self.windows.remove(&key);
        }
        tracing::debug!("Rate limiter evicted {} keys", count);
    }
}

/// Time until the estimate drops enough to admit one more hit.
fn retry_after(state: &WindowState, limit: u32, into_window: u64, window_ms: u64) -> Duration {
    let until_next_window = window_ms - into_window;
    let ms = if state.current + 1 > limit || state.previous == 0 {
        // Only the window roll helps; after it the current count becomes
        // the weighted previous one, which decays over the next window.
        let carried = state.current as f64;
        let extra = if carried + 1.0 > limit as f64 && carried > 0.0 {
            ((1.0 - (limit as f64 - 1.0) / carried) * window_ms as f64).ceil() as u64
        } else {
            0
        };
        until_next_window + extra
    } else {
        // Wait for the previous window's weight to decay.
        let needed_overlap = (limit as f64 - 1.0 - state.current as f64) / state.previous as f64;
        let target_ms = ((1.0 - needed_overlap) * window_ms as f64).ceil() as u64;
        target_ms.saturating_sub(into_window).max(1)
    };
    Duration::from_millis(ms.max(1))
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn check(&self, key: &str, policy: &RateLimitPolicy) -> CoreResult<RateLimitDecision> {
        let now_ms = self.origin.elapsed().as_millis() as u64;
        Ok(self.check_at(key, policy, now_ms))
    }
}
