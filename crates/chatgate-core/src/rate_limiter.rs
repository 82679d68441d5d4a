//! Per-identity sliding-window rate limiting
//!
//! Each identity gets an ordered window of admission instants. A check
//! prunes instants older than the window, rejects once the limit is
//! reached, and records the admission otherwise. Rejection is a normal
//! boolean outcome, never an error.
//!
//! The limiter holds its own lock, independent of any cache lock, so
//! unrelated lookups never contend with admission decisions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::IdentityId;

// ----------------------------------------------------------------------------
// Rate Limiter
// ----------------------------------------------------------------------------

/// Sliding-window admission counter, one window per identity
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<HashMap<IdentityId, VecDeque<Instant>>>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    /// Create a limiter admitting at most `limit` calls per identity within
    /// any trailing window
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            limit: config.requests_per_window as usize,
            window: Duration::from_secs(config.window_secs),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IdentityId, VecDeque<Instant>>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check whether a call from `identity` is admitted. Rejected calls are
    /// not recorded, so they do not extend the identity's window.
    pub fn check(&self, identity: IdentityId) -> bool {
        let now = Instant::now();
        let mut windows = self.lock();
        let window = windows.entry(identity).or_default();

        while let Some(&front) = window.front() {
            if now.duration_since(front) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.limit {
            return false;
        }
        window.push_back(now);
        true
    }

    /// Prune every window and drop identities whose windows emptied. Windows
    /// are otherwise only pruned when their identity checks in again, so the
    /// periodic job calls this to keep inactive identities from accumulating.
    pub fn sweep(&self) {
        let now = Instant::now();
        let window_len = self.window;
        let mut windows = self.lock();
        for window in windows.values_mut() {
            while let Some(&front) = window.front() {
                if now.duration_since(front) >= window_len {
                    window.pop_front();
                } else {
                    break;
                }
            }
        }
        windows.retain(|_, window| !window.is_empty());
    }

    /// Current limiter usage, for diagnostics
    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            tracked_identities: self.lock().len(),
            limit: self.limit,
            window_secs: self.window.as_secs(),
        }
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Snapshot of limiter state
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    /// Identities with at least one window entry
    pub tracked_identities: usize,
    /// Configured per-identity admission limit
    pub limit: usize,
    /// Configured window length in seconds
    pub window_secs: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
