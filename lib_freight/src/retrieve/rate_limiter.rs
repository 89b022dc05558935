//! # Sliding-Window Rate Limiter
//!
//! Tracks the instants of admitted requests and counts those inside the
//! trailing window. Every query purges instants older than the window
//! first, so the window slides continuously rather than resetting in steps.
//!
//! The limiter does not reserve atomically: callers check
//! [`RateLimiter::can_make_request`] and then call
//! [`RateLimiter::record_request`]. `RequestClient` does both under one lock.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Snapshot of the limiter's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    /// Requests counted inside the current window.
    pub requests_this_window: usize,
    /// Requests still admissible in the current window.
    pub remaining_requests: usize,
    /// Time until the oldest counted request leaves the window.
    #[serde(serialize_with = "as_millis")]
    pub window_resets_in: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// # Rate Limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    requests: VecDeque<Instant>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    /// Admits at most `max_requests` per trailing `window`.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: VecDeque::new(),
            max_requests,
            window,
        }
    }

    /// Purges expired instants and reports whether another request fits.
    pub fn can_make_request(&mut self) -> bool {
        self.purge(Instant::now());
        self.requests.len() < self.max_requests
    }

    /// Counts a request issued now.
    pub fn record_request(&mut self) {
        self.requests.push_back(Instant::now());
    }

    /// Requests still admissible in the current window.
    pub fn remaining_requests(&mut self) -> usize {
        self.purge(Instant::now());
        self.max_requests.saturating_sub(self.requests.len())
    }

    /// When the oldest counted request leaves the window, or now if none.
    pub fn window_reset_time(&self) -> Instant {
        match self.requests.front() {
            Some(oldest) => *oldest + self.window,
            None => Instant::now(),
        }
    }

    /// How long until another request would be admitted.
    pub fn time_until_available(&mut self) -> Duration {
        if self.can_make_request() {
            return Duration::ZERO;
        }
        self.window_reset_time()
            .saturating_duration_since(Instant::now())
    }

    /// Current quota snapshot.
    pub fn usage(&mut self) -> UsageStats {
        let remaining_requests = self.remaining_requests();
        UsageStats {
            requests_this_window: self.requests.len(),
            remaining_requests,
            window_resets_in: self
                .window_reset_time()
                .saturating_duration_since(Instant::now()),
        }
    }

    /// Forgets every tracked request.
    pub fn reset(&mut self) {
        self.requests.clear();
    }

    fn purge(&mut self, now: Instant) {
        // Instants are pushed in order, so the expired ones sit at the front.
        while let Some(oldest) = self.requests.front() {
            if now.duration_since(*oldest) >= self.window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }
}
