//! registry::rate_limit
//!
//! Coalescing of bursty requests into at most one run per window.
//!
//! The first request in a quiet period runs immediately. A request that
//! arrives inside the window schedules one trailing run at the window's
//! end; further requests before that run are absorbed by it.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// What the caller should do with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Run now.
    Now,
    /// Run after the given delay, then call [`RateLimiter::mark_ran`].
    After(Duration),
    /// A trailing run is already scheduled and will cover this request.
    Coalesced,
}

#[derive(Debug, Default)]
struct LimiterState {
    last_run: Option<Instant>,
    pending: bool,
}

/// Per-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(LimiterState::default()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide how to handle a request arriving now.
    pub fn admit(&self) -> Admission {
        self.admit_at(Instant::now())
    }

    fn admit_at(&self, now: Instant) -> Admission {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.pending {
            return Admission::Coalesced;
        }

        match state.last_run {
            Some(last) if now.duration_since(last) < self.window => {
                state.pending = true;
                Admission::After(self.window - now.duration_since(last))
            }
            _ => {
                state.last_run = Some(now);
                Admission::Now
            }
        }
    }

    /// Record that a delayed run has started.
    pub fn mark_ran(&self) {
        self.mark_ran_at(Instant::now());
    }

    fn mark_ran_at(&self, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending = false;
        state.last_run = Some(now);
    }
}
