//! Per-provider circuit breaker (spec §4.1).
//!
//! Closed -> Open after 5 consecutive hard failures within a 60s sliding
//! window. Open for 120s, then Half-open (exactly one probe allowed). A
//! successful probe closes the breaker; a failed probe re-opens it for
//! another 120s. Transient failures and rate-limit failures never reach this
//! type — the gateway retries transient failures once at the provider level
//! before they'd count, and rate-limit failures only set a cooldown.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const FAILURE_WINDOW: Duration = Duration::from_secs(60);
pub const FAILURE_THRESHOLD: usize = 5;
pub const OPEN_DURATION: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    fails: VecDeque<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Thread-safe per-provider breaker. One instance lives per provider id in
/// the gateway's provider table.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                fails: VecDeque::new(),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().unwrap();
        self.refresh_locked(&mut inner, Instant::now());
        inner.state
    }

    fn refresh_locked(&self, inner: &mut Inner, now: Instant) {
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if now.duration_since(opened_at) >= OPEN_DURATION {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = false;
                }
            }
        }
    }

    /// Whether a call may be attempted right now. Consumes the single
    /// half-open probe slot if granted while half-open.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        self.refresh_locked(&mut inner, Instant::now());
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.fails.clear();
        inner.state = BreakerState::Closed;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    /// Records a hard (non-retriable) failure. Opens the breaker if this
    /// pushes the sliding-window count to the threshold, or immediately
    /// re-opens it if the failed call was the half-open probe.
    pub fn record_hard_failure(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        if inner.state == BreakerState::HalfOpen {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(now);
            inner.probe_in_flight = false;
            inner.fails.clear();
            return;
        }
        inner.fails.push_back(now);
        while let Some(&front) = inner.fails.front() {
            if now.duration_since(front) > FAILURE_WINDOW {
                inner.fails.pop_front();
            } else {
                break;
            }
        }
        if inner.fails.len() >= FAILURE_THRESHOLD {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(now);
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
