//! Circuit breaker guarding calls to the item service.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: backend assumed down, calls fail fast
//! - Half-Open: one trial call tests whether the backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures reaches fail_max
//! Open → Half-Open: first call after reset_timeout since opened_at
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails (opened_at = now)
//! any → Closed: manual reset
//! ```
//!
//! # Design Decisions
//! - One mutex guards the whole state record; it is never held across an await
//! - Excluded codes count as successes but are still returned to the caller
//! - Single trial in Half-Open; a cancelled trial frees the slot for the next caller
//! - Outcomes of calls admitted under an older state are ignored once the
//!   state has moved on

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::error::Error;
use crate::observability::metrics;
use crate::rpc::{Code, Status};

const EVENT_CAPACITY: usize = 64;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    fn gauge_value(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted on every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Point-in-time view of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<Instant>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

pub struct CircuitBreaker {
    name: String,
    fail_max: u32,
    reset_timeout: Duration,
    exclude: Vec<Code>,
    inner: Mutex<BreakerState>,
    events: broadcast::Sender<Transition>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &BreakerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        metrics::record_breaker_state(CircuitState::Closed.gauge_value());
        Self {
            name: name.into(),
            fail_max: config.fail_max.max(1),
            reset_timeout: config.reset_timeout(),
            exclude: config.exclude.clone(),
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
            events,
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns `Error::BreakerOpen` without invoking `operation` when the
    /// breaker rejects the call.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Status>>,
    {
        let admission = self.admit()?;
        let result = operation().await;
        let success = match &result {
            Ok(_) => true,
            Err(status) => self.is_excluded(status.code),
        };
        admission.settle(success);
        result.map_err(Error::from)
    }

    /// Force Closed with a zero failure count, whatever the current state.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let from = inner.state;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
        if from != CircuitState::Closed {
            self.transition(&mut inner, CircuitState::Closed);
        }
        tracing::info!(breaker = %self.name, previous = %from, "Circuit breaker manually reset");
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            opened_at: inner.opened_at,
        }
    }

    /// Receive every subsequent state transition.
    pub fn subscribe(&self) -> broadcast::Receiver<Transition> {
        self.events.subscribe()
    }

    pub fn is_excluded(&self, code: Code) -> bool {
        self.exclude.contains(&code)
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn admit(&self) -> Result<Admission<'_>, Error> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Admission::new(self, false)),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map_or(true, |opened| opened.elapsed() >= self.reset_timeout);
                if !elapsed {
                    tracing::debug!(breaker = %self.name, "Circuit open, rejecting call");
                    return Err(Error::BreakerOpen);
                }
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.trial_in_flight = true;
                self.transition(&mut inner, CircuitState::HalfOpen);
                Ok(Admission::new(self, true))
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    tracing::debug!(breaker = %self.name, "Trial call in flight, rejecting call");
                    return Err(Error::BreakerOpen);
                }
                inner.trial_in_flight = true;
                Ok(Admission::new(self, true))
            }
        }
    }

    fn record(&self, trial: bool, success: bool) {
        let mut inner = self.lock();
        if trial {
            inner.trial_in_flight = false;
        }

        match (inner.state, trial, success) {
            (CircuitState::Closed, false, true) => {
                inner.consecutive_failures = 0;
            }
            (CircuitState::Closed, false, false) => {
                inner.consecutive_failures += 1;
                tracing::warn!(
                    breaker = %self.name,
                    failures = inner.consecutive_failures,
                    threshold = self.fail_max,
                    "Call failed in closed state"
                );
                if inner.consecutive_failures >= self.fail_max {
                    inner.opened_at = Some(Instant::now());
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            (CircuitState::HalfOpen, true, true) => {
                inner.consecutive_failures = 0;
                self.transition(&mut inner, CircuitState::Closed);
            }
            (CircuitState::HalfOpen, true, false) => {
                inner.consecutive_failures += 1;
                inner.opened_at = Some(Instant::now());
                self.transition(&mut inner, CircuitState::Open);
            }
            (state, trial, success) => {
                tracing::trace!(
                    breaker = %self.name,
                    state = %state,
                    trial,
                    success,
                    "Stale outcome ignored"
                );
            }
        }
    }

    fn release_trial(&self) {
        self.lock().trial_in_flight = false;
    }

    /// Called with the lock held so events are published in transition order.
    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        inner.state = to;

        match to {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                from = %from,
                failures = inner.consecutive_failures,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => tracing::info!(
                breaker = %self.name,
                "Circuit breaker half-open, allowing trial call"
            ),
            CircuitState::Closed => {
                tracing::info!(breaker = %self.name, from = %from, "Circuit breaker closed")
            }
        }

        metrics::record_breaker_transition(from.as_str(), to.as_str());
        metrics::record_breaker_state(to.gauge_value());
        // No subscribers is fine.
        let _ = self.events.send(Transition { from, to });
    }
}

/// Permission for one call; a trial that is dropped unsettled frees the slot.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Admission<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn settle(mut self, success: bool) {
        self.settled = true;
        self.breaker.record(self.trial, success);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.release_trial();
        }
    }
}
