// crates/mcp-server/src/circuit_breaker.rs
// ============================================================================
// Module: Circuit Breaker
// Description: Closed/Open/HalfOpen state machine protecting fragile
//              downstream calls made by handlers.
// Purpose: Stop a handler from hammering a failing dependency (§4.12).
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`CircuitBreaker::execute`] wraps a fallible operation. After
//! `failure_threshold` consecutive failures the breaker opens and rejects
//! calls immediately with [`CircuitBreakerError::Open`] until
//! `open_duration` elapses, at which point it allows exactly one trial call
//! in `HalfOpen`: success closes the breaker, failure reopens it.

use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: State
// ============================================================================

/// The circuit breaker's state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through normally.
    Closed,
    /// Calls are rejected immediately.
    Open,
    /// One trial call is allowed to decide the next transition.
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// A circuit breaker guarding one downstream dependency.
///
/// # Invariants
/// - State transitions are serialized by a single internal mutex; there is
///   no window where two callers observe inconsistent states.
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_duration: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Builds a breaker starting in `Closed`.
    #[must_use]
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            open_duration,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Returns the breaker's current state, transitioning `Open` to
    /// `HalfOpen` first if `open_duration` has elapsed.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned mutex is treated as `Open`.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let Ok(mut inner) = self.inner.lock() else {
            return CircuitState::Open;
        };
        self.maybe_transition_to_half_open(&mut inner);
        inner.state
    }

    fn maybe_transition_to_half_open(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.open_duration {
                    inner.state = CircuitState::HalfOpen;
                }
            }
        }
    }

    /// Runs `op` if the breaker permits it, recording the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitBreakerError::Open`] without invoking `op` when the
    /// breaker is `Open`. Returns [`CircuitBreakerError::Inner`] wrapping
    /// `op`'s error when `op` fails; the failure is still recorded.
    pub fn execute<T, E>(
        &self,
        op: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, CircuitBreakerError<E>> {
        if self.state() == CircuitState::Open {
            return Err(CircuitBreakerError::Open);
        }
        match op() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    /// Records a successful call outside [`Self::execute`] (e.g. for async
    /// callers that cannot pass a closure across an await point).
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned mutex is a no-op.
    pub fn record_success(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Records a failed call outside [`Self::execute`].
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned mutex is a no-op.
    pub fn record_failure(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Forces the breaker back to `Closed`.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned mutex is a no-op.
    pub fn reset(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }
}

/// Failures surfaced by [`CircuitBreaker::execute`].
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker is open; `op` was not invoked.
    #[error("circuit open")]
    Open,
    /// `op` ran and failed.
    #[error(transparent)]
    Inner(E),
}
