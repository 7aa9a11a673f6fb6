// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Circuit breaker guarding connection attempts.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ResilienceError;

/// State of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected until the cool-down elapses.
    Open,
    /// A limited number of trial calls are let through.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for a [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a trial call.
    pub open_duration: Duration,
    /// Trial calls admitted while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }
}

/// Classic three-state circuit breaker.
///
/// The breaker is owned by the session task, so it is a plain value rather
/// than an `Arc`-shared structure. Time is passed in explicitly.
///
/// # Examples
///
/// ```
/// use intellicenter_lib::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
/// use tokio::time::Instant;
///
/// let mut breaker = CircuitBreaker::new(CircuitBreakerConfig {
///     failure_threshold: 2,
///     ..Default::default()
/// });
/// let now = Instant::now();
/// breaker.record_failure(now);
/// breaker.record_failure(now);
/// assert_eq!(breaker.state(now), CircuitState::Open);
/// assert!(breaker.try_acquire(now).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_calls: u32,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            half_open_calls: 0,
        }
    }

    /// Returns the state as of `now`, moving from open to half-open once
    /// the cool-down has elapsed.
    pub fn state(&mut self, now: Instant) -> CircuitState {
        if self.state == CircuitState::Open
            && self
                .opened_at
                .is_some_and(|at| now.saturating_duration_since(at) >= self.config.open_duration)
        {
            tracing::debug!("Circuit breaker cool-down elapsed, entering half-open");
            self.state = CircuitState::HalfOpen;
            self.half_open_calls = 0;
        }
        self.state
    }

    /// Asks permission to make a call.
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::CircuitOpen`] while open, or when the
    /// half-open trial budget is used up.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), ResilienceError> {
        match self.state(now) {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => Err(ResilienceError::CircuitOpen),
            CircuitState::HalfOpen => {
                if self.half_open_calls < self.config.half_open_max_calls {
                    self.half_open_calls += 1;
                    Ok(())
                } else {
                    Err(ResilienceError::CircuitOpen)
                }
            }
        }
    }

    /// Records a successful call, closing the circuit.
    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            tracing::info!(previous = %self.state, "Circuit breaker closed");
        }
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.half_open_calls = 0;
    }

    /// Records a failed call, opening the circuit past the threshold or
    /// immediately when a half-open trial fails.
    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let trip = self.state == CircuitState::HalfOpen
            || self.consecutive_failures >= self.config.failure_threshold;
        if trip && self.state != CircuitState::Open {
            tracing::warn!(
                failures = self.consecutive_failures,
                "Circuit breaker opened"
            );
        }
        if trip {
            self.state = CircuitState::Open;
            self.opened_at = Some(now);
            self.half_open_calls = 0;
        }
    }

    /// Returns the number of consecutive failures recorded.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns the last computed state without advancing time.
    #[must_use]
    pub fn current_state(&self) -> CircuitState {
        self.state
    }

    /// Resets to the initial closed state.
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.half_open_calls = 0;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
