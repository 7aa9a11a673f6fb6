// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fault tolerance primitives guarding the connection and command path.
//!
//! - [`CircuitBreaker`] - Fails connection attempts fast after repeated failures
//! - [`RetryPolicy`] - Bounded exponential backoff for transient failures
//! - [`RateLimiter`] - Token bucket shedding excess outbound commands
//! - [`HealthMonitor`] - Success/failure counters for diagnostics
//! - [`DeadLetterQueue`] - Bounded store of commands that failed to send
//!
//! All primitives are plain values owned by the session task; time is
//! passed in explicitly so behaviour is deterministic under test.

mod circuit_breaker;
mod dead_letter;
mod health;
mod rate_limiter;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use dead_letter::{DeadLetter, DeadLetterQueue};
pub use health::{HealthMonitor, HealthSnapshot};
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
