// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection health bookkeeping.

use chrono::{DateTime, Utc};

/// Consecutive failures after which the connection is reported unhealthy.
const DEFAULT_UNHEALTHY_THRESHOLD: u32 = 3;

/// Point-in-time view of [`HealthMonitor`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HealthSnapshot {
    /// Whether the connection is considered healthy.
    pub healthy: bool,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Lifetime successes.
    pub total_successes: u64,
    /// Lifetime failures.
    pub total_failures: u64,
    /// Time of the last success.
    pub last_success: Option<DateTime<Utc>>,
    /// Time of the last failure.
    pub last_failure: Option<DateTime<Utc>>,
    /// Description of the last failure.
    pub last_error: Option<String>,
}

/// Tracks success/failure outcomes of connection-level operations.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    unhealthy_threshold: u32,
    consecutive_failures: u32,
    total_successes: u64,
    total_failures: u64,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl HealthMonitor {
    /// Creates a monitor with the default threshold.
    #[must_use]
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_UNHEALTHY_THRESHOLD)
    }

    /// Creates a monitor that turns unhealthy after `threshold` consecutive failures.
    #[must_use]
    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            unhealthy_threshold: threshold.max(1),
            consecutive_failures: 0,
            total_successes: 0,
            total_failures: 0,
            last_success: None,
            last_failure: None,
            last_error: None,
        }
    }

    /// Records a success.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.total_successes += 1;
        self.last_success = Some(Utc::now());
    }

    /// Records a failure with its description.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.total_failures += 1;
        self.last_failure = Some(Utc::now());
        self.last_error = Some(error.into());
    }

    /// Returns `true` while consecutive failures stay below the threshold.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures < self.unhealthy_threshold
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            healthy: self.is_healthy(),
            consecutive_failures: self.consecutive_failures,
            total_successes: self.total_successes,
            total_failures: self.total_failures,
            last_success: self.last_success,
            last_failure: self.last_failure,
            last_error: self.last_error.clone(),
        }
    }

    /// Clears all counters.
    pub fn reset(&mut self) {
        *self = Self::with_threshold(self.unhealthy_threshold);
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn becomes_unhealthy_after_threshold() {
        let mut monitor = HealthMonitor::new();
        monitor.record_failure("refused");
        monitor.record_failure("refused");
        assert!(monitor.is_healthy());
        monitor.record_failure("refused");
        assert!(!monitor.is_healthy());
        assert_eq!(monitor.snapshot().last_error.as_deref(), Some("refused"));
    }

    #[test]
    fn success_restores_health() {
        let mut monitor = HealthMonitor::with_threshold(1);
        monitor.record_failure("timeout");
        assert!(!monitor.is_healthy());
        monitor.record_success();
        let snapshot = monitor.snapshot();
        assert!(snapshot.healthy);
        assert_eq!(snapshot.total_failures, 1);
        assert_eq!(snapshot.total_successes, 1);
        assert!(snapshot.last_success.is_some());
    }

    #[test]
    fn reset_clears_counters() {
        let mut monitor = HealthMonitor::new();
        monitor.record_failure("x");
        monitor.reset();
        assert_eq!(monitor.snapshot().total_failures, 0);
        assert!(monitor.snapshot().last_error.is_none());
    }
}
