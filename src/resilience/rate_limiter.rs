// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Token bucket limiting outbound commands.

use std::time::Duration;

use tokio::time::Instant;

/// Token bucket rate limiter.
///
/// The bucket starts full with `capacity` tokens and refills continuously at
/// `capacity / window`. A rejected acquire is final; callers drop the work.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use intellicenter_lib::resilience::RateLimiter;
/// use tokio::time::Instant;
///
/// let mut limiter = RateLimiter::new(2, Duration::from_secs(60));
/// let now = Instant::now();
/// assert!(limiter.try_acquire(now));
/// assert!(limiter.try_acquire(now));
/// assert!(!limiter.try_acquire(now));
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    tokens: f64,
    last_refill: Option<Instant>,
}

impl RateLimiter {
    /// Default budget: 40 requests per 60 seconds.
    pub const DEFAULT_CAPACITY: u32 = 40;
    /// Default window.
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

    /// Creates a full bucket of `capacity` tokens refilled over `window`.
    #[must_use]
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            tokens: f64::from(capacity),
            last_refill: None,
        }
    }

    fn refill(&mut self, now: Instant) {
        if let Some(last) = self.last_refill {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            let window = self.window.as_secs_f64();
            if window > 0.0 {
                let rate = f64::from(self.capacity) / window;
                self.tokens = (self.tokens + elapsed * rate).min(f64::from(self.capacity));
            } else {
                self.tokens = f64::from(self.capacity);
            }
        }
        self.last_refill = Some(now);
    }

    /// Takes one token if available.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Returns the whole tokens currently available.
    pub fn available(&mut self, now: Instant) -> u32 {
        self.refill(now);
        // tokens is clamped to [0, capacity]
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let whole = self.tokens.floor() as u32;
        whole
    }

    /// Refills the bucket completely.
    pub fn reset(&mut self) {
        self.tokens = f64::from(self.capacity);
        self.last_refill = None;
    }

    /// Returns the bucket capacity.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY, Self::DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_beyond_capacity_is_rejected() {
        let mut limiter = RateLimiter::default();
        let now = Instant::now();
        let accepted = (0..45).filter(|_| limiter.try_acquire(now)).count();
        assert_eq!(accepted, 40);
    }

    #[test]
    fn refills_over_time() {
        let mut limiter = RateLimiter::new(40, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..40 {
            assert!(limiter.try_acquire(start));
        }
        assert!(!limiter.try_acquire(start));

        // 1.6s buys a little over one token at 40/60s
        let later = start + Duration::from_millis(1600);
        assert!(limiter.try_acquire(later));
        assert!(!limiter.try_acquire(later));
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(10));
        let start = Instant::now();
        assert_eq!(limiter.available(start), 5);
        assert_eq!(limiter.available(start + Duration::from_secs(3600)), 5);
    }

    #[test]
    fn reset_refills() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.try_acquire(now));
        assert!(!limiter.try_acquire(now));
        limiter.reset();
        assert!(limiter.try_acquire(now));
    }
}
