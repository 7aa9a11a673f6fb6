// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rate-limited FIFO of outbound commands.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::protocol::IntelliCenterRequest;
use crate::resilience::RateLimiter;

/// Outbound command queue.
///
/// Admission is gated by a [`RateLimiter`]; a command refused at admission
/// is dropped, never queued. Admitted commands leave strictly in order, one
/// per `delay`, and only while the connection is up.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use intellicenter_lib::protocol::IntelliCenterRequest;
/// use intellicenter_lib::resilience::RateLimiter;
/// use intellicenter_lib::session::CommandQueue;
/// use tokio::time::Instant;
///
/// let limiter = RateLimiter::new(40, Duration::from_secs(60));
/// let mut queue = CommandQueue::new(limiter, Duration::from_millis(200));
/// let now = Instant::now();
///
/// assert!(queue.enqueue(IntelliCenterRequest::set_status("C0003", true), now));
/// assert!(queue.pop_due(now, false).is_none());
/// assert!(queue.pop_due(now, true).is_some());
/// ```
#[derive(Debug, Clone)]
pub struct CommandQueue {
    queue: VecDeque<IntelliCenterRequest>,
    limiter: RateLimiter,
    delay: Duration,
    next_send_at: Option<Instant>,
}

impl CommandQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new(limiter: RateLimiter, delay: Duration) -> Self {
        Self {
            queue: VecDeque::new(),
            limiter,
            delay,
            next_send_at: None,
        }
    }

    /// Admits a command. Returns `false` if the rate limiter refused it.
    pub fn enqueue(&mut self, request: IntelliCenterRequest, now: Instant) -> bool {
        if !self.limiter.try_acquire(now) {
            tracing::warn!(
                command = %request.command,
                targets = ?request.targets(),
                capacity = self.limiter.capacity(),
                "Rate limit exceeded, dropping command"
            );
            return false;
        }
        tracing::debug!(
            command = %request.command,
            message_id = %request.message_id,
            queued = self.queue.len() + 1,
            "Command queued"
        );
        self.queue.push_back(request);
        true
    }

    /// Takes the next command if connected and the inter-command delay has
    /// passed.
    pub fn pop_due(&mut self, now: Instant, connected: bool) -> Option<IntelliCenterRequest> {
        if !connected || self.next_send_at.is_some_and(|at| now < at) {
            return None;
        }
        let request = self.queue.pop_front()?;
        self.next_send_at = Some(now + self.delay);
        Some(request)
    }

    /// When [`pop_due`](Self::pop_due) next has work, if connected.
    #[must_use]
    pub fn next_deadline(&self, now: Instant, connected: bool) -> Option<Instant> {
        if !connected || self.queue.is_empty() {
            return None;
        }
        Some(self.next_send_at.map_or(now, |at| at.max(now)))
    }

    /// Tokens left in the rate limiter.
    pub fn available(&mut self, now: Instant) -> u32 {
        self.limiter.available(now)
    }

    /// Queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drops every queued command and refills the rate limiter.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.limiter.reset();
        self.next_send_at = None;
    }
}
