// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded, time-retained store of commands that failed to send.

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};

use crate::protocol::IntelliCenterRequest;

/// A command that could not be written to the controller.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeadLetter {
    /// The request that failed.
    pub request: IntelliCenterRequest,
    /// Why it failed.
    pub error: String,
    /// When it failed.
    pub failed_at: DateTime<Utc>,
}

/// Bounded dead letter queue.
///
/// When full, the oldest entry is evicted. Entries older than the retention
/// period are purged on every insert and snapshot.
#[derive(Debug, Clone)]
pub struct DeadLetterQueue {
    capacity: usize,
    retention: TimeDelta,
    entries: VecDeque<DeadLetter>,
}

impl DeadLetterQueue {
    /// Default capacity.
    pub const DEFAULT_CAPACITY: usize = 100;

    /// Creates a queue holding at most `capacity` entries for `retention`.
    #[must_use]
    pub fn new(capacity: usize, retention: TimeDelta) -> Self {
        Self {
            capacity: capacity.max(1),
            retention,
            entries: VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
        }
    }

    /// Records a failed request at `now`.
    pub fn push(&mut self, request: IntelliCenterRequest, error: impl Into<String>, now: DateTime<Utc>) {
        self.purge_expired(now);
        if self.entries.len() >= self.capacity
            && let Some(evicted) = self.entries.pop_front()
        {
            tracing::warn!(
                message_id = %evicted.request.message_id,
                "Dead letter queue full, evicting oldest entry"
            );
        }
        let letter = DeadLetter {
            request,
            error: error.into(),
            failed_at: now,
        };
        tracing::warn!(
            message_id = %letter.request.message_id,
            command = %letter.request.command,
            error = %letter.error,
            "Command moved to dead letter queue"
        );
        self.entries.push_back(letter);
    }

    /// Drops entries older than the retention period.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        while self.entries.front().is_some_and(|e| e.failed_at < cutoff) {
            self.entries.pop_front();
        }
    }

    /// Returns the retained entries, oldest first.
    pub fn snapshot(&mut self, now: DateTime<Utc>) -> Vec<DeadLetter> {
        self.purge_expired(now);
        self.entries.iter().cloned().collect()
    }

    /// Removes and returns every retained entry.
    pub fn drain(&mut self, now: DateTime<Utc>) -> Vec<DeadLetter> {
        self.purge_expired(now);
        self.entries.drain(..).collect()
    }

    /// Number of stored entries (including not yet purged ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY, TimeDelta::hours(24))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::IntelliCenterRequest;

    fn request() -> IntelliCenterRequest {
        IntelliCenterRequest::set_status("C0006", true)
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut dlq = DeadLetterQueue::new(2, TimeDelta::hours(24));
        let now = Utc::now();
        let first = request();
        let first_id = first.message_id.clone();
        dlq.push(first, "broken pipe", now);
        dlq.push(request(), "broken pipe", now);
        dlq.push(request(), "broken pipe", now);

        let entries = dlq.snapshot(now);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.request.message_id != first_id));
    }

    #[test]
    fn purges_after_retention() {
        let mut dlq = DeadLetterQueue::default();
        let then = Utc::now() - TimeDelta::hours(25);
        dlq.push(request(), "reset", then);
        assert_eq!(dlq.len(), 1);
        assert!(dlq.snapshot(Utc::now()).is_empty());
        assert!(dlq.is_empty());
    }

    #[test]
    fn drain_empties_queue() {
        let mut dlq = DeadLetterQueue::default();
        let now = Utc::now();
        dlq.push(request(), "reset", now);
        assert_eq!(dlq.drain(now).len(), 1);
        assert!(dlq.is_empty());
    }
}
