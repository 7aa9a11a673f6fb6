// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sequencing of hardware discovery queries.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::config::SessionTimings;
use crate::protocol::{DiscoveryCategory, IntelliCenterRequest, IntelliCenterResponse};

use super::merge::merge_tree;

/// Discovery timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryTimings {
    /// Time to wait for each answer.
    pub timeout: Duration,
    /// Spacing after a successful answer.
    pub pacing: Duration,
    /// Spacing between retries.
    pub retry_pacing: Duration,
    /// Spacing after a timeout.
    pub settle: Duration,
}

impl Default for DiscoveryTimings {
    fn default() -> Self {
        Self::from(&SessionTimings::default())
    }
}

impl From<&SessionTimings> for DiscoveryTimings {
    fn from(t: &SessionTimings) -> Self {
        Self {
            timeout: t.discovery_timeout,
            pacing: t.discovery_pacing,
            retry_pacing: t.discovery_retry_pacing,
            settle: t.discovery_settle,
        }
    }
}

/// What the session should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryAction {
    /// Write this query to the controller.
    Send(IntelliCenterRequest),
    /// Discovery finished.
    Complete(DiscoveryOutcome),
}

/// Result of one discovery cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryOutcome {
    /// Merged answer tree (`Null` if nothing was answered).
    pub tree: Value,
    /// Categories that answered.
    pub succeeded: BTreeSet<DiscoveryCategory>,
    /// Categories that never answered.
    pub failed: BTreeSet<DiscoveryCategory>,
    /// Time from start to completion.
    pub elapsed: Duration,
}

impl DiscoveryOutcome {
    /// Returns `true` if at least one category answered.
    #[must_use]
    pub fn has_data(&self) -> bool {
        !self.succeeded.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    FirstPass,
    RetryPass,
    Completing,
    Complete,
}

#[derive(Debug, Clone)]
struct InFlight {
    category: DiscoveryCategory,
    message_id: String,
    deadline: Instant,
}

/// Pure discovery state machine.
///
/// Categories are queried one at a time in [`DiscoveryCategory::ALL`]
/// order. Each query has its own timeout; a timed-out category is retried
/// once after the first pass. Completion happens exactly once per
/// [`start`](Self::start), with whatever was merged so far.
///
/// The orchestrator never sleeps. The caller feeds it the current time
/// via [`poll`](Self::poll) and wakes up at [`next_deadline`](Self::next_deadline).
///
/// # Examples
///
/// ```
/// use intellicenter_lib::discovery::{DiscoveryAction, DiscoveryOrchestrator};
/// use tokio::time::Instant;
///
/// let mut discovery = DiscoveryOrchestrator::default();
/// let now = Instant::now();
/// discovery.start(now);
/// assert!(matches!(discovery.poll(now), Some(DiscoveryAction::Send(_))));
/// // one query at a time
/// assert!(discovery.poll(now).is_none());
/// ```
#[derive(Debug)]
pub struct DiscoveryOrchestrator {
    timings: DiscoveryTimings,
    phase: Phase,
    pending: VecDeque<DiscoveryCategory>,
    retries: VecDeque<DiscoveryCategory>,
    failures: HashMap<DiscoveryCategory, u32>,
    succeeded: BTreeSet<DiscoveryCategory>,
    sent: HashMap<String, DiscoveryCategory>,
    in_flight: Option<InFlight>,
    next_send_at: Option<Instant>,
    started_at: Option<Instant>,
    tree: Value,
}

impl DiscoveryOrchestrator {
    /// Creates an idle orchestrator.
    #[must_use]
    pub fn new(timings: DiscoveryTimings) -> Self {
        Self {
            timings,
            phase: Phase::Idle,
            pending: VecDeque::new(),
            retries: VecDeque::new(),
            failures: HashMap::new(),
            succeeded: BTreeSet::new(),
            sent: HashMap::new(),
            in_flight: None,
            next_send_at: None,
            started_at: None,
            tree: Value::Null,
        }
    }

    /// Starts a new cycle, discarding any previous one.
    pub fn start(&mut self, now: Instant) {
        self.cancel();
        self.phase = Phase::FirstPass;
        self.pending = DiscoveryCategory::ALL.into_iter().collect();
        self.next_send_at = Some(now);
        self.started_at = Some(now);
        tracing::info!(categories = DiscoveryCategory::ALL.len(), "Starting discovery");
    }

    /// Drops all progress and returns to idle.
    pub fn cancel(&mut self) {
        self.phase = Phase::Idle;
        self.pending.clear();
        self.retries.clear();
        self.failures.clear();
        self.succeeded.clear();
        self.sent.clear();
        self.in_flight = None;
        self.next_send_at = None;
        self.started_at = None;
        self.tree = Value::Null;
    }

    /// Returns `true` between `start` and completion.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.phase,
            Phase::FirstPass | Phase::RetryPass | Phase::Completing
        )
    }

    /// Returns `true` once the current cycle has completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// Category currently awaiting an answer.
    #[must_use]
    pub fn in_flight(&self) -> Option<DiscoveryCategory> {
        self.in_flight.as_ref().map(|f| f.category)
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.is_active() {
            return None;
        }
        if self.phase == Phase::Completing {
            return self.started_at;
        }
        match (&self.in_flight, self.next_send_at) {
            (Some(f), _) => Some(f.deadline),
            (None, at) => at,
        }
    }

    /// Advances timers and returns the next action, if any.
    ///
    /// Call repeatedly until it returns `None`.
    pub fn poll(&mut self, now: Instant) -> Option<DiscoveryAction> {
        if let Some(flight) = &self.in_flight
            && now >= flight.deadline
        {
            let category = flight.category;
            self.in_flight = None;
            let count = self.record_failure(category);
            tracing::warn!(
                category = %category,
                failures = count,
                timeout_ms = u64::try_from(self.timings.timeout.as_millis()).unwrap_or(u64::MAX),
                "Discovery query timed out"
            );
            self.advance(now, self.timings.settle);
        }

        match self.phase {
            Phase::Completing => Some(DiscoveryAction::Complete(self.finish(now))),
            Phase::FirstPass | Phase::RetryPass if self.in_flight.is_none() => {
                let due = self.next_send_at.is_some_and(|at| now >= at);
                if due { self.send_next(now) } else { None }
            }
            _ => None,
        }
    }

    /// Offers an inbound message. Returns `true` if it was a discovery answer.
    pub fn handle_response(&mut self, response: &IntelliCenterResponse, now: Instant) -> bool {
        if !self.is_active() || (!response.is_discovery_answer() && !self.is_own(response)) {
            return false;
        }

        let category = match response.message_id.as_deref() {
            Some(id) => match self.sent.get(id) {
                Some(category) => *category,
                None => return false,
            },
            // uncorrelated answers are attributed to the query in flight
            None => match &self.in_flight {
                Some(flight) => flight.category,
                None => return false,
            },
        };

        let is_current = self
            .in_flight
            .as_ref()
            .is_some_and(|f| f.category == category);

        match (&response.answer, response.is_ok()) {
            (Some(answer), true) => {
                merge_tree(&mut self.tree, answer.clone());
                self.succeeded.insert(category);
                self.retries.retain(|c| *c != category);
                tracing::debug!(category = %category, "Merged discovery answer");
                if is_current {
                    self.in_flight = None;
                    self.advance(now, self.timings.pacing);
                }
            }
            _ => {
                tracing::warn!(
                    category = %category,
                    response = response.response.as_deref().unwrap_or("-"),
                    description = response.description.as_deref().unwrap_or("-"),
                    "Discovery query rejected"
                );
                if is_current {
                    self.in_flight = None;
                    self.record_failure(category);
                    self.advance(now, self.timings.settle);
                }
            }
        }
        true
    }

    fn is_own(&self, response: &IntelliCenterResponse) -> bool {
        response
            .message_id
            .as_deref()
            .is_some_and(|id| self.sent.contains_key(id))
    }

    fn record_failure(&mut self, category: DiscoveryCategory) -> u32 {
        let count = self.failures.entry(category).or_insert(0);
        *count += 1;
        *count
    }

    fn send_next(&mut self, now: Instant) -> Option<DiscoveryAction> {
        let queue = match self.phase {
            Phase::FirstPass => &mut self.pending,
            Phase::RetryPass => &mut self.retries,
            _ => return None,
        };
        let Some(category) = queue.pop_front() else {
            // late answers emptied the queue
            self.advance(now, Duration::ZERO);
            return (self.phase == Phase::Completing)
                .then(|| DiscoveryAction::Complete(self.finish(now)));
        };
        let request = IntelliCenterRequest::discovery(category);
        self.sent.insert(request.message_id.clone(), category);
        self.in_flight = Some(InFlight {
            category,
            message_id: request.message_id.clone(),
            deadline: now + self.timings.timeout,
        });
        self.next_send_at = None;
        tracing::debug!(category = %category, message_id = %request.message_id, "Sending discovery query");
        Some(DiscoveryAction::Send(request))
    }

    /// Schedules the next query or moves to the next phase.
    fn advance(&mut self, now: Instant, delay: Duration) {
        if self.phase == Phase::FirstPass {
            if !self.pending.is_empty() {
                self.next_send_at = Some(now + delay);
                return;
            }
            self.retries = DiscoveryCategory::ALL
                .into_iter()
                .filter(|c| !self.succeeded.contains(c) && self.failures.get(c) == Some(&1))
                .collect();
            self.phase = Phase::RetryPass;
            if !self.retries.is_empty() {
                tracing::info!(count = self.retries.len(), "Retrying failed discovery queries");
                self.next_send_at = Some(now + self.timings.retry_pacing);
                return;
            }
        } else if self.phase == Phase::RetryPass && !self.retries.is_empty() {
            self.next_send_at = Some(now + self.timings.retry_pacing);
            return;
        }

        if self.phase == Phase::RetryPass {
            self.phase = Phase::Completing;
            self.next_send_at = None;
        }
    }

    fn finish(&mut self, now: Instant) -> DiscoveryOutcome {
        self.phase = Phase::Complete;
        let failed: BTreeSet<_> = DiscoveryCategory::ALL
            .into_iter()
            .filter(|c| !self.succeeded.contains(c))
            .collect();
        let elapsed = self
            .started_at
            .map(|s| now.saturating_duration_since(s))
            .unwrap_or_default();
        let outcome = DiscoveryOutcome {
            tree: std::mem::take(&mut self.tree),
            succeeded: std::mem::take(&mut self.succeeded),
            failed,
            elapsed,
        };
        if outcome.failed.is_empty() {
            tracing::info!(elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX), "Discovery complete");
        } else {
            let missing: Vec<&str> = outcome.failed.iter().map(DiscoveryCategory::as_str).collect();
            tracing::warn!(missing = ?missing, "Discovery complete with missing categories");
        }
        self.sent.clear();
        outcome
    }

    /// Message id of the query in flight.
    #[must_use]
    pub fn in_flight_message_id(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|f| f.message_id.as_str())
    }
}

impl Default for DiscoveryOrchestrator {
    fn default() -> Self {
        Self::new(DiscoveryTimings::default())
    }
}
