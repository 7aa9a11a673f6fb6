// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sliding-window counter of controller `ParseError` responses.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::event::ParseErrorLevel;

/// Errors in the window that raise the log level.
pub const ELEVATED_THRESHOLD: usize = 3;
/// Errors in the window that point at the controller firmware.
pub const FIRMWARE_THRESHOLD: usize = 4;
/// Errors in the window that force a reconnect.
pub const RECONNECT_THRESHOLD: usize = 10;

fn level_for(count: usize) -> Option<ParseErrorLevel> {
    match count {
        c if c >= RECONNECT_THRESHOLD => Some(ParseErrorLevel::Reconnect),
        c if c >= FIRMWARE_THRESHOLD => Some(ParseErrorLevel::FirmwareSuspect),
        c if c >= ELEVATED_THRESHOLD => Some(ParseErrorLevel::Elevated),
        _ => None,
    }
}

/// Outcome of recording one parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseErrorReport {
    /// Errors in the window, this one included.
    pub count: usize,
    /// Level for the current count.
    pub level: Option<ParseErrorLevel>,
    /// `true` if `level` is higher than the last reported one.
    pub escalated: bool,
}

/// Counts parse errors over a sliding window.
///
/// `Reconnect` is reported as escalated on every error until
/// [`reset`](Self::reset), so a storm that outlives one reconnect forces
/// another.
#[derive(Debug, Clone)]
pub struct ParseErrorTracker {
    window: Duration,
    seen: VecDeque<Instant>,
    reported: Option<ParseErrorLevel>,
}

impl ParseErrorTracker {
    /// Creates a tracker over `window`.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: VecDeque::new(),
            reported: None,
        }
    }

    fn prune(&mut self, now: Instant) {
        while self
            .seen
            .front()
            .is_some_and(|at| now.saturating_duration_since(*at) >= self.window)
        {
            self.seen.pop_front();
        }
        if self.reported > level_for(self.seen.len()) {
            self.reported = level_for(self.seen.len());
        }
    }

    /// Records an error at `now`.
    pub fn record(&mut self, now: Instant) -> ParseErrorReport {
        self.prune(now);
        self.seen.push_back(now);
        let count = self.seen.len();
        let level = level_for(count);
        let escalated = level.is_some()
            && (level > self.reported || level == Some(ParseErrorLevel::Reconnect));
        if escalated {
            self.reported = level;
        }
        ParseErrorReport {
            count,
            level,
            escalated,
        }
    }

    /// Errors currently in the window.
    pub fn count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.seen.len()
    }

    /// Forgets every error.
    pub fn reset(&mut self) {
        self.seen.clear();
        self.reported = None;
    }
}
