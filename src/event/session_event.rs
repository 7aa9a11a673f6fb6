// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session event types.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::protocol::DiscoveryCategory;
use crate::resilience::CircuitState;
use crate::state::StateChange;
use crate::telemetry::UnitAnalysis;
use crate::types::{ObjectId, TemperatureUnit};

/// Lifecycle of the controller connection.
///
/// `Disconnected → Connecting → Connected → Ready`, back to `Disconnected`
/// on close, error or end of stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    /// No socket.
    #[default]
    Disconnected,
    /// Connect attempt in progress.
    Connecting,
    /// Socket open, discovery running.
    Connected,
    /// Discovery finished; status updates flow.
    Ready,
}

impl ConnectionState {
    /// Returns `true` while a socket is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Ready)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Severity reached by the parse error counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ParseErrorLevel {
    /// A few errors in the window.
    Elevated,
    /// Enough to suspect the controller firmware.
    FirmwareSuspect,
    /// Enough to force a reconnect.
    Reconnect,
}

/// Events emitted by a session.
///
/// # Examples
///
/// ```
/// use intellicenter_lib::event::{ConnectionState, SessionEvent};
///
/// let event = SessionEvent::ConnectionChanged {
///     state: ConnectionState::Ready,
///     error: None,
/// };
/// assert!(event.is_connection());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SessionEvent {
    /// Connection state changed.
    ConnectionChanged {
        /// New state.
        state: ConnectionState,
        /// Why the connection went down, if it did.
        error: Option<String>,
    },

    /// A connect cycle failed; a reconnect is scheduled.
    ConnectFailed {
        /// Failure of the last attempt.
        error: String,
        /// Breaker state after the failure.
        breaker: CircuitState,
        /// Delay before the next cycle.
        retry_in: Duration,
    },

    /// Discovery finished and the topology was rebuilt.
    DiscoveryCompleted {
        /// Categories that answered.
        succeeded: Vec<DiscoveryCategory>,
        /// Categories that never answered.
        failed: Vec<DiscoveryCategory>,
        /// Wall time of the cycle.
        elapsed: Duration,
        /// Ids removed by orphan cleanup.
        removed: Vec<ObjectId>,
    },

    /// Discovery produced no data; the previous topology is kept.
    DiscoveryFailed {
        /// Categories that never answered.
        failed: Vec<DiscoveryCategory>,
    },

    /// Tracked state changed.
    StateChanged(StateChange),

    /// Readings suggest another temperature unit than configured.
    UnitMismatch {
        /// Unit in the configuration.
        configured: TemperatureUnit,
        /// What the readings suggest.
        analysis: UnitAnalysis,
    },

    /// Enough readings agree with the configured unit.
    UnitConfirmed(UnitAnalysis),

    /// A command was refused by the rate limiter and dropped.
    CommandDropped {
        /// Objects the command targeted.
        targets: Vec<ObjectId>,
    },

    /// A command could not be sent and went to the dead letter queue.
    CommandDeadLettered {
        /// Objects the command targeted.
        targets: Vec<ObjectId>,
        /// Send failure.
        error: String,
    },

    /// The parse error counter crossed a threshold.
    ParseErrorStorm {
        /// Errors in the current window.
        count: usize,
        /// Threshold reached.
        level: ParseErrorLevel,
    },
}

impl SessionEvent {
    /// Returns `true` for connection lifecycle events.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::ConnectionChanged { .. } | Self::ConnectFailed { .. }
        )
    }

    /// Returns the state change carried by the event, if any.
    #[must_use]
    pub fn state_change(&self) -> Option<&StateChange> {
        match self {
            Self::StateChanged(change) => Some(change),
            _ => None,
        }
    }
}
