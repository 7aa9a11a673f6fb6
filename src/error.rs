// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `IntelliCenter` library.
//!
//! This module provides the error hierarchy for handling failures across the
//! library: value validation, configuration, connection and framing problems,
//! JSON parsing, and the resilience guards around the connection.

use std::fmt;

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// The session configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error occurred during protocol communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while parsing a controller message.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A resilience guard refused or aborted the operation.
    #[error("resilience error: {0}")]
    Resilience(#[from] ResilienceError),

    /// The session task has stopped and no longer accepts requests.
    #[error("session is shut down")]
    SessionClosed,
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A numeric value is outside the allowed range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Minimum allowed value.
        min: i32,
        /// Maximum allowed value.
        max: i32,
        /// The actual value that was provided.
        actual: i32,
    },

    /// An invalid circuit status string was provided.
    #[error("invalid circuit status: {0}")]
    InvalidStatus(String),

    /// An invalid temperature unit string was provided.
    #[error("invalid temperature unit: {0}")]
    InvalidTemperatureUnit(String),

    /// An invalid pump speed type was provided.
    #[error("invalid speed type: {0}")]
    InvalidSpeedType(String),

    /// Heater mode 1 means "heat source off" on the wire and cannot be forced.
    #[error("heater mode 1 turns the heat source off and cannot be used as an override")]
    HeaterModeOff,

    /// A temperature value is not a finite number.
    #[error("temperature {0} is not a finite number")]
    NonFiniteTemperature(String),
}

/// A single configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// The configuration field the problem relates to.
    pub field: &'static str,
    /// Human readable description of the problem.
    pub message: String,
}

impl ConfigIssue {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors related to session configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more configuration values are invalid.
    #[error("{} invalid setting(s): {}", .0.len(), join_issues(.0))]
    Invalid(Vec<ConfigIssue>),

    /// The configuration document could not be decoded.
    #[error("malformed configuration: {0}")]
    Malformed(String),
}

impl ConfigError {
    /// Returns the individual issues, if any.
    #[must_use]
    pub fn issues(&self) -> &[ConfigIssue] {
        match self {
            Self::Invalid(issues) => issues,
            Self::Malformed(_) => &[],
        }
    }
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors related to the Telnet transport and wire framing.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Socket level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection to the controller failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation timed out.
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// Invalid host or address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The socket is not connected.
    #[error("not connected")]
    NotConnected,

    /// The receive buffer grew past its configured bound.
    #[error("receive buffer exceeded {limit} bytes, {dropped} bytes dropped")]
    BufferOverflow {
        /// Configured buffer bound in bytes.
        limit: usize,
        /// Number of bytes discarded.
        dropped: usize,
    },

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

impl ProtocolError {
    /// Returns `true` if this error is a transient connectivity failure
    /// that is worth retrying (refused, timed out, unreachable).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::HostUnreachable
                    | std::io::ErrorKind::NetworkUnreachable
            ),
            _ => false,
        }
    }

    /// Returns `true` if this error means the socket is no longer usable.
    #[must_use]
    pub fn is_connection_related(&self) -> bool {
        match self {
            Self::NotConnected | Self::ConnectionFailed(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Errors related to parsing controller messages.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The line is not a brace-delimited JSON object.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Expected field is missing from the message.
    #[error("missing field: {0}")]
    MissingField(String),

    /// Failed to parse a specific value.
    #[error("failed to parse {field}: {message}")]
    InvalidValue {
        /// The field that failed to parse.
        field: String,
        /// Description of the parsing failure.
        message: String,
    },
}

/// Errors raised by the resilience primitives.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The circuit breaker is open and rejected the call.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// All retry attempts failed.
    #[error("gave up after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The error of the final attempt.
        last_error: ProtocolError,
    },

    /// The operation failed with an error that is not retried.
    #[error("non-retryable failure: {0}")]
    NonRetryable(ProtocolError),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_error_display() {
        let err = ValueError::OutOfRange {
            min: 2,
            max: 15,
            actual: 20,
        };
        assert_eq!(err.to_string(), "value 20 is out of range [2, 15]");
    }

    #[test]
    fn config_error_lists_every_issue() {
        let err = ConfigError::Invalid(vec![
            ConfigIssue::new("ipAddress", "must not be empty"),
            ConfigIssue::new("port", "must not be 0"),
        ]);
        let text = err.to_string();
        assert!(text.starts_with("2 invalid setting(s)"));
        assert!(text.contains("ipAddress: must not be empty"));
        assert!(text.contains("port: must not be 0"));
        assert_eq!(err.issues().len(), 2);
    }

    #[test]
    fn retryable_classification() {
        let refused = ProtocolError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(refused.is_retryable());
        assert!(ProtocolError::Timeout(5000).is_retryable());

        let denied = ProtocolError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(!denied.is_retryable());
        assert!(!ProtocolError::InvalidAddress("x".into()).is_retryable());
    }

    #[test]
    fn connection_related_classification() {
        let reset = ProtocolError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(reset.is_connection_related());
        assert!(ProtocolError::NotConnected.is_connection_related());
        assert!(!ProtocolError::Timeout(1).is_connection_related());
    }

    #[test]
    fn error_from_value_error() {
        let err: Error = ValueError::HeaterModeOff.into();
        assert!(matches!(err, Error::Value(ValueError::HeaterModeOff)));
    }
}
