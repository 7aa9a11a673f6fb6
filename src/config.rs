// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session configuration.
//!
//! [`SessionConfig`] carries everything a [`Session`](crate::Session) needs
//! to reach and interpret a controller. It can be assembled with
//! [`SessionConfig::builder`] or decoded from the JSON document a host
//! application already stores (camelCase keys such as `ipAddress`).
//!
//! Validation reports every invalid setting, not only the first.

use std::net::IpAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigIssue};
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};
use crate::topology::ScoringThresholds;
use crate::types::{HeaterModeOverride, TemperatureUnit};

/// Default Telnet port of the controller.
pub const DEFAULT_PORT: u16 = 6681;

/// Default receive buffer bound (1 MiB).
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;

const MIN_BUFFER_SIZE: usize = 1024;
const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Every duration and threshold the session uses.
///
/// Defaults match what a real controller needs; tests shrink them.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTimings {
    /// How often the heartbeat checks for silence.
    pub heartbeat_interval: Duration,
    /// Silence after which an open socket is considered dead.
    pub silence_threshold: Duration,
    /// Delay before reconnecting after a closure.
    pub reconnect_delay: Duration,
    /// Minimum spacing between two reconnects.
    pub reconnect_debounce: Duration,
    /// Fixed spacing between two outbound commands.
    pub command_delay: Duration,
    /// Per-query discovery timeout.
    pub discovery_timeout: Duration,
    /// Spacing between successful discovery queries.
    pub discovery_pacing: Duration,
    /// Spacing between discovery retries.
    pub discovery_retry_pacing: Duration,
    /// Settle delay after a discovery timeout.
    pub discovery_settle: Duration,
    /// Timeout of the TCP reachability pre-check.
    pub reachability_timeout: Duration,
    /// Poll interval of the temperature unit monitor.
    pub monitor_interval: Duration,
    /// Total lifetime of the temperature unit monitor.
    pub monitor_duration: Duration,
    /// Sliding window of the parse-error counter.
    pub parse_error_window: Duration,
    /// Outbound commands allowed per `rate_limit_window`.
    pub rate_limit_capacity: u32,
    /// Rate limiter refill window.
    pub rate_limit_window: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(60),
            silence_threshold: Duration::from_secs(4 * 60 * 60),
            reconnect_delay: Duration::from_secs(30),
            reconnect_debounce: Duration::from_secs(30),
            command_delay: Duration::from_millis(200),
            discovery_timeout: Duration::from_secs(30),
            discovery_pacing: Duration::from_millis(500),
            discovery_retry_pacing: Duration::from_secs(1),
            discovery_settle: Duration::from_secs(1),
            reachability_timeout: Duration::from_secs(5),
            monitor_interval: Duration::from_secs(30),
            monitor_duration: Duration::from_secs(5 * 60),
            parse_error_window: Duration::from_secs(5 * 60),
            rate_limit_capacity: 40,
            rate_limit_window: Duration::from_secs(60),
        }
    }
}

impl SessionTimings {
    fn check(&self, issues: &mut Vec<ConfigIssue>) {
        let required = [
            ("timings.heartbeatInterval", self.heartbeat_interval),
            ("timings.silenceThreshold", self.silence_threshold),
            ("timings.reconnectDelay", self.reconnect_delay),
            ("timings.discoveryTimeout", self.discovery_timeout),
            ("timings.reachabilityTimeout", self.reachability_timeout),
            ("timings.monitorInterval", self.monitor_interval),
            ("timings.parseErrorWindow", self.parse_error_window),
            ("timings.rateLimitWindow", self.rate_limit_window),
        ];
        for (field, value) in required {
            if value.is_zero() {
                issues.push(ConfigIssue::new(field, "must be greater than zero"));
            }
        }
        if self.rate_limit_capacity == 0 {
            issues.push(ConfigIssue::new(
                "timings.rateLimitCapacity",
                "must allow at least one command",
            ));
        }
    }
}

/// Configuration of a controller session.
///
/// # Examples
///
/// ```
/// use intellicenter_lib::SessionConfig;
/// use intellicenter_lib::types::TemperatureUnit;
///
/// let config = SessionConfig::builder()
///     .host("192.168.1.40")
///     .temperature_unit(TemperatureUnit::Fahrenheit)
///     .temperature_bounds(40.0, 104.0)
///     .build()
///     .unwrap();
/// assert_eq!(config.port, 6681);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Controller host name or IP address.
    #[serde(rename = "ipAddress")]
    pub host: String,
    /// Controller Telnet port.
    pub port: u16,
    /// Username. The controller does not authenticate Telnet sessions.
    pub username: Option<String>,
    /// Password. The controller does not authenticate Telnet sessions.
    pub password: Option<String>,
    /// Unit the controller is configured for.
    #[serde(rename = "temperatureUnits")]
    pub temperature_unit: TemperatureUnit,
    /// Lowest settable temperature, in `temperature_unit`.
    #[serde(rename = "minimumTemperature")]
    pub min_temperature: f64,
    /// Highest settable temperature, in `temperature_unit`.
    #[serde(rename = "maximumTemperature")]
    pub max_temperature: f64,
    /// Bound of the receive buffer in bytes.
    pub max_buffer_size: usize,
    /// Track every circuit, not only features.
    pub include_all_circuits: bool,
    /// Track the air temperature sensor.
    pub air_temp: bool,
    /// Forced heater `MODE` value sent with heat-mode commands.
    pub heater_mode_override: Option<u8>,
    /// Skip the TCP reachability pre-check.
    pub skip_reachability_check: bool,
    /// Timers and thresholds.
    #[serde(skip)]
    pub timings: SessionTimings,
    /// Retry policy of connection attempts.
    #[serde(skip)]
    pub retry: RetryPolicy,
    /// Circuit breaker guarding connection attempts.
    #[serde(skip)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Heater to pump-circuit association thresholds.
    #[serde(skip)]
    pub heater_scoring: ScoringThresholds,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            temperature_unit: TemperatureUnit::Fahrenheit,
            min_temperature: 40.0,
            max_temperature: 104.0,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            include_all_circuits: false,
            air_temp: true,
            heater_mode_override: None,
            skip_reachability_check: false,
            timings: SessionTimings::default(),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            heater_scoring: ScoringThresholds::default(),
        }
    }
}

impl SessionConfig {
    /// Starts a builder with default settings.
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Decodes and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] if the document cannot be decoded
    /// and [`ConfigError::Invalid`] if any setting is out of range.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every setting and reports all problems at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing each invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();

        let host = self.host.trim();
        if host.is_empty() {
            issues.push(ConfigIssue::new("ipAddress", "must not be empty"));
        } else if !is_valid_host(host) {
            issues.push(ConfigIssue::new(
                "ipAddress",
                format!("'{host}' is not a valid IP address or host name"),
            ));
        }

        if self.port == 0 {
            issues.push(ConfigIssue::new("port", "must not be 0"));
        }

        let min = self.min_temperature;
        let max = self.max_temperature;
        if !min.is_finite() {
            issues.push(ConfigIssue::new("minimumTemperature", "must be a finite number"));
        }
        if !max.is_finite() {
            issues.push(ConfigIssue::new("maximumTemperature", "must be a finite number"));
        }
        if min.is_finite() && max.is_finite() {
            if min >= max {
                issues.push(ConfigIssue::new(
                    "minimumTemperature",
                    format!("{min} must be lower than maximumTemperature {max}"),
                ));
            }
            let (low, high) = self.temperature_unit.plausible_bounds();
            let unit = self.temperature_unit.symbol();
            for (field, value) in [("minimumTemperature", min), ("maximumTemperature", max)] {
                if !(low..=high).contains(&value) {
                    issues.push(ConfigIssue::new(
                        field,
                        format!("{value} is outside {low}-{high} {unit}"),
                    ));
                }
            }
        }

        if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&self.max_buffer_size) {
            issues.push(ConfigIssue::new(
                "maxBufferSize",
                format!(
                    "{} is outside {MIN_BUFFER_SIZE}-{MAX_BUFFER_SIZE} bytes",
                    self.max_buffer_size
                ),
            ));
        }

        if let Some(mode) = self.heater_mode_override
            && let Err(e) = HeaterModeOverride::new(mode)
        {
            issues.push(ConfigIssue::new("heaterModeOverride", e.to_string()));
        }

        self.timings.check(&mut issues);

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }

    /// Returns the validated heater mode override, if one is configured.
    #[must_use]
    pub fn heater_mode(&self) -> Option<HeaterModeOverride> {
        self.heater_mode_override
            .and_then(|m| HeaterModeOverride::new(m).ok())
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        let host = self.host.trim();
        if host.contains(':') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

fn is_valid_host(host: &str) -> bool {
    if host.parse::<IpAddr>().is_ok() {
        return true;
    }
    host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Consuming builder for [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Sets the controller host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the controller port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the (unused by the controller) credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    /// Sets the controller temperature unit.
    #[must_use]
    pub fn temperature_unit(mut self, unit: TemperatureUnit) -> Self {
        self.config.temperature_unit = unit;
        self
    }

    /// Sets the settable temperature range, in the configured unit.
    #[must_use]
    pub fn temperature_bounds(mut self, min: f64, max: f64) -> Self {
        self.config.min_temperature = min;
        self.config.max_temperature = max;
        self
    }

    /// Sets the receive buffer bound.
    #[must_use]
    pub fn max_buffer_size(mut self, bytes: usize) -> Self {
        self.config.max_buffer_size = bytes;
        self
    }

    /// Tracks every circuit, not only features.
    #[must_use]
    pub fn include_all_circuits(mut self, include: bool) -> Self {
        self.config.include_all_circuits = include;
        self
    }

    /// Enables or disables the air temperature sensor.
    #[must_use]
    pub fn air_temp(mut self, enabled: bool) -> Self {
        self.config.air_temp = enabled;
        self
    }

    /// Forces a heater `MODE` value on heat-mode commands.
    #[must_use]
    pub fn heater_mode_override(mut self, mode: u8) -> Self {
        self.config.heater_mode_override = Some(mode);
        self
    }

    /// Skips the TCP reachability pre-check.
    #[must_use]
    pub fn skip_reachability_check(mut self, skip: bool) -> Self {
        self.config.skip_reachability_check = skip;
        self
    }

    /// Replaces all timings.
    #[must_use]
    pub fn timings(mut self, timings: SessionTimings) -> Self {
        self.config.timings = timings;
        self
    }

    /// Replaces the connection retry policy.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Replaces the circuit breaker settings.
    #[must_use]
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = config;
        self
    }

    /// Replaces the heater association thresholds.
    #[must_use]
    pub fn heater_scoring(mut self, thresholds: ScoringThresholds) -> Self {
        self.config.heater_scoring = thresholds;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing each invalid setting.
    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
