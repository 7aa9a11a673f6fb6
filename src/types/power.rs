// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! On/off status of controller circuits.

use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// The on/off status of a circuit, body, pump or pump-circuit.
///
/// # Examples
///
/// ```
/// use intellicenter_lib::types::CircuitStatus;
///
/// assert_eq!(CircuitStatus::On.as_str(), "ON");
/// assert_eq!("off".parse::<CircuitStatus>().unwrap(), CircuitStatus::Off);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CircuitStatus {
    /// Circuit is off.
    Off,
    /// Circuit is on.
    On,
}

impl CircuitStatus {
    /// Returns the wire representation (`"ON"` / `"OFF"`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }

    /// Returns `true` if the status is [`CircuitStatus::On`].
    #[must_use]
    pub const fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CircuitStatus {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OFF" | "0" | "FALSE" => Ok(Self::Off),
            "ON" | "1" | "TRUE" => Ok(Self::On),
            _ => Err(ValueError::InvalidStatus(s.to_string())),
        }
    }
}

impl From<bool> for CircuitStatus {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_as_str() {
        assert_eq!(CircuitStatus::Off.as_str(), "OFF");
        assert_eq!(CircuitStatus::On.as_str(), "ON");
    }

    #[test]
    fn status_from_str() {
        assert_eq!("ON".parse::<CircuitStatus>().unwrap(), CircuitStatus::On);
        assert_eq!("off".parse::<CircuitStatus>().unwrap(), CircuitStatus::Off);
        assert_eq!("1".parse::<CircuitStatus>().unwrap(), CircuitStatus::On);
        assert_eq!("false".parse::<CircuitStatus>().unwrap(), CircuitStatus::Off);
    }

    #[test]
    fn status_from_str_invalid() {
        let result = "DELAY".parse::<CircuitStatus>();
        assert!(matches!(result, Err(ValueError::InvalidStatus(_))));
    }

    #[test]
    fn status_from_bool() {
        assert_eq!(CircuitStatus::from(true), CircuitStatus::On);
        assert!(!CircuitStatus::from(false).is_on());
    }
}
