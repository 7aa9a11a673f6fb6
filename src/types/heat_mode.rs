// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Heating mode codes.

use std::fmt;

use crate::error::ValueError;

/// Operating submode of a body's heat source, from the `HTMODE` parameter.
///
/// | Code | Meaning |
/// |------|---------|
/// | 0    | idle    |
/// | 1-8  | heating (solar, heat pump, gas, ...) |
/// | 9    | cooling |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum HeatMode {
    /// No heat source is running.
    Idle,
    /// A heating variant is running.
    Heating(u8),
    /// The heat pump is cooling.
    Cooling,
    /// A code outside the documented range.
    Unknown(u8),
}

impl HeatMode {
    /// Decodes an `HTMODE` code.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Idle,
            1..=8 => Self::Heating(code),
            9 => Self::Cooling,
            other => Self::Unknown(other),
        }
    }

    /// Returns the raw code.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Heating(code) | Self::Unknown(code) => *code,
            Self::Cooling => 9,
        }
    }

    /// Returns `true` for any heating variant.
    #[must_use]
    pub const fn is_heating(&self) -> bool {
        matches!(self, Self::Heating(_))
    }

    /// Returns `true` when cooling.
    #[must_use]
    pub const fn is_cooling(&self) -> bool {
        matches!(self, Self::Cooling)
    }
}

impl fmt::Display for HeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Heating(code) => write!(f, "heating({code})"),
            Self::Cooling => write!(f, "cooling"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

/// A forced `MODE` value sent alongside heater selection (2-15).
///
/// Mode 1 means "heat source off" on the wire, so it is rejected with a
/// dedicated error instead of a plain range error.
///
/// # Examples
///
/// ```
/// use intellicenter_lib::types::HeaterModeOverride;
///
/// assert_eq!(HeaterModeOverride::new(5).unwrap().value(), 5);
/// assert!(HeaterModeOverride::new(1).is_err());
/// assert!(HeaterModeOverride::new(16).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct HeaterModeOverride(u8);

impl HeaterModeOverride {
    /// Minimum accepted override.
    pub const MIN: u8 = 2;
    /// Maximum accepted override.
    pub const MAX: u8 = 15;

    /// Creates an override after validating its range.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::HeaterModeOff`] for 1 and
    /// [`ValueError::OutOfRange`] for anything else outside 2-15.
    pub fn new(value: u8) -> Result<Self, ValueError> {
        if value == 1 {
            return Err(ValueError::HeaterModeOff);
        }
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(ValueError::OutOfRange {
                min: i32::from(Self::MIN),
                max: i32::from(Self::MAX),
                actual: i32::from(value),
            });
        }
        Ok(Self(value))
    }

    /// Returns the override value.
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }
}

impl<'de> serde::Deserialize<'de> for HeaterModeOverride {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}
