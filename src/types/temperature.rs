// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Temperature units and conversions.
//!
//! The controller reports and accepts temperatures in whatever unit it is
//! configured for. Collaborators work in Celsius; conversion happens at the
//! edge via [`TemperatureUnit::to_device`] and [`TemperatureUnit::from_device`].

use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// Converts degrees Fahrenheit to degrees Celsius.
#[must_use]
pub fn fahrenheit_to_celsius(value: f64) -> f64 {
    (value - 32.0) * 5.0 / 9.0
}

/// Converts degrees Celsius to degrees Fahrenheit.
#[must_use]
pub fn celsius_to_fahrenheit(value: f64) -> f64 {
    value * 9.0 / 5.0 + 32.0
}

/// Temperature unit the controller is configured for.
///
/// # Examples
///
/// ```
/// use intellicenter_lib::types::TemperatureUnit;
///
/// let unit: TemperatureUnit = "F".parse().unwrap();
/// assert_eq!(unit.to_device(25.0), 77.0);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
pub enum TemperatureUnit {
    /// Degrees Fahrenheit.
    #[default]
    #[serde(rename = "F", alias = "fahrenheit", alias = "Fahrenheit")]
    Fahrenheit,
    /// Degrees Celsius.
    #[serde(rename = "C", alias = "celsius", alias = "Celsius")]
    Celsius,
}

impl TemperatureUnit {
    /// Returns the short unit symbol.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Fahrenheit => "F",
            Self::Celsius => "C",
        }
    }

    /// Converts a Celsius value into this unit.
    #[must_use]
    pub fn to_device(&self, celsius: f64) -> f64 {
        match self {
            Self::Fahrenheit => celsius_to_fahrenheit(celsius),
            Self::Celsius => celsius,
        }
    }

    /// Converts a value expressed in this unit into Celsius.
    #[must_use]
    pub fn from_device(&self, value: f64) -> f64 {
        match self {
            Self::Fahrenheit => fahrenheit_to_celsius(value),
            Self::Celsius => value,
        }
    }

    /// Plausible configuration range for min/max temperature bounds.
    #[must_use]
    pub const fn plausible_bounds(&self) -> (f64, f64) {
        match self {
            Self::Fahrenheit => (32.0, 120.0),
            Self::Celsius => (0.0, 50.0),
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "°{}", self.symbol())
    }
}

impl FromStr for TemperatureUnit {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "F" | "FAHRENHEIT" => Ok(Self::Fahrenheit),
            "C" | "CELSIUS" => Ok(Self::Celsius),
            _ => Err(ValueError::InvalidTemperatureUnit(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_are_inverse() {
        for c in [-10.0, 0.0, 25.0, 40.0] {
            let back = fahrenheit_to_celsius(celsius_to_fahrenheit(c));
            assert!((back - c).abs() < 1e-9);
        }
    }

    #[test]
    fn known_points() {
        assert!((celsius_to_fahrenheit(25.0) - 77.0).abs() < 1e-9);
        assert!((fahrenheit_to_celsius(104.0) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn parse_units() {
        assert_eq!("f".parse::<TemperatureUnit>().unwrap(), TemperatureUnit::Fahrenheit);
        assert_eq!("Celsius".parse::<TemperatureUnit>().unwrap(), TemperatureUnit::Celsius);
        assert!("K".parse::<TemperatureUnit>().is_err());
    }

    #[test]
    fn device_round_trip() {
        let unit = TemperatureUnit::Celsius;
        assert!((unit.to_device(21.5) - 21.5).abs() < f64::EPSILON);
        assert!((unit.from_device(21.5) - 21.5).abs() < f64::EPSILON);
    }

    #[test]
    fn serde_uses_symbols() {
        let json = serde_json::to_string(&TemperatureUnit::Celsius).unwrap();
        assert_eq!(json, "\"C\"");
        let unit: TemperatureUnit = serde_json::from_str("\"F\"").unwrap();
        assert_eq!(unit, TemperatureUnit::Fahrenheit);
    }
}
