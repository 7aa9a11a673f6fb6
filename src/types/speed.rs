// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pump speed units.
//!
//! Variable speed pumps are programmed per circuit either with a target
//! motor speed (RPM) or a target flow (GPM). The `SELECT` parameter of a
//! pump-circuit carries which one applies to its `SPEED` value.

use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// The unit a pump-circuit speed is expressed in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
pub enum SpeedType {
    /// Revolutions per minute.
    #[default]
    #[serde(rename = "RPM")]
    Rpm,
    /// Gallons per minute.
    #[serde(rename = "GPM")]
    Gpm,
}

impl SpeedType {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rpm => "RPM",
            Self::Gpm => "GPM",
        }
    }
}

impl fmt::Display for SpeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeedType {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "RPM" => Ok(Self::Rpm),
            "GPM" => Ok(Self::Gpm),
            _ => Err(ValueError::InvalidSpeedType(s.to_string())),
        }
    }
}
