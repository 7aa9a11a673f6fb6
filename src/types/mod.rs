// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared across the library.
//!
//! # Types
//!
//! - [`ObjectId`] - Stable protocol object name (`objnam`)
//! - [`CircuitStatus`] - On/Off status of a circuit
//! - [`SpeedType`] - RPM or GPM pump-circuit speed unit
//! - [`TemperatureUnit`] - Fahrenheit or Celsius controller configuration
//! - [`HeatMode`] - Decoded `HTMODE` code
//! - [`HeaterModeOverride`] - Forced heater `MODE` value (2-15)

mod heat_mode;
mod object_id;
mod power;
mod speed;
mod temperature;

pub use heat_mode::{HeatMode, HeaterModeOverride};
pub use object_id::ObjectId;
pub use power::CircuitStatus;
pub use speed::SpeedType;
pub use temperature::{TemperatureUnit, celsius_to_fahrenheit, fahrenheit_to_celsius};
