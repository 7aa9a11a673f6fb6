// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Heating control helpers.
//!
//! Builds set point and heater selection commands for a body, and resolves
//! what a body's heater is doing right now. Set points are given in Celsius
//! and converted to the controller's unit at the edge.
//!
//! # Examples
//!
//! ```
//! use intellicenter_lib::heating::HeatingLimits;
//! use intellicenter_lib::types::{ObjectId, TemperatureUnit};
//!
//! let limits = HeatingLimits::new(TemperatureUnit::Fahrenheit, 40.0, 104.0);
//! let request = limits.set_point(&ObjectId::new("B1101"), 25.0).unwrap();
//! let params = request.object_list[0].params.as_ref().unwrap();
//! assert_eq!(params["LOTMP"], "77");
//! ```

use crate::config::SessionConfig;
use crate::error::ValueError;
use crate::protocol::{IntelliCenterRequest, keys};
use crate::topology::Body;
use crate::types::{HeatMode, HeaterModeOverride, ObjectId, TemperatureUnit};

/// What a body's heater is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum HeatingState {
    /// Not heating or cooling.
    Off,
    /// Heating.
    Heat,
    /// Cooling.
    Cool,
}

/// Unit, bounds and mode override applied to heating commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatingLimits {
    unit: TemperatureUnit,
    min: f64,
    max: f64,
    mode_override: Option<HeaterModeOverride>,
}

impl HeatingLimits {
    /// Creates limits; `min` and `max` are in `unit`.
    #[must_use]
    pub fn new(unit: TemperatureUnit, min: f64, max: f64) -> Self {
        Self {
            unit,
            min,
            max,
            mode_override: None,
        }
    }

    /// Forces a heater `MODE` whenever a heater is selected.
    #[must_use]
    pub fn with_mode_override(mut self, mode: HeaterModeOverride) -> Self {
        self.mode_override = Some(mode);
        self
    }

    /// Limits taken from a session configuration.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            unit: config.temperature_unit,
            min: config.min_temperature,
            max: config.max_temperature,
            mode_override: config.heater_mode(),
        }
    }

    /// Converts `celsius` to a whole device value within the bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::NonFiniteTemperature`] for NaN or infinities.
    // bounded by the configured range, far inside i64
    #[allow(clippy::cast_possible_truncation)]
    pub fn device_value(&self, celsius: f64) -> Result<i64, ValueError> {
        if !celsius.is_finite() {
            return Err(ValueError::NonFiniteTemperature(celsius.to_string()));
        }
        let value = self.unit.to_device(celsius).round().max(self.min).min(self.max);
        Ok(value.round() as i64)
    }

    fn set_temperature(
        &self,
        body: &ObjectId,
        key: &'static str,
        celsius: f64,
    ) -> Result<IntelliCenterRequest, ValueError> {
        let value = self.device_value(celsius)?;
        tracing::debug!(object = %body, key, celsius, value, unit = %self.unit, "Set point command");
        Ok(IntelliCenterRequest::set_params(
            body.clone(),
            [(key, value.to_string())],
        ))
    }

    /// Heating set point (`LOTMP`).
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::NonFiniteTemperature`] for NaN or infinities.
    pub fn set_point(&self, body: &ObjectId, celsius: f64) -> Result<IntelliCenterRequest, ValueError> {
        self.set_temperature(body, keys::LOTMP, celsius)
    }

    /// Cooling set point (`HITMP`).
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::NonFiniteTemperature`] for NaN or infinities.
    pub fn cooling_set_point(
        &self,
        body: &ObjectId,
        celsius: f64,
    ) -> Result<IntelliCenterRequest, ValueError> {
        self.set_temperature(body, keys::HITMP, celsius)
    }

    /// Selects `heater` for `body`, or turns heating off with `None`.
    #[must_use]
    pub fn heat_mode(&self, body: &ObjectId, heater: Option<&ObjectId>) -> IntelliCenterRequest {
        let mut params = vec![(
            keys::HEATER,
            heater.map_or_else(|| ObjectId::NO_HEATER.to_string(), ToString::to_string),
        )];
        if heater.is_some()
            && let Some(mode) = self.mode_override
        {
            params.push((keys::MODE, mode.value().to_string()));
        }
        IntelliCenterRequest::set_params(body.clone(), params)
    }
}

/// Resolves the current heating state of `body`.
///
/// An explicit `HTMODE` wins: 1-8 heat, 9 cools, 0 is off. Without one, an
/// engaged heat source means heating. Only then is the water temperature
/// compared with the set points of the selected heater.
#[must_use]
pub fn resolve_heating_state(body: &Body) -> HeatingState {
    match body.heat_mode {
        Some(HeatMode::Heating(_)) => return HeatingState::Heat,
        Some(HeatMode::Cooling) => return HeatingState::Cool,
        Some(HeatMode::Idle) => return HeatingState::Off,
        Some(HeatMode::Unknown(_)) | None => {}
    }

    if body
        .heat_source
        .as_ref()
        .is_some_and(|source| !source.is_no_heater() && !source.as_str().is_empty())
    {
        return HeatingState::Heat;
    }

    if body.selected_heater().is_none() || !body.circuit.status.is_some_and(|s| s.is_on()) {
        return HeatingState::Off;
    }
    match (body.temperature, body.low_temperature, body.high_temperature) {
        (Some(t), Some(low), _) if t < low => HeatingState::Heat,
        (Some(t), _, Some(high)) if t > high => HeatingState::Cool,
        _ => HeatingState::Off,
    }
}
