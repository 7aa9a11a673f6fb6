// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State change representation.
//!
//! Every status update the router applies to the
//! [`EntityStore`](super::EntityStore) is reported as one or more
//! [`StateChange`]s, which the session forwards to callbacks and the event
//! bus. Only values that actually changed are reported.
//!
//! # Change Types
//!
//! - [`StateChange::CircuitStatus`] - On/off status of a circuit, body or pump
//! - [`StateChange::Temperature`] - Water temperature of a body
//! - [`StateChange::TemperatureRange`] - Heating/cooling set points
//! - [`StateChange::HeatMode`] - Heater selection and heat source
//! - [`StateChange::PumpCircuit`] - Speed table entry changes
//! - [`StateChange::PumpMetrics`] - RPM/GPM/WATTS of a pump
//! - [`StateChange::Color`] - Colour light show
//! - [`StateChange::SensorReading`] - Sensor probe value
//! - [`StateChange::EntityRemoved`] - Orphan cleanup removed an entity
//! - [`StateChange::Batch`] - Multiple changes grouped together
//!
//! # Examples
//!
//! ```
//! use intellicenter_lib::state::StateChange;
//! use intellicenter_lib::types::{CircuitStatus, ObjectId};
//!
//! let change = StateChange::circuit_status(ObjectId::new("C0003"), CircuitStatus::On);
//! assert_eq!(change.object_id().map(ObjectId::as_str), Some("C0003"));
//! ```

use crate::topology::{LightColor, PumpMetrics};
use crate::types::{CircuitStatus, HeatMode, ObjectId, SpeedType};

/// A change in tracked entity state.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum StateChange {
    /// On/off status changed.
    CircuitStatus {
        /// Circuit, body or pump id.
        id: ObjectId,
        /// New status.
        status: CircuitStatus,
    },

    /// Water temperature of a body changed (°C).
    Temperature {
        /// Body id.
        id: ObjectId,
        /// New reading.
        celsius: f64,
    },

    /// Set points of a body changed (°C).
    TemperatureRange {
        /// Body id.
        id: ObjectId,
        /// Heating set point.
        low: Option<f64>,
        /// Cooling set point.
        high: Option<f64>,
    },

    /// Heater selection or heat source of a body changed.
    HeatMode {
        /// Body id.
        id: ObjectId,
        /// Selected heater.
        heater_id: ObjectId,
        /// Engaged heat source.
        heat_source: Option<ObjectId>,
        /// Decoded `HTMODE`.
        heat_mode: Option<HeatMode>,
        /// Raw `MODE`.
        mode: Option<u8>,
    },

    /// A pump speed table entry changed.
    PumpCircuit {
        /// Pump-circuit id.
        id: ObjectId,
        /// Owning pump.
        pump: ObjectId,
        /// Status.
        status: Option<CircuitStatus>,
        /// Configured speed.
        speed: u32,
        /// Unit of `speed`.
        speed_type: SpeedType,
        /// Last reported RPM/GPM/WATTS of this entry.
        metrics: PumpMetrics,
    },

    /// Pump metrics changed.
    PumpMetrics {
        /// Pump id.
        pump: ObjectId,
        /// New metrics.
        metrics: PumpMetrics,
    },

    /// Light colour changed.
    Color {
        /// Circuit id.
        id: ObjectId,
        /// New colour or show.
        color: LightColor,
    },

    /// Sensor probe changed (°C).
    SensorReading {
        /// Sensor id.
        id: ObjectId,
        /// New reading.
        celsius: f64,
    },

    /// Entity was removed by orphan cleanup.
    EntityRemoved {
        /// Removed id.
        id: ObjectId,
    },

    /// Multiple changes at once.
    Batch(Vec<StateChange>),
}

impl StateChange {
    /// Creates a status change.
    #[must_use]
    pub fn circuit_status(id: ObjectId, status: CircuitStatus) -> Self {
        Self::CircuitStatus { id, status }
    }

    /// Creates a batch of changes.
    #[must_use]
    pub fn batch(changes: Vec<StateChange>) -> Self {
        Self::Batch(changes)
    }

    /// Returns the object the change targets. `None` for batches.
    #[must_use]
    pub fn object_id(&self) -> Option<&ObjectId> {
        match self {
            Self::CircuitStatus { id, .. }
            | Self::Temperature { id, .. }
            | Self::TemperatureRange { id, .. }
            | Self::HeatMode { id, .. }
            | Self::PumpCircuit { id, .. }
            | Self::Color { id, .. }
            | Self::SensorReading { id, .. }
            | Self::EntityRemoved { id } => Some(id),
            Self::PumpMetrics { pump, .. } => Some(pump),
            Self::Batch(_) => None,
        }
    }

    /// Returns `true` for body temperature and set point changes.
    #[must_use]
    pub fn is_temperature(&self) -> bool {
        matches!(
            self,
            Self::Temperature { .. } | Self::TemperatureRange { .. } | Self::SensorReading { .. }
        )
    }

    /// Returns `true` for pump related changes.
    #[must_use]
    pub fn is_pump(&self) -> bool {
        matches!(self, Self::PumpCircuit { .. } | Self::PumpMetrics { .. })
    }

    /// Returns the number of individual changes, counting into batches.
    #[must_use]
    pub fn change_count(&self) -> usize {
        match self {
            Self::Batch(changes) => changes.iter().map(Self::change_count).sum(),
            _ => 1,
        }
    }

    /// Flattens nested batches into individual changes.
    #[must_use]
    pub fn flatten(self) -> Vec<StateChange> {
        match self {
            Self::Batch(changes) => changes.into_iter().flat_map(Self::flatten).collect(),
            other => vec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on(id: &str) -> StateChange {
        StateChange::circuit_status(ObjectId::new(id), CircuitStatus::On)
    }

    #[test]
    fn object_id_of_changes() {
        assert_eq!(on("C0001").object_id().map(ObjectId::as_str), Some("C0001"));
        let metrics = StateChange::PumpMetrics {
            pump: ObjectId::new("PMP01"),
            metrics: PumpMetrics::default(),
        };
        assert_eq!(metrics.object_id().map(ObjectId::as_str), Some("PMP01"));
        assert!(metrics.is_pump());
        assert!(StateChange::batch(vec![]).object_id().is_none());
    }

    #[test]
    fn change_count_and_flatten() {
        let batch = StateChange::batch(vec![on("C0001"), on("C0002")]);
        assert_eq!(batch.change_count(), 2);

        let nested = StateChange::batch(vec![batch, on("C0003")]);
        assert_eq!(nested.change_count(), 3);

        let flat = nested.flatten();
        assert_eq!(flat.len(), 3);
        assert!(flat.iter().all(|c| !matches!(c, StateChange::Batch(_))));
    }

    #[test]
    fn temperature_changes() {
        let change = StateChange::SensorReading {
            id: ObjectId::new("SSW11"),
            celsius: 25.0,
        };
        assert!(change.is_temperature());
        assert!(!on("C0001").is_temperature());
    }
}
