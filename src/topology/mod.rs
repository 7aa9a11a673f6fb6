// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed hardware topology.
//!
//! [`TopologyBuilder`] turns the merged discovery tree into panels,
//! modules, bodies, circuits, heaters, pumps and sensors, plus the index
//! maps and subscription requests the session needs afterwards.

mod builder;
mod heater_association;
mod model;

pub use builder::{
    BODY_KEYS, CIRCUIT_KEYS, PUMP_CIRCUIT_KEYS, PUMP_KEYS, SENSOR_KEYS, Topology, TopologyBuilder,
    TopologyOptions,
};
pub use heater_association::{Candidate, HeaterAssociation, ScoringThresholds, SpeedBandHeuristic};
pub use model::{
    Body, Circuit, Entity, Heater, HeaterInstance, HeaterKind, LightColor, Module, Panel, Pump,
    PumpCircuit, PumpMetrics, Sensor, SensorKind,
};
