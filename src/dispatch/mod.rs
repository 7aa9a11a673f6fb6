// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Routing of inbound status updates.
//!
//! Each `objectList` entry is matched against the store in a fixed order
//! and the first match wins:
//!
//! 1. a known pump-circuit
//! 2. a tracked accessory (circuit, body, sensor or pump)
//! 3. an unknown id carrying `SPEED` and `SELECT`, taken as a pump-circuit
//!    the controller never reported during discovery
//! 4. anything else, logged for diagnostics only
//!
//! Only parameters present in the update overwrite tracked values. Numeric
//! values that fail to parse are logged and skipped.

use crate::protocol::{ObjectParams, keys};
use crate::state::{EntityStore, StateChange};
use crate::topology::{Body, Circuit, Entity, LightColor, Pump, PumpCircuit, PumpMetrics, Sensor};
use crate::types::{CircuitStatus, HeatMode, ObjectId, SpeedType, TemperatureUnit};

/// Which rule matched an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Known pump-circuit.
    PumpCircuit,
    /// Tracked accessory.
    Tracked,
    /// Pump-circuit synthesized from an unknown id.
    StandalonePump,
    /// Nothing matched.
    Unregistered,
}

/// Outcome of routing one update.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Matched rule.
    pub route: Route,
    /// Changes applied to the store.
    pub changes: Vec<StateChange>,
}

impl Dispatch {
    fn new(route: Route, changes: Vec<StateChange>) -> Self {
        Self { route, changes }
    }
}

/// Applies status updates to an [`EntityStore`].
#[derive(Debug, Clone, Copy)]
pub struct Router {
    unit: TemperatureUnit,
}

fn number(update: &ObjectParams, key: &str) -> Option<f64> {
    match update.number(key) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(object = %update.objnam, key, error = %e, "Skipping invalid numeric value");
            None
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn small(update: &ObjectParams, key: &str) -> Option<u8> {
    number(update, key)
        .filter(|v| (0.0..=f64::from(u8::MAX)).contains(v))
        .map(|v| v.round() as u8)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn speed(update: &ObjectParams) -> Option<u32> {
    number(update, keys::SPEED)
        .filter(|v| *v >= 0.0 && *v <= f64::from(u32::MAX))
        .map(|v| v.round() as u32)
}

fn speed_type(update: &ObjectParams) -> Option<SpeedType> {
    let raw = update.text(keys::SELECT)?;
    match raw.parse() {
        Ok(t) => Some(t),
        Err(e) => {
            tracing::warn!(object = %update.objnam, error = %e, "Ignoring speed type");
            None
        }
    }
}

/// `STATUS`, falling back to `ACT`.
fn status(update: &ObjectParams) -> Option<CircuitStatus> {
    let raw = update
        .text(keys::STATUS)
        .or_else(|| update.text(keys::ACT))?;
    match raw.parse() {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::debug!(object = %update.objnam, error = %e, "Ignoring status");
            None
        }
    }
}

fn non_empty_id(update: &ObjectParams, key: &str) -> Option<ObjectId> {
    update
        .text(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(ObjectId::new)
}

fn apply_metrics(metrics: &mut PumpMetrics, update: &ObjectParams) {
    if let Some(rpm) = number(update, keys::RPM) {
        metrics.rpm = Some(rpm);
    }
    if let Some(gpm) = number(update, keys::GPM) {
        metrics.gpm = Some(gpm);
    }
    if let Some(watts) = number(update, keys::WATTS) {
        metrics.watts = Some(watts);
    }
}

fn status_change(id: &ObjectId, slot: &mut Option<CircuitStatus>, update: &ObjectParams) -> Option<StateChange> {
    let status = status(update)?;
    if *slot == Some(status) {
        return None;
    }
    *slot = Some(status);
    Some(StateChange::circuit_status(id.clone(), status))
}

impl Router {
    /// Creates a router converting temperatures from `unit`.
    #[must_use]
    pub fn new(unit: TemperatureUnit) -> Self {
        Self { unit }
    }

    fn temperature(&self, update: &ObjectParams, key: &str) -> Option<f64> {
        number(update, key).map(|v| self.unit.from_device(v))
    }

    /// Routes one update and applies it to `store`.
    pub fn route(&self, store: &mut EntityStore, update: &ObjectParams) -> Dispatch {
        let id = &update.objnam;

        if store.pump_circuit(id).is_some() {
            return Dispatch::new(Route::PumpCircuit, self.update_pump_circuit(store, update));
        }

        if store.is_tracked(id) {
            let changes = match store.get_mut(id) {
                Some(Entity::Circuit(circuit)) => Self::update_circuit(circuit, update),
                Some(Entity::Body(body)) => self.update_body(body, update),
                Some(Entity::Sensor(sensor)) => self.update_sensor(sensor, update),
                Some(Entity::Pump(pump)) => Self::update_pump(pump, update),
                _ => Vec::new(),
            };
            return Dispatch::new(Route::Tracked, changes);
        }

        if update.has(keys::SPEED)
            && update.has(keys::SELECT)
            && let Some(changes) = self.synthesize_pump_circuit(store, update)
        {
            return Dispatch::new(Route::StandalonePump, changes);
        }

        tracing::debug!(object = %id, params = %update.dump(), "Update for unregistered object");
        Dispatch::new(Route::Unregistered, Vec::new())
    }

    /// Routes every entry of a response and returns all changes.
    pub fn route_all<'a>(
        &self,
        store: &mut EntityStore,
        updates: impl IntoIterator<Item = &'a ObjectParams>,
    ) -> Vec<StateChange> {
        updates
            .into_iter()
            .flat_map(|update| self.route(store, update).changes)
            .collect()
    }

    #[allow(clippy::unused_self)]
    fn update_pump_circuit(&self, store: &mut EntityStore, update: &ObjectParams) -> Vec<StateChange> {
        let id = &update.objnam;
        let Some(pc) = store.pump_circuit_mut(id) else {
            return Vec::new();
        };
        let before = pc.clone();

        if let Some(status) = status(update) {
            pc.status = Some(status);
        }
        if let Some(speed) = speed(update) {
            pc.speed = speed;
        }
        if let Some(speed_type) = speed_type(update) {
            pc.speed_type = speed_type;
        }
        apply_metrics(&mut pc.metrics, update);

        let mut changes = Vec::new();
        if (pc.status, pc.speed, pc.speed_type, pc.metrics)
            != (before.status, before.speed, before.speed_type, before.metrics)
        {
            changes.push(StateChange::PumpCircuit {
                id: id.clone(),
                pump: pc.pump.clone(),
                status: pc.status,
                speed: pc.speed,
                speed_type: pc.speed_type,
                metrics: pc.metrics,
            });
        }
        let pump = pc.pump.clone();
        let active = pc.is_active();

        store.set_pump_circuit_active(id, active);
        if let Some(metrics) = store.refresh_pump_metrics(&pump) {
            changes.push(StateChange::PumpMetrics { pump, metrics });
        }
        changes
    }

    fn synthesize_pump_circuit(
        &self,
        store: &mut EntityStore,
        update: &ObjectParams,
    ) -> Option<Vec<StateChange>> {
        let id = &update.objnam;
        let pump = store
            .pump_for_pump_circuit(id)
            .cloned()
            .or_else(|| id.pump_for_pump_circuit())?;
        let pump_circuit = PumpCircuit {
            id: id.clone(),
            pump: pump.clone(),
            circuit_id: non_empty_id(update, "CIRCUIT").unwrap_or_default(),
            ..PumpCircuit::default()
        };
        if !store.insert_pump_circuit(pump_circuit) {
            return None;
        }
        tracing::info!(object = %id, pump = %pump, "Tracking pump-circuit reported outside discovery");

        let mut changes = self.update_pump_circuit(store, update);
        if !changes.iter().any(|c| matches!(c, StateChange::PumpCircuit { .. }))
            && let Some(pc) = store.pump_circuit(id)
        {
            changes.insert(
                0,
                StateChange::PumpCircuit {
                    id: id.clone(),
                    pump,
                    status: pc.status,
                    speed: pc.speed,
                    speed_type: pc.speed_type,
                    metrics: pc.metrics,
                },
            );
        }
        Some(changes)
    }

    fn update_circuit(circuit: &mut Circuit, update: &ObjectParams) -> Vec<StateChange> {
        let mut changes: Vec<StateChange> =
            status_change(&circuit.id, &mut circuit.status, update).into_iter().collect();

        if circuit.is_color_light()
            && let Some(raw) = update.text(keys::USE).filter(|s| !s.trim().is_empty())
        {
            let color = LightColor::from_use(&raw);
            if circuit.color.as_ref() != Some(&color) {
                circuit.color = Some(color.clone());
                changes.push(StateChange::Color {
                    id: circuit.id.clone(),
                    color,
                });
            }
        }
        changes
    }

    fn update_body(&self, body: &mut Body, update: &ObjectParams) -> Vec<StateChange> {
        let id = body.circuit.id.clone();
        let mut changes: Vec<StateChange> =
            status_change(&id, &mut body.circuit.status, update).into_iter().collect();

        if let Some(celsius) = self.temperature(update, keys::LSTTMP)
            && body.temperature != Some(celsius)
        {
            body.temperature = Some(celsius);
            changes.push(StateChange::Temperature {
                id: id.clone(),
                celsius,
            });
        }

        let range = (body.low_temperature, body.high_temperature);
        if let Some(low) = self.temperature(update, keys::LOTMP) {
            body.low_temperature = Some(low);
        }
        if let Some(high) = self.temperature(update, keys::HITMP) {
            body.high_temperature = Some(high);
        }
        if range != (body.low_temperature, body.high_temperature) {
            changes.push(StateChange::TemperatureRange {
                id: id.clone(),
                low: body.low_temperature,
                high: body.high_temperature,
            });
        }

        let mode = (
            body.heater_id.clone(),
            body.heat_source.clone(),
            body.heat_mode,
            body.mode,
        );
        if let Some(heater) = non_empty_id(update, keys::HEATER) {
            body.heater_id = heater;
        }
        if update.has(keys::HTSRC) {
            body.heat_source = non_empty_id(update, keys::HTSRC);
        }
        if let Some(code) = small(update, keys::HTMODE) {
            body.heat_mode = Some(HeatMode::from_code(code));
        }
        if let Some(raw) = small(update, keys::MODE) {
            body.mode = Some(raw);
        }
        if mode != (body.heater_id.clone(), body.heat_source.clone(), body.heat_mode, body.mode) {
            changes.push(StateChange::HeatMode {
                id,
                heater_id: body.heater_id.clone(),
                heat_source: body.heat_source.clone(),
                heat_mode: body.heat_mode,
                mode: body.mode,
            });
        }
        changes
    }

    fn update_sensor(&self, sensor: &mut Sensor, update: &ObjectParams) -> Vec<StateChange> {
        match self.temperature(update, keys::PROBE) {
            Some(celsius) if sensor.probe != Some(celsius) => {
                sensor.probe = Some(celsius);
                vec![StateChange::SensorReading {
                    id: sensor.id.clone(),
                    celsius,
                }]
            }
            _ => Vec::new(),
        }
    }

    fn update_pump(pump: &mut Pump, update: &ObjectParams) -> Vec<StateChange> {
        let id = pump.circuit.id.clone();
        let mut changes: Vec<StateChange> =
            status_change(&id, &mut pump.circuit.status, update).into_iter().collect();

        let before = pump.metrics;
        apply_metrics(&mut pump.metrics, update);
        if pump.metrics != before {
            changes.push(StateChange::PumpMetrics {
                pump: id,
                metrics: pump.metrics,
            });
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{SpeedBandHeuristic, TopologyBuilder, TopologyOptions};
    use serde_json::json;

    fn store() -> EntityStore {
        let tree = json!([{"objnam": "INCR", "params": {"OBJLIST": [
            {"objnam": "M0101", "params": {"OBJTYP": "MODULE", "CIRCUITS": [
                {"objnam": "B1101", "params": {"OBJTYP": "BODY", "SUBTYP": "POOL", "SNAME": "Pool", "HEATER": "00000"}},
                {"objnam": "C0003", "params": {"OBJTYP": "CIRCUIT", "SUBTYP": "INTELLI", "SNAME": "Lights", "FEATR": "ON"}},
                {"objnam": "H0001", "params": {"OBJTYP": "HEATER", "SNAME": "Gas", "BODY": "B1101"}}
            ]}},
            {"objnam": "PMP01", "params": {"OBJTYP": "PUMP", "SNAME": "Pump", "OBJLIST": [
                {"objnam": "p0101", "params": {"CIRCUIT": "B1101", "SPEED": "2000", "SELECT": "RPM"}},
                {"objnam": "p0102", "params": {"CIRCUIT": "C0003", "SPEED": "3000", "SELECT": "RPM"}}
            ]}},
            {"objnam": "SSW11", "params": {"OBJTYP": "SENSE", "SUBTYP": "POOL", "SNAME": "Water"}}
        ]}}]);
        let heuristic = SpeedBandHeuristic::default();
        let topology = TopologyBuilder::new(TopologyOptions::default(), &heuristic).build(&tree);
        let mut store = EntityStore::new();
        store.apply_topology(topology);
        store
    }

    fn router() -> Router {
        Router::new(TemperatureUnit::Fahrenheit)
    }

    #[test]
    fn pump_circuit_update_cascades_metrics() {
        let mut store = store();
        let update = ObjectParams::new("p0102", [("STATUS", "ON"), ("RPM", "3000"), ("WATTS", "1200")]);
        let dispatch = router().route(&mut store, &update);

        assert_eq!(dispatch.route, Route::PumpCircuit);
        assert!(matches!(dispatch.changes[0], StateChange::PumpCircuit { status: Some(CircuitStatus::On), .. }));
        let StateChange::PumpMetrics { pump, metrics } = &dispatch.changes[1] else {
            panic!("expected pump metrics");
        };
        assert_eq!(pump.as_str(), "PMP01");
        assert_eq!(metrics.rpm, Some(3000.0));
        assert_eq!(metrics.watts, Some(1200.0));
        assert!(store.active_pump_circuits().contains(&ObjectId::new("p0102")));
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let mut store = store();
        let id = ObjectId::new("p0101");
        router().route(&mut store, &ObjectParams::new("p0101", [("SPEED", "2400"), ("GPM", "40")]));
        router().route(&mut store, &ObjectParams::new("p0101", [("RPM", "2400")]));

        let pc = store.pump_circuit(&id).unwrap();
        assert_eq!(pc.speed, 2400);
        assert_eq!(pc.metrics.gpm, Some(40.0));
        assert_eq!(pc.metrics.rpm, Some(2400.0));
        assert_eq!(pc.speed_type, SpeedType::Rpm);
    }

    #[test]
    fn body_update_converts_and_reports() {
        let mut store = store();
        let update = ObjectParams::new(
            "B1101",
            [("LSTTMP", "77"), ("LOTMP", "86"), ("HEATER", "H0001"), ("HTMODE", "4"), ("HTSRC", "H0001")],
        );
        let dispatch = router().route(&mut store, &update);
        assert_eq!(dispatch.route, Route::Tracked);
        assert_eq!(dispatch.changes.len(), 3);

        let body = store.body(&ObjectId::new("B1101")).unwrap();
        assert!((body.temperature.unwrap() - 25.0).abs() < 1e-9);
        assert!((body.low_temperature.unwrap() - 30.0).abs() < 1e-9);
        assert_eq!(body.heat_mode, Some(HeatMode::Heating(4)));
        assert_eq!(body.heat_source, Some(ObjectId::new("H0001")));

        // unchanged values are not reported again
        let again = router().route(&mut store, &update);
        assert!(again.changes.is_empty());
    }

    #[test]
    fn invalid_numbers_are_skipped() {
        let mut store = store();
        let update = ObjectParams::new("SSW11", [("PROBE", "n/a")]);
        let dispatch = router().route(&mut store, &update);
        assert_eq!(dispatch.route, Route::Tracked);
        assert!(dispatch.changes.is_empty());

        let update = ObjectParams::new("SSW11", [("PROBE", "50")]);
        let dispatch = router().route(&mut store, &update);
        assert!(matches!(dispatch.changes[0], StateChange::SensorReading { celsius, .. } if (celsius - 10.0).abs() < 1e-9));
    }

    #[test]
    fn color_light_reports_color() {
        let mut store = store();
        let update = ObjectParams::new("C0003", [("STATUS", "ON"), ("USE", "ROYAL")]);
        let dispatch = router().route(&mut store, &update);
        assert_eq!(dispatch.changes.len(), 2);
        assert!(matches!(&dispatch.changes[1], StateChange::Color { color: LightColor::Royal, .. }));
    }

    #[test]
    fn unknown_pump_circuit_is_synthesized() {
        let mut store = store();
        let update = ObjectParams::new("p0103", [("SPEED", "2750"), ("SELECT", "RPM"), ("STATUS", "ON")]);
        let dispatch = router().route(&mut store, &update);

        assert_eq!(dispatch.route, Route::StandalonePump);
        assert!(store.pump_circuit(&ObjectId::new("p0103")).is_some());
        assert!(store
            .pump(&ObjectId::new("PMP01"))
            .unwrap()
            .circuits
            .contains(&ObjectId::new("p0103")));

        // the next update takes the known pump-circuit path
        let next = router().route(&mut store, &ObjectParams::new("p0103", [("RPM", "2750")]));
        assert_eq!(next.route, Route::PumpCircuit);
    }

    #[test]
    fn unregistered_objects_are_left_alone() {
        let mut store = store();
        let count = store.len();
        let dispatch = router().route(&mut store, &ObjectParams::new("V0101", [("STATUS", "ON")]));
        assert_eq!(dispatch.route, Route::Unregistered);
        assert!(dispatch.changes.is_empty());

        // SPEED and SELECT without a resolvable pump
        let dispatch = router().route(
            &mut store,
            &ObjectParams::new("X0001", [("SPEED", "10"), ("SELECT", "GPM")]),
        );
        assert_eq!(dispatch.route, Route::Unregistered);
        assert_eq!(store.len(), count);
    }

    #[test]
    fn pump_direct_metrics() {
        let mut store = store();
        let changes = router().route_all(
            &mut store,
            [&ObjectParams::new("PMP01", [("STATUS", "ON"), ("GPM", "55")])],
        );
        assert_eq!(changes.len(), 2);
        assert_eq!(store.pump(&ObjectId::new("PMP01")).unwrap().metrics.gpm, Some(55.0));
    }

    #[test]
    fn pump_metrics_survive_pump_circuit_without_readings() {
        let mut store = store();
        let pump = ObjectId::new("PMP01");
        router().route(&mut store, &ObjectParams::new("PMP01", [("GPM", "55"), ("RPM", "2750")]));

        let dispatch = router().route(&mut store, &ObjectParams::new("p0101", [("STATUS", "ON")]));
        assert!(!dispatch.changes.iter().any(|c| matches!(c, StateChange::PumpMetrics { .. })));

        let metrics = store.pump(&pump).unwrap().metrics;
        assert_eq!(metrics.gpm, Some(55.0));
        assert_eq!(metrics.rpm, Some(2750.0));

        // a reading on the running pump-circuit replaces only that field
        let dispatch = router().route(&mut store, &ObjectParams::new("p0101", [("RPM", "2000")]));
        assert!(dispatch.changes.iter().any(|c| matches!(c, StateChange::PumpMetrics { .. })));
        let metrics = store.pump(&pump).unwrap().metrics;
        assert_eq!(metrics.rpm, Some(2000.0));
        assert_eq!(metrics.gpm, Some(55.0));
    }

    #[test]
    fn idle_pump_circuit_reports_metric_changes() {
        let mut store = store();
        let update = ObjectParams::new("p0102", [("RPM", "1800"), ("WATTS", "400")]);
        let dispatch = router().route(&mut store, &update);

        let StateChange::PumpCircuit { id, status, metrics, .. } = &dispatch.changes[0] else {
            panic!("expected pump-circuit change");
        };
        assert_eq!(id.as_str(), "p0102");
        assert_eq!(*status, None);
        assert_eq!(metrics.rpm, Some(1800.0));
        assert_eq!(metrics.watts, Some(400.0));

        assert!(router().route(&mut store, &update).changes.is_empty());
    }
}
