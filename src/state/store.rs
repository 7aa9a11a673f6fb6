// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity arena and its indices.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::topology::{
    Body, Circuit, Entity, Heater, HeaterInstance, Module, Panel, Pump, PumpCircuit, PumpMetrics,
    Sensor, Topology,
};
use crate::types::ObjectId;

/// Store shared between the session task (sole writer) and readers.
pub type SharedStore = Arc<RwLock<EntityStore>>;

/// Returns `true` for accessory ids of retired sensor shapes.
///
/// Per-metric pump-circuit sensors (`p0101.rpm`) and combined pump sensors
/// (`PMP01.pumpsensor`) are no longer created and are always removed.
#[must_use]
pub fn is_legacy_id(id: &str) -> bool {
    if id.ends_with(".pumpsensor") {
        return true;
    }
    let Some((head, metric)) = id.split_once('.') else {
        return false;
    };
    !metric.is_empty()
        && head.len() > 1
        && head.starts_with('p')
        && head[1..].bytes().all(|b| b.is_ascii_digit())
}

/// Every known entity keyed by object id.
///
/// Index maps hold ids only, so an entity is mutated in exactly one place.
/// [`apply_topology`](Self::apply_topology) replaces the discovery-derived
/// indices in one step and prunes ids the latest discovery did not report.
///
/// # Examples
///
/// ```
/// use intellicenter_lib::state::EntityStore;
/// use intellicenter_lib::types::ObjectId;
///
/// let store = EntityStore::new();
/// assert!(store.is_empty());
/// assert!(store.body(&ObjectId::new("B1101")).is_none());
/// ```
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: HashMap<ObjectId, Entity>,
    panels: Vec<Panel>,
    modules: Vec<Module>,
    accessories: BTreeSet<ObjectId>,
    heaters: BTreeSet<ObjectId>,
    heater_instances: BTreeMap<ObjectId, HeaterInstance>,
    pump_to_circuits: HashMap<ObjectId, Vec<ObjectId>>,
    circuit_to_pump: HashMap<ObjectId, ObjectId>,
    pump_circuit_to_pump: HashMap<ObjectId, ObjectId>,
    active_pump_circuits: BTreeSet<ObjectId>,
    discovered_ids: BTreeSet<ObjectId>,
}

impl EntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shareable empty store.
    #[must_use]
    pub fn shared() -> SharedStore {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Number of entities in the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the arena is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Registers accessory ids known from a previous run.
    ///
    /// They carry no entity and are pruned by the next
    /// [`apply_topology`](Self::apply_topology) unless discovery reports them.
    pub fn restore_accessories(&mut self, ids: impl IntoIterator<Item = ObjectId>) {
        self.accessories.extend(ids);
    }

    /// Replaces all discovery-derived state with `topology`.
    ///
    /// Returns the ids removed by orphan cleanup.
    pub fn apply_topology(&mut self, topology: Topology) -> Vec<ObjectId> {
        let discovered = topology.discovered_ids();
        let Topology {
            panels,
            modules,
            circuits,
            bodies,
            heaters,
            heater_instances,
            pumps,
            pump_circuits,
            sensors,
            pump_to_circuits,
            circuit_to_pump,
            pump_circuit_to_pump,
            subscriptions: _,
        } = topology;

        self.pump_to_circuits = pump_to_circuits;
        self.circuit_to_pump = circuit_to_pump;
        self.pump_circuit_to_pump = pump_circuit_to_pump;
        self.panels = panels;
        self.modules = modules;
        self.active_pump_circuits.clear();

        for circuit in circuits {
            self.register(Entity::Circuit(circuit));
        }
        for body in bodies {
            self.register(Entity::Body(body));
        }
        for pump in pumps {
            self.register(Entity::Pump(pump));
        }
        for sensor in sensors {
            self.register(Entity::Sensor(sensor));
        }
        for pump_circuit in pump_circuits {
            if pump_circuit.is_active() {
                self.active_pump_circuits.insert(pump_circuit.id.clone());
            }
            self.entities
                .insert(pump_circuit.id.clone(), Entity::PumpCircuit(pump_circuit));
        }
        for heater in heaters {
            self.heaters.insert(heater.id.clone());
            self.entities.insert(heater.id.clone(), Entity::Heater(heater));
        }
        for instance in heater_instances {
            self.heater_instances.insert(instance.key.clone(), instance);
        }

        self.discovered_ids = discovered;
        self.remove_orphans()
    }

    fn register(&mut self, entity: Entity) {
        let id = entity.id().clone();
        self.accessories.insert(id.clone());
        self.entities.insert(id, entity);
    }

    fn remove_orphans(&mut self) -> Vec<ObjectId> {
        let stale = |id: &ObjectId| !self.discovered_ids.contains(id) || is_legacy_id(id.as_str());
        let removed: BTreeSet<ObjectId> = self
            .entities
            .keys()
            .chain(self.accessories.iter())
            .chain(self.heaters.iter())
            .chain(self.heater_instances.keys())
            .filter(|id| stale(id))
            .cloned()
            .collect();

        for id in &removed {
            self.remove(id);
            tracing::info!(object = %id, "Removed orphaned accessory");
        }
        removed.into_iter().collect()
    }

    /// Removes `id` from the arena and every index.
    pub fn remove(&mut self, id: &ObjectId) -> Option<Entity> {
        self.accessories.remove(id);
        self.heaters.remove(id);
        self.heater_instances.remove(id);
        self.active_pump_circuits.remove(id);
        self.discovered_ids.remove(id);
        self.pump_circuit_to_pump.remove(id);
        self.circuit_to_pump.remove(id);
        self.pump_to_circuits.remove(id);
        self.entities.remove(id)
    }

    /// Drops every entity and index.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Returns any entity.
    #[must_use]
    pub fn get(&self, id: &ObjectId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Returns any entity mutably.
    pub fn get_mut(&mut self, id: &ObjectId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    /// Returns `true` if `id` is a registered accessory with an entity.
    #[must_use]
    pub fn is_tracked(&self, id: &ObjectId) -> bool {
        self.accessories.contains(id) && self.entities.contains_key(id)
    }

    /// Returns a plain circuit.
    #[must_use]
    pub fn circuit(&self, id: &ObjectId) -> Option<&Circuit> {
        match self.entities.get(id)? {
            Entity::Circuit(c) => Some(c),
            _ => None,
        }
    }

    /// Returns a body.
    #[must_use]
    pub fn body(&self, id: &ObjectId) -> Option<&Body> {
        match self.entities.get(id)? {
            Entity::Body(b) => Some(b),
            _ => None,
        }
    }

    /// Returns a pump.
    #[must_use]
    pub fn pump(&self, id: &ObjectId) -> Option<&Pump> {
        match self.entities.get(id)? {
            Entity::Pump(p) => Some(p),
            _ => None,
        }
    }

    /// Returns a pump mutably.
    pub fn pump_mut(&mut self, id: &ObjectId) -> Option<&mut Pump> {
        match self.entities.get_mut(id)? {
            Entity::Pump(p) => Some(p),
            _ => None,
        }
    }

    /// Returns a pump-circuit.
    #[must_use]
    pub fn pump_circuit(&self, id: &ObjectId) -> Option<&PumpCircuit> {
        match self.entities.get(id)? {
            Entity::PumpCircuit(pc) => Some(pc),
            _ => None,
        }
    }

    /// Returns a pump-circuit mutably.
    pub fn pump_circuit_mut(&mut self, id: &ObjectId) -> Option<&mut PumpCircuit> {
        match self.entities.get_mut(id)? {
            Entity::PumpCircuit(pc) => Some(pc),
            _ => None,
        }
    }

    /// Returns a sensor.
    #[must_use]
    pub fn sensor(&self, id: &ObjectId) -> Option<&Sensor> {
        match self.entities.get(id)? {
            Entity::Sensor(s) => Some(s),
            _ => None,
        }
    }

    /// Returns a heater.
    #[must_use]
    pub fn heater(&self, id: &ObjectId) -> Option<&Heater> {
        match self.entities.get(id)? {
            Entity::Heater(h) => Some(h),
            _ => None,
        }
    }

    /// Returns a heater instance by its `<heater>.<body>` key.
    #[must_use]
    pub fn heater_instance(&self, key: &ObjectId) -> Option<&HeaterInstance> {
        self.heater_instances.get(key)
    }

    /// Returns the heater instances serving `body`.
    pub fn heater_instances_for<'a>(
        &'a self,
        body: &'a ObjectId,
    ) -> impl Iterator<Item = &'a HeaterInstance> + 'a {
        self.heater_instances.values().filter(move |h| &h.body == body)
    }

    /// All bodies.
    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.entities.values().filter_map(|e| match e {
            Entity::Body(b) => Some(b),
            _ => None,
        })
    }

    /// All sensors.
    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> {
        self.entities.values().filter_map(|e| match e {
            Entity::Sensor(s) => Some(s),
            _ => None,
        })
    }

    /// All pumps.
    pub fn pumps(&self) -> impl Iterator<Item = &Pump> {
        self.entities.values().filter_map(|e| match e {
            Entity::Pump(p) => Some(p),
            _ => None,
        })
    }

    /// Panels of the latest discovery.
    #[must_use]
    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    /// Modules of the latest discovery.
    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Registered accessory ids.
    #[must_use]
    pub fn accessory_ids(&self) -> &BTreeSet<ObjectId> {
        &self.accessories
    }

    /// Ids reported by the latest discovery.
    #[must_use]
    pub fn discovered_ids(&self) -> &BTreeSet<ObjectId> {
        &self.discovered_ids
    }

    /// Pump-circuits currently running.
    #[must_use]
    pub fn active_pump_circuits(&self) -> &BTreeSet<ObjectId> {
        &self.active_pump_circuits
    }

    /// Pump driving `circuit`.
    #[must_use]
    pub fn pump_for_circuit(&self, circuit: &ObjectId) -> Option<&ObjectId> {
        self.circuit_to_pump.get(circuit)
    }

    /// Circuits driven by `pump`.
    #[must_use]
    pub fn circuits_for_pump(&self, pump: &ObjectId) -> &[ObjectId] {
        self.pump_to_circuits.get(pump).map_or(&[], Vec::as_slice)
    }

    /// Pump owning `pump_circuit`.
    #[must_use]
    pub fn pump_for_pump_circuit(&self, pump_circuit: &ObjectId) -> Option<&ObjectId> {
        self.pump_circuit_to_pump.get(pump_circuit)
    }

    /// Records whether a pump-circuit runs.
    pub fn set_pump_circuit_active(&mut self, id: &ObjectId, active: bool) {
        if active {
            self.active_pump_circuits.insert(id.clone());
        } else {
            self.active_pump_circuits.remove(id);
        }
    }

    /// Adds a pump-circuit the controller reported outside discovery.
    ///
    /// Returns `false` if its pump is unknown.
    pub fn insert_pump_circuit(&mut self, pump_circuit: PumpCircuit) -> bool {
        let pump_id = pump_circuit.pump.clone();
        let id = pump_circuit.id.clone();
        let circuit_id = pump_circuit.circuit_id.clone();
        let Some(pump) = self.pump_mut(&pump_id) else {
            return false;
        };
        if !pump.circuits.contains(&id) {
            pump.circuits.push(id.clone());
        }

        if !circuit_id.as_str().is_empty() {
            let driven = self.pump_to_circuits.entry(pump_id.clone()).or_default();
            if !driven.contains(&circuit_id) {
                driven.push(circuit_id.clone());
            }
            self.circuit_to_pump.insert(circuit_id, pump_id.clone());
        }
        self.pump_circuit_to_pump.insert(id.clone(), pump_id);
        self.set_pump_circuit_active(&id, pump_circuit.is_active());
        self.discovered_ids.insert(id.clone());
        self.entities.insert(id, Entity::PumpCircuit(pump_circuit));
        true
    }

    /// Recomputes a pump's metrics from its fastest active pump-circuit.
    ///
    /// Fields the pump-circuit has not reported keep the pump's current
    /// value. A pump with no running pump-circuit reports zero. Returns the
    /// new metrics if they changed.
    pub fn refresh_pump_metrics(&mut self, pump_id: &ObjectId) -> Option<PumpMetrics> {
        let pump = self.pump(pump_id)?;
        let mut fastest: Option<&PumpCircuit> = None;
        for id in &pump.circuits {
            if !self.active_pump_circuits.contains(id) {
                continue;
            }
            if let Some(pc) = self.pump_circuit(id)
                && fastest.is_none_or(|f| pc.speed > f.speed)
            {
                fastest = Some(pc);
            }
        }

        let metrics = fastest.map_or(
            PumpMetrics {
                rpm: Some(0.0),
                gpm: Some(0.0),
                watts: Some(0.0),
            },
            |pc| PumpMetrics {
                rpm: pc.metrics.rpm.or(pump.metrics.rpm),
                gpm: pc.metrics.gpm.or(pump.metrics.gpm),
                watts: pc.metrics.watts.or(pump.metrics.watts),
            },
        );
        let pump = self.pump_mut(pump_id)?;
        if pump.metrics == metrics {
            return None;
        }
        pump.metrics = metrics;
        Some(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{SpeedBandHeuristic, TopologyBuilder, TopologyOptions};
    use crate::types::CircuitStatus;
    use serde_json::json;

    fn tree(with_spa: bool) -> serde_json::Value {
        let mut circuits = vec![
            json!({"objnam": "B1101", "params": {"OBJTYP": "BODY", "SUBTYP": "POOL", "SNAME": "Pool"}}),
            json!({"objnam": "C0003", "params": {"OBJTYP": "CIRCUIT", "SUBTYP": "GENERIC", "SNAME": "Jets", "FEATR": "ON"}}),
            json!({"objnam": "H0001", "params": {"OBJTYP": "HEATER", "SNAME": "Gas", "BODY": "B1101 B1202"}}),
        ];
        if with_spa {
            circuits.push(json!({"objnam": "B1202", "params": {"OBJTYP": "BODY", "SUBTYP": "SPA", "SNAME": "Spa"}}));
        }
        json!([{"objnam": "INCR", "params": {"OBJLIST": [
            {"objnam": "M0101", "params": {"OBJTYP": "MODULE", "CIRCUITS": circuits}},
            {"objnam": "PMP01", "params": {"OBJTYP": "PUMP", "SNAME": "Pump", "OBJLIST": [
                {"objnam": "p0101", "params": {"CIRCUIT": "B1101", "SPEED": "2000", "SELECT": "RPM", "STATUS": "ON"}},
                {"objnam": "p0102", "params": {"CIRCUIT": "C0003", "SPEED": "3000", "SELECT": "RPM", "STATUS": "OFF"}}
            ]}}
        ]}}])
    }

    fn topology(with_spa: bool) -> Topology {
        let heuristic = SpeedBandHeuristic::default();
        TopologyBuilder::new(TopologyOptions::default(), &heuristic).build(&tree(with_spa))
    }

    #[test]
    fn legacy_ids() {
        assert!(is_legacy_id("p0101.rpm"));
        assert!(is_legacy_id("PMP01.pumpsensor"));
        assert!(!is_legacy_id("p0101"));
        assert!(!is_legacy_id("H0001.B1101"));
        assert!(!is_legacy_id("p.rpm"));
        assert!(!is_legacy_id("p0101."));
    }

    #[test]
    fn apply_registers_entities() {
        let mut store = EntityStore::new();
        let removed = store.apply_topology(topology(true));
        assert!(removed.is_empty());

        assert!(store.body(&ObjectId::new("B1202")).is_some());
        assert!(store.is_tracked(&ObjectId::new("C0003")));
        assert!(store.heater(&ObjectId::new("H0001")).is_some());
        assert!(store.heater_instance(&ObjectId::new("H0001.B1202")).is_some());
        assert_eq!(
            store.pump_for_circuit(&ObjectId::new("C0003")).map(ObjectId::as_str),
            Some("PMP01")
        );
        assert_eq!(store.circuits_for_pump(&ObjectId::new("PMP01")).len(), 2);
        assert!(store.active_pump_circuits().contains(&ObjectId::new("p0101")));
        assert!(!store.active_pump_circuits().contains(&ObjectId::new("p0102")));
    }

    #[test]
    fn orphan_cleanup_clears_every_index() {
        let mut store = EntityStore::new();
        store.apply_topology(topology(true));
        let removed = store.apply_topology(topology(false));

        assert!(removed.contains(&ObjectId::new("B1202")));
        assert!(removed.contains(&ObjectId::new("H0001.B1202")));
        assert!(store.body(&ObjectId::new("B1202")).is_none());
        assert!(!store.accessory_ids().contains(&ObjectId::new("B1202")));
        assert!(store.heater_instance(&ObjectId::new("H0001.B1202")).is_none());
        assert!(store.heater_instance(&ObjectId::new("H0001.B1101")).is_some());
        assert!(store.heater(&ObjectId::new("H0001")).is_some());
    }

    #[test]
    fn restored_and_legacy_ids_are_pruned() {
        let mut store = EntityStore::new();
        store.restore_accessories([
            ObjectId::new("p0101.rpm"),
            ObjectId::new("PMP01.pumpsensor"),
            ObjectId::new("C0099"),
            ObjectId::new("C0003"),
        ]);
        let removed = store.apply_topology(topology(true));
        let removed: Vec<_> = removed.iter().map(ObjectId::as_str).collect();
        assert_eq!(removed, vec!["C0099", "PMP01.pumpsensor", "p0101.rpm"]);
        assert!(store.accessory_ids().contains(&ObjectId::new("C0003")));
    }

    #[test]
    fn pump_metrics_follow_fastest_active_circuit() {
        let mut store = EntityStore::new();
        store.apply_topology(topology(true));
        let pump = ObjectId::new("PMP01");

        let slow = ObjectId::new("p0101");
        store.pump_circuit_mut(&slow).unwrap().metrics.rpm = Some(2000.0);
        let fast = ObjectId::new("p0102");
        store.pump_circuit_mut(&fast).unwrap().metrics.rpm = Some(3000.0);

        let metrics = store.refresh_pump_metrics(&pump).unwrap();
        assert_eq!(metrics.rpm, Some(2000.0));

        store.set_pump_circuit_active(&fast, true);
        let metrics = store.refresh_pump_metrics(&pump).unwrap();
        assert_eq!(metrics.rpm, Some(3000.0));
        assert!(store.refresh_pump_metrics(&pump).is_none());

        store.set_pump_circuit_active(&fast, false);
        store.set_pump_circuit_active(&slow, false);
        let metrics = store.refresh_pump_metrics(&pump).unwrap();
        assert_eq!(metrics.rpm, Some(0.0));
    }

    #[test]
    fn insert_synthesized_pump_circuit() {
        let mut store = EntityStore::new();
        store.apply_topology(topology(true));

        let pc = PumpCircuit {
            id: ObjectId::new("p0105"),
            pump: ObjectId::new("PMP01"),
            speed: 2600,
            status: Some(CircuitStatus::On),
            ..PumpCircuit::default()
        };
        assert!(store.insert_pump_circuit(pc));
        assert!(store.pump(&ObjectId::new("PMP01")).unwrap().circuits.contains(&ObjectId::new("p0105")));
        assert!(store.active_pump_circuits().contains(&ObjectId::new("p0105")));

        let orphan = PumpCircuit {
            id: ObjectId::new("p0901"),
            pump: ObjectId::new("PMP09"),
            ..PumpCircuit::default()
        };
        assert!(!store.insert_pump_circuit(orphan));
    }

    #[test]
    fn clear_resets_everything() {
        let mut store = EntityStore::new();
        store.apply_topology(topology(true));
        store.clear();
        assert!(store.is_empty());
        assert!(store.accessory_ids().is_empty());
        assert!(store.discovered_ids().is_empty());
    }
}
