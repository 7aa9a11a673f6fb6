// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Walks a merged discovery tree into typed entities.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use super::heater_association::{Candidate, HeaterAssociation};
use super::model::{
    Body, Circuit, Heater, HeaterInstance, HeaterKind, LightColor, Module, Panel, Pump,
    PumpCircuit, Sensor, SensorKind,
};
use crate::protocol::{IntelliCenterRequest, RequestObject, keys};
use crate::types::{CircuitStatus, HeatMode, ObjectId, SpeedType, TemperatureUnit};

/// Keys subscribed for every body.
pub const BODY_KEYS: [&str; 8] = [
    keys::STATUS,
    keys::LSTTMP,
    keys::HTSRC,
    keys::HEATER,
    keys::HTMODE,
    keys::MODE,
    keys::HITMP,
    keys::LOTMP,
];

/// Keys subscribed for every pump-circuit.
pub const PUMP_CIRCUIT_KEYS: [&str; 7] = [
    keys::STATUS,
    keys::ACT,
    keys::SPEED,
    keys::SELECT,
    keys::RPM,
    keys::GPM,
    keys::WATTS,
];

/// Keys subscribed for every pump.
pub const PUMP_KEYS: [&str; 4] = [keys::STATUS, keys::RPM, keys::GPM, keys::WATTS];

/// Keys subscribed for every circuit.
pub const CIRCUIT_KEYS: [&str; 3] = [keys::STATUS, keys::ACT, keys::USE];

/// Keys subscribed for every sensor.
pub const SENSOR_KEYS: [&str; 2] = [keys::PROBE, keys::STATUS];

/// What to keep while walking the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyOptions {
    /// Keep non-feature circuits too.
    pub include_all_circuits: bool,
    /// Keep the air temperature sensor.
    pub air_temp: bool,
    /// Unit of temperatures in the tree.
    pub unit: TemperatureUnit,
}

impl Default for TopologyOptions {
    fn default() -> Self {
        Self {
            include_all_circuits: false,
            air_temp: true,
            unit: TemperatureUnit::Fahrenheit,
        }
    }
}

/// Everything one discovery cycle produced.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// Panels.
    pub panels: Vec<Panel>,
    /// Modules of all panels.
    pub modules: Vec<Module>,
    /// Tracked circuits and features.
    pub circuits: Vec<Circuit>,
    /// Bodies of water.
    pub bodies: Vec<Body>,
    /// Heaters.
    pub heaters: Vec<Heater>,
    /// One entry per heater and body it serves.
    pub heater_instances: Vec<HeaterInstance>,
    /// Pumps.
    pub pumps: Vec<Pump>,
    /// Pump speed table entries.
    pub pump_circuits: Vec<PumpCircuit>,
    /// Sensors.
    pub sensors: Vec<Sensor>,
    /// Pump to driven circuits.
    pub pump_to_circuits: HashMap<ObjectId, Vec<ObjectId>>,
    /// Driven circuit to pump.
    pub circuit_to_pump: HashMap<ObjectId, ObjectId>,
    /// Pump-circuit to pump.
    pub pump_circuit_to_pump: HashMap<ObjectId, ObjectId>,
    /// Subscription requests to send once the topology is in place.
    pub subscriptions: Vec<IntelliCenterRequest>,
}

impl Topology {
    /// Every id this discovery cycle knows about.
    #[must_use]
    pub fn discovered_ids(&self) -> BTreeSet<ObjectId> {
        let mut ids = BTreeSet::new();
        ids.extend(self.circuits.iter().map(|c| c.id.clone()));
        ids.extend(self.bodies.iter().map(|b| b.circuit.id.clone()));
        ids.extend(self.heaters.iter().map(|h| h.id.clone()));
        ids.extend(self.heater_instances.iter().map(|h| h.key.clone()));
        ids.extend(self.pumps.iter().map(|p| p.circuit.id.clone()));
        ids.extend(self.pump_circuits.iter().map(|pc| pc.id.clone()));
        ids.extend(self.sensors.iter().map(|s| s.id.clone()));
        ids
    }

    /// Returns `true` if nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
            && self.circuits.is_empty()
            && self.bodies.is_empty()
            && self.pumps.is_empty()
            && self.sensors.is_empty()
    }
}

fn params(item: &Value) -> Option<&Value> {
    item.get("params")
}

fn objnam(item: &Value) -> Option<ObjectId> {
    item.get("objnam")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ObjectId::new)
}

fn text<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str).map(str::trim)
}

fn number(params: &Value, key: &str) -> Option<f64> {
    let value = match params.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite())
}

// u32 is wide enough for any speed or flow the controller reports
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole(params: &Value, key: &str) -> Option<u32> {
    number(params, key)
        .filter(|v| *v >= 0.0 && *v <= f64::from(u32::MAX))
        .map(|v| v.round() as u32)
}

fn object_type(params: &Value) -> &str {
    text(params, keys::OBJTYP).unwrap_or_default()
}

fn children<'a>(params: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    params
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn status(params: &Value) -> Option<CircuitStatus> {
    text(params, keys::STATUS).and_then(|s| s.parse().ok())
}

fn circuit_from(id: ObjectId, params: &Value) -> Circuit {
    let subtype = text(params, keys::SUBTYP).unwrap_or_default().to_string();
    let mut circuit = Circuit {
        id,
        name: text(params, keys::SNAME).unwrap_or_default().to_string(),
        object_type: object_type(params).to_string(),
        subtype,
        status: status(params),
        color: None,
    };
    if circuit.is_color_light() {
        circuit.color = text(params, keys::USE)
            .filter(|s| !s.is_empty())
            .map(LightColor::from_use);
    }
    circuit
}

/// Builds a [`Topology`] from a merged answer tree.
#[derive(Debug)]
pub struct TopologyBuilder<'a> {
    options: TopologyOptions,
    association: &'a dyn HeaterAssociation,
}

struct RawCircuit {
    circuit: Circuit,
    feature: bool,
    module: Option<ObjectId>,
}

impl<'a> TopologyBuilder<'a> {
    /// Creates a builder.
    #[must_use]
    pub fn new(options: TopologyOptions, association: &'a dyn HeaterAssociation) -> Self {
        Self {
            options,
            association,
        }
    }

    fn temperature(&self, params: &Value, key: &str) -> Option<f64> {
        number(params, key).map(|v| self.options.unit.from_device(v))
    }

    /// Walks `tree` (an array of panels, or a single panel).
    #[must_use]
    pub fn build(&self, tree: &Value) -> Topology {
        let panels: Vec<&Value> = match tree {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![tree],
            _ => Vec::new(),
        };

        let mut topology = Topology::default();
        let mut raw_circuits: Vec<RawCircuit> = Vec::new();
        let mut raw_heaters: Vec<(ObjectId, &Value)> = Vec::new();

        for panel_value in panels {
            let Some(panel_id) = objnam(panel_value) else {
                continue;
            };
            let Some(panel_params) = params(panel_value) else {
                continue;
            };
            let mut panel = Panel {
                id: panel_id.clone(),
                ..Panel::default()
            };
            let items: Vec<&Value> = children(panel_params, keys::OBJLIST).collect();

            // sensors
            for item in &items {
                if let (Some(id), Some(p)) = (objnam(item), params(item))
                    && object_type(p) == "SENSE"
                    && let Some(sensor) = self.sensor(id, p)
                {
                    panel.sensors.push(sensor.id.clone());
                    topology.sensors.push(sensor);
                }
            }

            // pumps and their speed tables
            for item in &items {
                if let (Some(id), Some(p)) = (objnam(item), params(item))
                    && object_type(p) == "PUMP"
                {
                    panel.pumps.push(id.clone());
                    self.pump(id, p, &mut topology);
                }
            }

            // modules: bodies, features, heaters
            for item in &items {
                let (Some(module_id), Some(p)) = (objnam(item), params(item)) else {
                    continue;
                };
                if object_type(p) != "MODULE" {
                    continue;
                }
                let mut module = Module {
                    id: module_id.clone(),
                    panel: panel_id.clone(),
                    ..Module::default()
                };
                for child in children(p, "CIRCUITS") {
                    let (Some(id), Some(cp)) = (objnam(child), params(child)) else {
                        continue;
                    };
                    match object_type(cp) {
                        "BODY" => {
                            module.bodies.push(id.clone());
                            topology.bodies.push(self.body(id, cp));
                        }
                        "HEATER" => {
                            module.heaters.push(id.clone());
                            raw_heaters.push((id, cp));
                        }
                        "CIRCUIT" => {
                            let feature = text(cp, "FEATR") == Some("ON");
                            if feature {
                                module.features.push(id.clone());
                            }
                            raw_circuits.push(RawCircuit {
                                circuit: circuit_from(id, cp),
                                feature,
                                module: Some(module_id.clone()),
                            });
                        }
                        _ => {}
                    }
                }
                panel.modules.push(module_id);
                topology.modules.push(module);
            }

            // panel-level features, bodies and heaters
            for item in &items {
                let (Some(id), Some(p)) = (objnam(item), params(item)) else {
                    continue;
                };
                match object_type(p) {
                    "CIRCUIT" => {
                        let feature = text(p, "FEATR") == Some("ON");
                        if feature {
                            panel.features.push(id.clone());
                        }
                        raw_circuits.push(RawCircuit {
                            circuit: circuit_from(id, p),
                            feature,
                            module: None,
                        });
                    }
                    "BODY" => topology.bodies.push(self.body(id, p)),
                    "HEATER" => raw_heaters.push((id, p)),
                    _ => {}
                }
            }

            topology.panels.push(panel);
        }

        self.link_bodies(&mut topology, &raw_circuits);

        let circuit_names: HashMap<ObjectId, String> = raw_circuits
            .iter()
            .map(|r| (r.circuit.id.clone(), r.circuit.name.clone()))
            .chain(
                topology
                    .bodies
                    .iter()
                    .map(|b| (b.circuit.id.clone(), b.circuit.name.clone())),
            )
            .collect();

        topology.circuits = raw_circuits
            .into_iter()
            .filter(|r| r.feature || self.options.include_all_circuits)
            .map(|r| r.circuit)
            .collect();

        for (id, p) in raw_heaters {
            self.heater(id, p, &mut topology, &circuit_names);
        }

        topology.subscriptions = subscriptions(&topology);

        tracing::info!(
            panels = topology.panels.len(),
            bodies = topology.bodies.len(),
            circuits = topology.circuits.len(),
            pumps = topology.pumps.len(),
            pump_circuits = topology.pump_circuits.len(),
            sensors = topology.sensors.len(),
            heaters = topology.heaters.len(),
            "Built topology"
        );
        topology
    }

    fn sensor(&self, id: ObjectId, p: &Value) -> Option<Sensor> {
        let kind = match text(p, keys::SUBTYP).unwrap_or_default() {
            "AIR" => SensorKind::Air,
            "SOLAR" => SensorKind::Solar,
            _ => SensorKind::Pool,
        };
        if kind == SensorKind::Air && !self.options.air_temp {
            tracing::debug!(object = %id, "Skipping air sensor");
            return None;
        }
        Some(Sensor {
            name: text(p, keys::SNAME).unwrap_or_default().to_string(),
            kind,
            probe: self.temperature(p, keys::PROBE),
            id,
        })
    }

    fn pump(&self, id: ObjectId, p: &Value, topology: &mut Topology) {
        let mut pump = Pump {
            circuit: circuit_from(id.clone(), p),
            min_rpm: whole(p, "MIN").unwrap_or_default(),
            max_rpm: whole(p, "MAX").unwrap_or_default(),
            min_flow: whole(p, "MINF").unwrap_or_default(),
            max_flow: whole(p, "MAXF").unwrap_or_default(),
            ..Pump::default()
        };

        for entry in children(p, keys::OBJLIST) {
            let (Some(pc_id), Some(pp)) = (objnam(entry), params(entry)) else {
                continue;
            };
            let Some(circuit_id) = text(pp, "CIRCUIT").filter(|s| !s.is_empty()) else {
                continue;
            };
            let circuit_id = ObjectId::new(circuit_id);
            let pump_circuit = PumpCircuit {
                id: pc_id.clone(),
                pump: id.clone(),
                circuit_id: circuit_id.clone(),
                speed: whole(pp, keys::SPEED).unwrap_or_default(),
                speed_type: text(pp, keys::SELECT)
                    .and_then(|s| s.parse::<SpeedType>().ok())
                    .unwrap_or_default(),
                status: status(pp),
                metrics: super::PumpMetrics::default(),
            };

            topology
                .pump_to_circuits
                .entry(id.clone())
                .or_default()
                .push(circuit_id.clone());
            topology.circuit_to_pump.insert(circuit_id, id.clone());
            topology
                .pump_circuit_to_pump
                .insert(pc_id.clone(), id.clone());
            pump.circuits.push(pc_id);
            topology.pump_circuits.push(pump_circuit);
        }

        topology.pumps.push(pump);
    }

    fn body(&self, id: ObjectId, p: &Value) -> Body {
        Body {
            circuit: circuit_from(id, p),
            temperature: self.temperature(p, keys::LSTTMP),
            low_temperature: self.temperature(p, keys::LOTMP),
            high_temperature: self.temperature(p, keys::HITMP),
            heater_id: ObjectId::new(
                text(p, keys::HEATER)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(ObjectId::NO_HEATER),
            ),
            heat_source: text(p, keys::HTSRC).filter(|s| !s.is_empty()).map(ObjectId::new),
            heat_mode: whole(p, keys::HTMODE)
                .and_then(|v| u8::try_from(v).ok())
                .map(HeatMode::from_code),
            mode: whole(p, keys::MODE).and_then(|v| u8::try_from(v).ok()),
            circuit_id: text(p, "CIRCUIT").filter(|s| !s.is_empty()).map(ObjectId::new),
        }
    }

    /// Resolves each body's on/off circuit: an explicit `CIRCUIT` param,
    /// else the circuit sharing its subtype, preferring the same module.
    fn link_bodies(&self, topology: &mut Topology, raw: &[RawCircuit]) {
        let body_modules: HashMap<ObjectId, ObjectId> = topology
            .modules
            .iter()
            .flat_map(|m| m.bodies.iter().map(|b| (b.clone(), m.id.clone())))
            .collect();

        for body in &mut topology.bodies {
            if body.circuit_id.is_some() || body.circuit.subtype.is_empty() {
                continue;
            }
            let module = body_modules.get(&body.circuit.id);
            let same_subtype = |r: &&RawCircuit| r.circuit.subtype == body.circuit.subtype;
            let found = raw
                .iter()
                .filter(same_subtype)
                .find(|r| r.module.as_ref() == module)
                .or_else(|| raw.iter().find(same_subtype));
            body.circuit_id = found.map(|r| r.circuit.id.clone());
        }
    }

    fn heater(
        &self,
        id: ObjectId,
        p: &Value,
        topology: &mut Topology,
        circuit_names: &HashMap<ObjectId, String>,
    ) {
        let heater = Heater {
            name: text(p, keys::SNAME).unwrap_or_default().to_string(),
            kind: if text(p, keys::SUBTYP) == Some("HCOMBO") {
                HeaterKind::Combo
            } else {
                HeaterKind::Standard
            },
            cooling_enabled: text(p, "COOL") == Some("ON"),
            body_ids: text(p, "BODY")
                .unwrap_or_default()
                .split_whitespace()
                .map(ObjectId::new)
                .collect(),
            id,
        };

        let candidates: Vec<Candidate<'_>> = topology
            .pump_circuits
            .iter()
            .filter_map(|pc| {
                let pump = topology.pumps.iter().find(|p| p.circuit.id == pc.pump)?;
                Some(Candidate {
                    pump_circuit: pc,
                    pump,
                    circuit_name: circuit_names.get(&pc.circuit_id).map(String::as_str),
                })
            })
            .collect();

        let mut instances = Vec::new();
        for body_id in &heater.body_ids {
            let Some(body) = topology.bodies.iter().find(|b| &b.circuit.id == body_id) else {
                tracing::debug!(heater = %heater.id, body = %body_id, "Heater references unknown body");
                continue;
            };
            let mut instance = HeaterInstance::new(&heater.id, body_id);
            instance.pump_circuit = self.association.associate(&heater, body, &candidates);
            instances.push(instance);
        }

        topology.heater_instances.extend(instances);
        topology.heaters.push(heater);
    }
}

fn subscriptions(topology: &Topology) -> Vec<IntelliCenterRequest> {
    let groups: [Vec<RequestObject>; 5] = [
        topology
            .bodies
            .iter()
            .map(|b| RequestObject::subscribe(b.circuit.id.clone(), &BODY_KEYS))
            .collect(),
        topology
            .pump_circuits
            .iter()
            .map(|pc| RequestObject::subscribe(pc.id.clone(), &PUMP_CIRCUIT_KEYS))
            .collect(),
        topology
            .pumps
            .iter()
            .map(|p| RequestObject::subscribe(p.circuit.id.clone(), &PUMP_KEYS))
            .collect(),
        topology
            .circuits
            .iter()
            .map(|c| RequestObject::subscribe(c.id.clone(), &CIRCUIT_KEYS))
            .collect(),
        topology
            .sensors
            .iter()
            .map(|s| RequestObject::subscribe(s.id.clone(), &SENSOR_KEYS))
            .collect(),
    ];
    groups
        .into_iter()
        .filter(|objects| !objects.is_empty())
        .map(IntelliCenterRequest::subscribe)
        .collect()
}
