// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed entities built from the hardware definition.
//!
//! Temperatures are stored in degrees Celsius regardless of the unit the
//! controller reports in.

use serde::Serialize;

use crate::types::{CircuitStatus, HeatMode, ObjectId, SpeedType};

/// Root container of the hardware definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Panel {
    /// Panel object id.
    pub id: ObjectId,
    /// Modules, in discovery order.
    pub modules: Vec<ObjectId>,
    /// Panel-level feature circuits.
    pub features: Vec<ObjectId>,
    /// Pumps.
    pub pumps: Vec<ObjectId>,
    /// Sensors.
    pub sensors: Vec<ObjectId>,
}

/// Expansion module of a panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Module {
    /// Module object id.
    pub id: ObjectId,
    /// Owning panel.
    pub panel: ObjectId,
    /// Feature circuits.
    pub features: Vec<ObjectId>,
    /// Bodies of water.
    pub bodies: Vec<ObjectId>,
    /// Heaters.
    pub heaters: Vec<ObjectId>,
}

/// Any controllable or observable logical object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Circuit {
    /// Protocol object name, e.g. `C0006`.
    pub id: ObjectId,
    /// Display name (`SNAME`).
    pub name: String,
    /// Object type (`OBJTYP`), e.g. `CIRCUIT`, `BODY`, `PUMP`.
    pub object_type: String,
    /// Functional subtype (`SUBTYP`), e.g. `LIGHT`, `POOL`, `SPEED`.
    pub subtype: String,
    /// On/off status, once known.
    pub status: Option<CircuitStatus>,
    /// Light colour or show, for colour-capable lights.
    pub color: Option<LightColor>,
}

impl Circuit {
    /// Subtypes of lights that report a colour through `USE`.
    pub const COLOR_SUBTYPES: [&'static str; 4] = ["INTELLI", "GLOW", "MAGIC2", "CLRCASC"];

    /// Returns `true` for colour-capable lights.
    #[must_use]
    pub fn is_color_light(&self) -> bool {
        Self::COLOR_SUBTYPES.contains(&self.subtype.as_str())
    }
}

/// A body of water (pool or spa).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Body {
    /// Circuit fields shared with every object.
    pub circuit: Circuit,
    /// Water temperature in °C.
    pub temperature: Option<f64>,
    /// Heating set point in °C.
    pub low_temperature: Option<f64>,
    /// Cooling set point in °C.
    pub high_temperature: Option<f64>,
    /// Selected heater; [`ObjectId::NO_HEATER`] when none.
    pub heater_id: ObjectId,
    /// Heat source currently engaged (`HTSRC`).
    pub heat_source: Option<ObjectId>,
    /// Heater submode (`HTMODE`).
    pub heat_mode: Option<HeatMode>,
    /// Raw heater `MODE` value.
    pub mode: Option<u8>,
    /// Circuit that switches this body on and off.
    pub circuit_id: Option<ObjectId>,
}

impl Body {
    /// Returns the selected heater, never the "no heater" sentinel.
    #[must_use]
    pub fn selected_heater(&self) -> Option<&ObjectId> {
        (!self.heater_id.is_no_heater() && !self.heater_id.as_str().is_empty())
            .then_some(&self.heater_id)
    }
}

/// Heater kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum HeaterKind {
    /// Single-mode heater.
    #[default]
    Standard,
    /// Multi-mode combination heater (`HCOMBO`).
    Combo,
}

/// A heater.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Heater {
    /// Heater object id.
    pub id: ObjectId,
    /// Display name.
    pub name: String,
    /// Standard or combo.
    pub kind: HeaterKind,
    /// Whether the heater can also cool.
    pub cooling_enabled: bool,
    /// Bodies this heater can serve.
    pub body_ids: Vec<ObjectId>,
}

/// One heater serving one body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeaterInstance {
    /// Stable key `<heater>.<body>`.
    pub key: ObjectId,
    /// Heater id.
    pub heater: ObjectId,
    /// Body id.
    pub body: ObjectId,
    /// Pump-circuit assumed to run while this heater heats.
    pub pump_circuit: Option<ObjectId>,
}

impl HeaterInstance {
    /// Creates an instance for `heater` serving `body`.
    #[must_use]
    pub fn new(heater: &ObjectId, body: &ObjectId) -> Self {
        Self {
            key: ObjectId::new(format!("{heater}.{body}")),
            heater: heater.clone(),
            body: body.clone(),
            pump_circuit: None,
        }
    }
}

/// A variable speed pump.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Pump {
    /// Circuit fields shared with every object.
    pub circuit: Circuit,
    /// Lowest speed in RPM.
    pub min_rpm: u32,
    /// Highest speed in RPM.
    pub max_rpm: u32,
    /// Lowest flow in GPM.
    pub min_flow: u32,
    /// Highest flow in GPM.
    pub max_flow: u32,
    /// Pump-circuit ids of the speed table.
    pub circuits: Vec<ObjectId>,
    /// Metrics of the fastest active pump-circuit.
    pub metrics: PumpMetrics,
}

/// Rotational speed, flow and power of a pump or pump-circuit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PumpMetrics {
    /// Revolutions per minute.
    pub rpm: Option<f64>,
    /// Gallons per minute.
    pub gpm: Option<f64>,
    /// Power draw in watts.
    pub watts: Option<f64>,
}

/// An entry in a pump's speed table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PumpCircuit {
    /// Pump-circuit id, e.g. `p0101`.
    pub id: ObjectId,
    /// Owning pump.
    pub pump: ObjectId,
    /// Logical circuit this entry drives.
    pub circuit_id: ObjectId,
    /// Configured speed.
    pub speed: u32,
    /// Unit of `speed`.
    pub speed_type: SpeedType,
    /// On/off status, once known.
    pub status: Option<CircuitStatus>,
    /// Reported metrics.
    pub metrics: PumpMetrics,
}

impl PumpCircuit {
    /// Returns `true` while the pump-circuit runs.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.is_some_and(|s| s.is_on())
    }
}

/// Sensor kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SensorKind {
    /// Air temperature.
    Air,
    /// Water temperature.
    #[default]
    Pool,
    /// Solar collector temperature.
    Solar,
}

/// A temperature sensor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Sensor {
    /// Sensor object id.
    pub id: ObjectId,
    /// Display name.
    pub name: String,
    /// Air, pool or solar.
    pub kind: SensorKind,
    /// Last reading in °C.
    pub probe: Option<f64>,
}

/// Named IntelliBrite colours and shows, decoded from `USE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LightColor {
    /// White.
    White,
    /// Red.
    Red,
    /// Green.
    Green,
    /// Blue.
    Blue,
    /// Magenta.
    Magenta,
    /// Party show.
    Party,
    /// Romance show.
    Romance,
    /// Caribbean show.
    Caribbean,
    /// American show.
    American,
    /// Sunset show.
    Sunset,
    /// Royal show.
    Royal,
    /// Any other value.
    Other(String),
}

impl LightColor {
    /// Decodes a `USE` value.
    #[must_use]
    pub fn from_use(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "WHITER" | "WHITE" => Self::White,
            "REDR" | "RED" => Self::Red,
            "GREENR" | "GREEN" => Self::Green,
            "BLUER" | "BLUE" => Self::Blue,
            "MAGNTAR" | "MAGENTA" => Self::Magenta,
            "PARTY" => Self::Party,
            "ROMAN" | "ROMANCE" => Self::Romance,
            "CARIB" | "CARIBBEAN" => Self::Caribbean,
            "AMERCA" | "AMERICAN" => Self::American,
            "SSET" | "SUNSET" => Self::Sunset,
            "ROYAL" => Self::Royal,
            _ => Self::Other(value.trim().to_string()),
        }
    }
}

/// Any entity tracked by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Entity {
    /// Plain circuit or feature.
    Circuit(Circuit),
    /// Body of water.
    Body(Body),
    /// Pump.
    Pump(Pump),
    /// Pump speed table entry.
    PumpCircuit(PumpCircuit),
    /// Temperature sensor.
    Sensor(Sensor),
    /// Heater.
    Heater(Heater),
}

impl Entity {
    /// Object id of the entity.
    #[must_use]
    pub fn id(&self) -> &ObjectId {
        match self {
            Self::Circuit(c) => &c.id,
            Self::Body(b) => &b.circuit.id,
            Self::Pump(p) => &p.circuit.id,
            Self::PumpCircuit(pc) => &pc.id,
            Self::Sensor(s) => &s.id,
            Self::Heater(h) => &h.id,
        }
    }

    /// Short kind name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Circuit(_) => "circuit",
            Self::Body(_) => "body",
            Self::Pump(_) => "pump",
            Self::PumpCircuit(_) => "pump-circuit",
            Self::Sensor(_) => "sensor",
            Self::Heater(_) => "heater",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_without_heater() {
        let body = Body {
            heater_id: ObjectId::new(ObjectId::NO_HEATER),
            ..Body::default()
        };
        assert!(body.selected_heater().is_none());

        let heated = Body {
            heater_id: ObjectId::new("H0001"),
            ..Body::default()
        };
        assert_eq!(heated.selected_heater().map(ObjectId::as_str), Some("H0001"));
    }

    #[test]
    fn light_colors_decode() {
        assert_eq!(LightColor::from_use("CARIB"), LightColor::Caribbean);
        assert_eq!(LightColor::from_use("whiter"), LightColor::White);
        assert_eq!(LightColor::from_use("LAGOON"), LightColor::Other("LAGOON".into()));
    }

    #[test]
    fn heater_instance_key() {
        let instance = HeaterInstance::new(&ObjectId::new("H0001"), &ObjectId::new("B1101"));
        assert_eq!(instance.key.as_str(), "H0001.B1101");
    }

    #[test]
    fn color_light_subtypes() {
        let light = Circuit {
            subtype: "MAGIC2".into(),
            ..Circuit::default()
        };
        assert!(light.is_color_light());
        assert!(!Circuit::default().is_color_light());
    }
}
