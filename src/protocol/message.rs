// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed request and response records of the controller protocol.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ParseError;
use crate::types::ObjectId;

/// Wire parameter keys.
pub mod keys {
    /// On/off status.
    pub const STATUS: &str = "STATUS";
    /// Actual (reported) value.
    pub const ACT: &str = "ACT";
    /// Light show / colour selection.
    pub const USE: &str = "USE";
    /// Last measured temperature.
    pub const LSTTMP: &str = "LSTTMP";
    /// Heat source currently engaged.
    pub const HTSRC: &str = "HTSRC";
    /// Selected heater.
    pub const HEATER: &str = "HEATER";
    /// Heater operating mode.
    pub const MODE: &str = "MODE";
    /// Heater submode code.
    pub const HTMODE: &str = "HTMODE";
    /// Heating set point.
    pub const LOTMP: &str = "LOTMP";
    /// Cooling set point.
    pub const HITMP: &str = "HITMP";
    /// Pump-circuit speed.
    pub const SPEED: &str = "SPEED";
    /// Pump-circuit speed unit.
    pub const SELECT: &str = "SELECT";
    /// Sensor reading.
    pub const PROBE: &str = "PROBE";
    /// Flow rate.
    pub const GPM: &str = "GPM";
    /// Power draw.
    pub const WATTS: &str = "WATTS";
    /// Rotational speed.
    pub const RPM: &str = "RPM";
    /// Object type.
    pub const OBJTYP: &str = "OBJTYP";
    /// Object subtype.
    pub const SUBTYP: &str = "SUBTYP";
    /// Display name.
    pub const SNAME: &str = "SNAME";
    /// Child object list.
    pub const OBJLIST: &str = "OBJLIST";
}

/// Query name used for hardware discovery.
pub const HARDWARE_QUERY: &str = "GetHardwareDefinition";

/// Commands a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestCommand {
    /// Discovery query.
    GetQuery,
    /// Subscribe to parameter updates.
    RequestParamList,
    /// Write parameters.
    SetParamList,
}

impl RequestCommand {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GetQuery => "GetQuery",
            Self::RequestParamList => "RequestParamList",
            Self::SetParamList => "SetParamList",
        }
    }
}

impl fmt::Display for RequestCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands the controller sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseCommand {
    /// Answer to a discovery query.
    SendQuery,
    /// Status change notification.
    NotifyList,
    /// Acknowledgement of a parameter write.
    WriteParamList,
    /// Echo of a subscription request.
    RequestParamList,
    /// Echo of a parameter write.
    SetParamList,
    /// Device-reported error.
    Error,
    /// Any command this crate does not interpret.
    #[serde(other)]
    Unknown,
}

/// Hardware categories enumerated during discovery, in send order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DiscoveryCategory {
    /// Circuits, bodies and modules.
    Circuits,
    /// Pumps and their speed tables.
    Pumps,
    /// Chemistry controllers.
    Chems,
    /// Valves.
    Valves,
    /// Heaters.
    Heaters,
    /// Temperature sensors.
    Sensors,
    /// Circuit groups.
    Groups,
}

impl DiscoveryCategory {
    /// Every category in the order the controller is queried.
    pub const ALL: [Self; 7] = [
        Self::Circuits,
        Self::Pumps,
        Self::Chems,
        Self::Valves,
        Self::Heaters,
        Self::Sensors,
        Self::Groups,
    ];

    /// Returns the query argument.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Circuits => "CIRCUITS",
            Self::Pumps => "PUMPS",
            Self::Chems => "CHEMS",
            Self::Valves => "VALVES",
            Self::Heaters => "HEATERS",
            Self::Sensors => "SENSORS",
            Self::Groups => "GROUPS",
        }
    }
}

impl fmt::Display for DiscoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of an outbound `objectList`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestObject {
    /// Target object.
    pub objnam: ObjectId,
    /// Keys to subscribe to (`RequestParamList`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
    /// Values to write (`SetParamList`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, String>>,
}

impl RequestObject {
    /// Subscription entry.
    #[must_use]
    pub fn subscribe(objnam: impl Into<ObjectId>, keys: &[&str]) -> Self {
        Self {
            objnam: objnam.into(),
            keys: keys.iter().map(|k| (*k).to_string()).collect(),
            params: None,
        }
    }

    /// Write entry.
    #[must_use]
    pub fn set<K, V>(objnam: impl Into<ObjectId>, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            objnam: objnam.into(),
            keys: Vec::new(),
            params: Some(
                params
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

/// Outbound request.
///
/// # Examples
///
/// ```
/// use intellicenter_lib::protocol::{DiscoveryCategory, IntelliCenterRequest, RequestCommand};
///
/// let request = IntelliCenterRequest::discovery(DiscoveryCategory::Pumps);
/// assert_eq!(request.command, RequestCommand::GetQuery);
/// assert_eq!(request.arguments.as_deref(), Some("PUMPS"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntelliCenterRequest {
    /// Command name.
    pub command: RequestCommand,
    /// Query name for `GetQuery`.
    #[serde(rename = "queryName", default, skip_serializing_if = "Option::is_none")]
    pub query_name: Option<String>,
    /// Free-text arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    /// UUID v4 correlation id.
    #[serde(rename = "messageID")]
    pub message_id: String,
    /// Objects to subscribe to or write.
    #[serde(rename = "objectList", default, skip_serializing_if = "Vec::is_empty")]
    pub object_list: Vec<RequestObject>,
}

impl IntelliCenterRequest {
    fn new(command: RequestCommand) -> Self {
        Self {
            command,
            query_name: None,
            arguments: None,
            message_id: new_message_id(),
            object_list: Vec::new(),
        }
    }

    /// Hardware discovery query for one category.
    #[must_use]
    pub fn discovery(category: DiscoveryCategory) -> Self {
        Self {
            query_name: Some(HARDWARE_QUERY.to_string()),
            arguments: Some(category.as_str().to_string()),
            ..Self::new(RequestCommand::GetQuery)
        }
    }

    /// Subscription request for several objects.
    #[must_use]
    pub fn subscribe(objects: Vec<RequestObject>) -> Self {
        Self {
            object_list: objects,
            ..Self::new(RequestCommand::RequestParamList)
        }
    }

    /// Parameter write for one object.
    #[must_use]
    pub fn set_params<K, V>(
        objnam: impl Into<ObjectId>,
        params: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            object_list: vec![RequestObject::set(objnam, params)],
            ..Self::new(RequestCommand::SetParamList)
        }
    }

    /// Turns a circuit on or off.
    #[must_use]
    pub fn set_status(objnam: impl Into<ObjectId>, on: bool) -> Self {
        let value = if on { "ON" } else { "OFF" };
        Self::set_params(objnam, [(keys::STATUS, value)])
    }

    /// Returns the target object names, for logging.
    #[must_use]
    pub fn targets(&self) -> Vec<&str> {
        self.object_list.iter().map(|o| o.objnam.as_str()).collect()
    }
}

/// Generates a fresh UUID v4 message id.
#[must_use]
pub fn new_message_id() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

/// Returns `true` if `id` is a hyphenated UUID v4.
#[must_use]
pub fn is_valid_message_id(id: &str) -> bool {
    id.len() == 36
        && Uuid::try_parse(id).is_ok_and(|u| {
            u.get_version() == Some(uuid::Version::Random)
                && u.get_variant() == uuid::Variant::RFC4122
        })
}

/// One status entry of an inbound `objectList`.
///
/// `WriteParamList` acknowledgements nest their entries under `changes`;
/// use [`IntelliCenterResponse::status_updates`] to get a flat list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectParams {
    /// Object the parameters belong to.
    #[serde(default)]
    pub objnam: ObjectId,
    /// Parameter values, usually strings.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Nested entries of a write acknowledgement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ObjectParams>,
}

impl ObjectParams {
    /// Creates an entry from string pairs.
    #[must_use]
    pub fn new<'a>(objnam: &str, params: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            objnam: ObjectId::new(objnam),
            params: params
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
            changes: Vec::new(),
        }
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Returns a parameter as text. Numbers are rendered.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        match self.params.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Returns a parameter as a finite number.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidValue`] if the key is present but not
    /// numeric. Absent keys yield `Ok(None)`.
    pub fn number(&self, key: &str) -> Result<Option<f64>, ParseError> {
        let Some(value) = self.params.get(key) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(ParseError::InvalidValue {
                field: format!("{}.{key}", self.objnam),
                message: format!("'{value}' is not a number"),
            }),
        }
    }

    /// Renders all parameters for diagnostics.
    #[must_use]
    pub fn dump(&self) -> String {
        Value::Object(self.params.clone()).to_string()
    }
}

/// Inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelliCenterResponse {
    /// Command name.
    pub command: ResponseCommand,
    /// HTTP-style status code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Human readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Correlation id echoed from the request.
    #[serde(rename = "messageID", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Query name echoed from a discovery request.
    #[serde(rename = "queryName", default, skip_serializing_if = "Option::is_none")]
    pub query_name: Option<String>,
    /// Discovery answer tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
    /// Status entries.
    #[serde(rename = "objectList", default, skip_serializing_if = "Vec::is_empty")]
    pub object_list: Vec<ObjectParams>,
}

impl IntelliCenterResponse {
    /// Decodes one JSON line.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Json`] if the line is not a valid response.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        Ok(serde_json::from_str(line)?)
    }

    /// Returns `true` if the status code is 2xx or absent.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.response.as_deref().is_none_or(|code| code.starts_with('2'))
    }

    /// Returns `true` for device-reported errors.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.command == ResponseCommand::Error || !self.is_ok()
    }

    /// Returns `true` if the controller reports it could not parse a request.
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        self.is_error()
            && self
                .description
                .as_deref()
                .is_some_and(|d| d.to_ascii_lowercase().contains("parseerror"))
    }

    /// Returns `true` for a discovery answer.
    #[must_use]
    pub fn is_discovery_answer(&self) -> bool {
        self.command == ResponseCommand::SendQuery && self.answer.is_some()
    }

    /// Flattens `objectList` and nested `changes` into status entries.
    #[must_use]
    pub fn status_updates(&self) -> Vec<&ObjectParams> {
        let mut out = Vec::new();
        for entry in &self.object_list {
            collect_updates(entry, &mut out);
        }
        out
    }
}

fn collect_updates<'a>(entry: &'a ObjectParams, out: &mut Vec<&'a ObjectParams>) {
    if !entry.objnam.as_str().is_empty() && !entry.params.is_empty() {
        out.push(entry);
    }
    for nested in &entry.changes {
        collect_updates(nested, out);
    }
}
