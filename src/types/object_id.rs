// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Protocol object identifiers.

use std::borrow::Borrow;
use std::fmt;

/// Stable protocol object name (`objnam`), e.g. `"C0006"`, `"B1101"`, `"p0101"`.
///
/// All indices in this crate are keyed by object ids, never by display
/// names, so renaming a circuit on the controller does not orphan it.
///
/// # Examples
///
/// ```
/// use intellicenter_lib::types::ObjectId;
///
/// let id = ObjectId::new("C0006");
/// assert_eq!(id.as_str(), "C0006");
/// assert!(ObjectId::new("00000").is_no_heater());
/// ```
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Heater id meaning "no heater selected".
    pub const NO_HEATER: &'static str = "00000";

    /// Creates an id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this is the "no heater" sentinel.
    #[must_use]
    pub fn is_no_heater(&self) -> bool {
        self.0 == Self::NO_HEATER
    }

    /// Returns `true` if the id looks like a pump-circuit (`p` + digits).
    #[must_use]
    pub fn is_pump_circuit_shape(&self) -> bool {
        let mut chars = self.0.chars();
        chars.next() == Some('p')
            && self.0.len() > 1
            && chars.all(|c| c.is_ascii_digit())
    }

    /// Derives the owning pump id from a pump-circuit id (`p0102` → `PMP01`).
    #[must_use]
    pub fn pump_for_pump_circuit(&self) -> Option<ObjectId> {
        if !self.is_pump_circuit_shape() || self.0.len() < 3 {
            return None;
        }
        Some(ObjectId(format!("PMP{}", &self.0[1..3])))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ObjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ObjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_detection() {
        assert!(ObjectId::new(ObjectId::NO_HEATER).is_no_heater());
        assert!(!ObjectId::new("H0001").is_no_heater());
    }

    #[test]
    fn pump_circuit_shape() {
        assert!(ObjectId::new("p0101").is_pump_circuit_shape());
        assert!(!ObjectId::new("PMP01").is_pump_circuit_shape());
        assert!(!ObjectId::new("p").is_pump_circuit_shape());
        assert!(!ObjectId::new("pA101").is_pump_circuit_shape());
    }

    #[test]
    fn pump_derivation() {
        assert_eq!(
            ObjectId::new("p0203").pump_for_pump_circuit(),
            Some(ObjectId::new("PMP02"))
        );
        assert_eq!(ObjectId::new("C0001").pump_for_pump_circuit(), None);
    }

    #[test]
    fn borrow_allows_str_lookup() {
        let mut map = std::collections::HashMap::new();
        map.insert(ObjectId::new("B1101"), 1);
        assert_eq!(map.get("B1101"), Some(&1));
    }
}
