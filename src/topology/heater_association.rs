// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Heater to pump-circuit association.
//!
//! The hardware definition does not say which pump speed runs while a
//! heater heats. [`SpeedBandHeuristic`] guesses it from names and speed
//! bands; the thresholds are tunable through [`ScoringThresholds`] and
//! the whole strategy can be swapped by implementing [`HeaterAssociation`].

use super::model::{Body, Heater, Pump, PumpCircuit};
use crate::types::{ObjectId, SpeedType};

/// Candidate pump-circuit with the context a strategy may use.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// The pump-circuit.
    pub pump_circuit: &'a PumpCircuit,
    /// Its pump.
    pub pump: &'a Pump,
    /// Name of the circuit it drives, if known.
    pub circuit_name: Option<&'a str>,
}

/// Strategy choosing the pump-circuit associated with a heater.
pub trait HeaterAssociation: Send + Sync + std::fmt::Debug {
    /// Scores one candidate; 0 excludes it.
    fn score(&self, heater: &Heater, body: &Body, candidate: &Candidate<'_>) -> u32;

    /// Picks the best scoring candidate. Ties keep discovery order.
    fn associate(
        &self,
        heater: &Heater,
        body: &Body,
        candidates: &[Candidate<'_>],
    ) -> Option<ObjectId> {
        let mut best: Option<(u32, &ObjectId)> = None;
        for candidate in candidates {
            let score = self.score(heater, body, candidate);
            if score > 0 && best.is_none_or(|(s, _)| score > s) {
                best = Some((score, &candidate.pump_circuit.id));
            }
        }
        best.map(|(_, id)| id.clone())
    }
}

/// Tunable thresholds of [`SpeedBandHeuristic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringThresholds {
    /// Slowest RPM a candidate may run at.
    pub min_eligible_rpm: u32,
    /// Inclusive band scoring [`preferred_score`](Self::preferred_score).
    pub preferred_band: (u32, u32),
    /// Inclusive band scoring [`secondary_score`](Self::secondary_score).
    pub secondary_band: (u32, u32),
    /// Case-insensitive keyword matched against pump and circuit names.
    pub name_keyword: String,
    /// Score of a name match.
    pub name_score: u32,
    /// Score of the preferred band.
    pub preferred_score: u32,
    /// Score of the secondary band.
    pub secondary_score: u32,
}

impl Default for ScoringThresholds {
    fn default() -> Self {
        Self {
            min_eligible_rpm: 1000,
            preferred_band: (2500, 3200),
            secondary_band: (2000, 2499),
            name_keyword: "heater".to_string(),
            name_score: 100,
            preferred_score: 90,
            secondary_score: 85,
        }
    }
}

/// Name and RPM-band scoring.
///
/// Only RPM pump-circuits at or above `min_eligible_rpm` qualify. A pump or
/// driven circuit whose name contains the keyword wins outright; otherwise
/// speeds in the preferred band beat the secondary band, and anything else
/// is excluded.
#[derive(Debug, Clone, Default)]
pub struct SpeedBandHeuristic {
    thresholds: ScoringThresholds,
}

impl SpeedBandHeuristic {
    /// Creates the heuristic with custom thresholds.
    #[must_use]
    pub fn new(thresholds: ScoringThresholds) -> Self {
        Self { thresholds }
    }
}

fn in_band(value: u32, (low, high): (u32, u32)) -> bool {
    (low..=high).contains(&value)
}

impl HeaterAssociation for SpeedBandHeuristic {
    fn score(&self, _heater: &Heater, _body: &Body, candidate: &Candidate<'_>) -> u32 {
        let t = &self.thresholds;
        let pc = candidate.pump_circuit;
        if pc.speed_type != SpeedType::Rpm || pc.speed < t.min_eligible_rpm {
            return 0;
        }

        let keyword = t.name_keyword.to_ascii_lowercase();
        let named = [Some(candidate.pump.circuit.name.as_str()), candidate.circuit_name]
            .into_iter()
            .flatten()
            .any(|name| name.to_ascii_lowercase().contains(&keyword));
        if named {
            t.name_score
        } else if in_band(pc.speed, t.preferred_band) {
            t.preferred_score
        } else if in_band(pc.speed, t.secondary_band) {
            t.secondary_score
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Circuit;

    fn pump(name: &str) -> Pump {
        Pump {
            circuit: Circuit {
                id: ObjectId::new("PMP01"),
                name: name.to_string(),
                ..Circuit::default()
            },
            ..Pump::default()
        }
    }

    fn pc(id: &str, speed: u32, speed_type: SpeedType) -> PumpCircuit {
        PumpCircuit {
            id: ObjectId::new(id),
            pump: ObjectId::new("PMP01"),
            speed,
            speed_type,
            ..PumpCircuit::default()
        }
    }

    fn score(p: &Pump, c: &PumpCircuit, circuit_name: Option<&str>) -> u32 {
        SpeedBandHeuristic::default().score(
            &Heater::default(),
            &Body::default(),
            &Candidate {
                pump_circuit: c,
                pump: p,
                circuit_name,
            },
        )
    }

    #[test]
    fn scores_by_band() {
        let p = pump("VS Pump");
        assert_eq!(score(&p, &pc("p0101", 2800, SpeedType::Rpm), None), 90);
        assert_eq!(score(&p, &pc("p0102", 2200, SpeedType::Rpm), None), 85);
        assert_eq!(score(&p, &pc("p0103", 1500, SpeedType::Rpm), None), 0);
        assert_eq!(score(&p, &pc("p0104", 3400, SpeedType::Rpm), None), 0);
    }

    #[test]
    fn name_match_wins() {
        let p = pump("VS Pump");
        assert_eq!(score(&p, &pc("p0101", 1500, SpeedType::Rpm), Some("Pool Heater")), 100);
        assert_eq!(score(&pump("Heater Pump"), &pc("p0101", 1200, SpeedType::Rpm), None), 100);
    }

    #[test]
    fn ineligible_candidates_score_zero() {
        let p = pump("Heater Pump");
        assert_eq!(score(&p, &pc("p0101", 2800, SpeedType::Gpm), None), 0);
        assert_eq!(score(&p, &pc("p0102", 900, SpeedType::Rpm), None), 0);
    }

    #[test]
    fn associate_picks_highest() {
        let p = pump("VS Pump");
        let low = pc("p0101", 2100, SpeedType::Rpm);
        let high = pc("p0102", 3000, SpeedType::Rpm);
        let slow = pc("p0103", 1100, SpeedType::Rpm);
        let candidates: Vec<_> = [&low, &high, &slow]
            .into_iter()
            .map(|c| Candidate {
                pump_circuit: c,
                pump: &p,
                circuit_name: None,
            })
            .collect();
        let chosen = SpeedBandHeuristic::default().associate(
            &Heater::default(),
            &Body::default(),
            &candidates,
        );
        assert_eq!(chosen.as_ref().map(ObjectId::as_str), Some("p0102"));
    }

    #[test]
    fn custom_thresholds() {
        let heuristic = SpeedBandHeuristic::new(ScoringThresholds {
            preferred_band: (1000, 1500),
            ..ScoringThresholds::default()
        });
        let p = pump("VS Pump");
        let c = pc("p0101", 1200, SpeedType::Rpm);
        let candidate = Candidate {
            pump_circuit: &c,
            pump: &p,
            circuit_name: None,
        };
        assert_eq!(heuristic.score(&Heater::default(), &Body::default(), &candidate), 90);
    }
}
