// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Temperature unit consistency monitor.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::types::TemperatureUnit;

/// Most samples ever kept.
pub const MAX_SAMPLES: usize = 50;
/// Samples needed before any classification.
pub const MIN_SAMPLES: usize = 3;
/// Samples needed to confirm the configured unit.
pub const CONFIRM_SAMPLES: usize = 10;
/// Confidence a mismatch needs before it is reported.
pub const REPORT_CONFIDENCE: f64 = 0.7;

const VALID_RANGE: (f64, f64) = (-50.0, 200.0);

struct Profile {
    unit: TemperatureUnit,
    average: (f64, f64),
    extremes: (f64, f64),
    tiers: [(f64, f64, f64); 3],
}

const PROFILES: [Profile; 2] = [
    Profile {
        unit: TemperatureUnit::Fahrenheit,
        average: (65.0, 110.0),
        extremes: (50.0, 120.0),
        tiers: [(70.0, 104.0, 0.9), (65.0, 110.0, 0.8), (60.0, 115.0, 0.6)],
    },
    Profile {
        unit: TemperatureUnit::Celsius,
        average: (15.0, 45.0),
        extremes: (5.0, 50.0),
        tiers: [(21.0, 40.0, 0.9), (18.0, 43.0, 0.8), (15.0, 45.0, 0.6)],
    },
];

fn within(value: f64, (low, high): (f64, f64)) -> bool {
    (low..=high).contains(&value)
}

/// Summary of the collected samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UnitAnalysis {
    /// Unit the readings look like, `None` if ambiguous.
    pub detected: Option<TemperatureUnit>,
    /// Confidence of `detected`, 0 when ambiguous.
    pub confidence: f64,
    /// Number of samples analysed.
    pub samples: usize,
    /// Mean reading.
    pub average: f64,
    /// Lowest reading.
    pub min: f64,
    /// Highest reading.
    pub max: f64,
}

/// Classifies raw controller readings. `None` below [`MIN_SAMPLES`].
///
/// # Examples
///
/// ```
/// use intellicenter_lib::telemetry::analyze;
/// use intellicenter_lib::types::TemperatureUnit;
///
/// let analysis = analyze(&[78.0, 80.0, 82.0]).unwrap();
/// assert_eq!(analysis.detected, Some(TemperatureUnit::Fahrenheit));
/// assert!((analysis.confidence - 0.9).abs() < f64::EPSILON);
/// ```
#[must_use]
pub fn analyze(samples: &[f64]) -> Option<UnitAnalysis> {
    if samples.len() < MIN_SAMPLES {
        return None;
    }
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // at most MAX_SAMPLES readings
    #[allow(clippy::cast_precision_loss)]
    let average = samples.iter().sum::<f64>() / samples.len() as f64;

    let profile = PROFILES.iter().find(|p| {
        within(average, p.average) && within(min, p.extremes) && within(max, p.extremes)
    });
    let (detected, confidence) = profile.map_or((None, 0.0), |p| {
        let confidence = p
            .tiers
            .iter()
            .find(|(low, high, _)| within(average, (*low, *high)))
            .map_or(0.3, |(_, _, c)| *c);
        (Some(p.unit), confidence)
    });

    Some(UnitAnalysis {
        detected,
        confidence,
        samples: samples.len(),
        average,
        min,
        max,
    })
}

/// Result of one monitor poll.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorVerdict {
    /// Not due yet, or not enough evidence.
    Pending,
    /// Enough samples agree with the configured unit. Monitoring stops.
    Consistent(UnitAnalysis),
    /// Readings look like another unit. Monitoring stops.
    Mismatch {
        /// Unit in the configuration.
        configured: TemperatureUnit,
        /// What the readings suggest.
        analysis: UnitAnalysis,
    },
    /// The monitoring window elapsed, or the monitor already stopped.
    Inactive,
}

/// Bounded check that readings match the configured unit.
///
/// Fed raw controller values by the session after the first discovery.
/// Stops after a verdict or once its window elapses.
#[derive(Debug, Clone)]
pub struct UnitMonitor {
    configured: TemperatureUnit,
    interval: Duration,
    deadline: Instant,
    next_poll: Instant,
    samples: Vec<f64>,
    active: bool,
}

impl UnitMonitor {
    /// Starts monitoring at `now`; the first poll is due immediately.
    #[must_use]
    pub fn new(configured: TemperatureUnit, interval: Duration, window: Duration, now: Instant) -> Self {
        Self {
            configured,
            interval,
            deadline: now + window,
            next_poll: now,
            samples: Vec::new(),
            active: true,
        }
    }

    /// Returns `true` until a verdict or the window ends.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Samples collected so far.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// When the next poll is due.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.active.then_some(self.next_poll.min(self.deadline))
    }

    /// Stops monitoring.
    pub fn stop(&mut self) {
        self.active = false;
    }

    fn record(&mut self, value: f64) {
        if self.samples.len() < MAX_SAMPLES && value.is_finite() && within(value, VALID_RANGE) {
            self.samples.push(value);
        }
    }

    /// Samples `readings` if a poll is due and evaluates the evidence.
    pub fn poll(&mut self, now: Instant, readings: impl IntoIterator<Item = f64>) -> MonitorVerdict {
        if !self.active {
            return MonitorVerdict::Inactive;
        }
        if now >= self.deadline {
            tracing::debug!(samples = self.samples.len(), "Unit monitor window elapsed");
            self.active = false;
            return MonitorVerdict::Inactive;
        }
        if now < self.next_poll {
            return MonitorVerdict::Pending;
        }
        self.next_poll = now + self.interval;
        for value in readings {
            self.record(value);
        }

        let Some(analysis) = analyze(&self.samples) else {
            return MonitorVerdict::Pending;
        };
        match analysis.detected {
            Some(unit) if unit != self.configured && analysis.confidence > REPORT_CONFIDENCE => {
                self.active = false;
                tracing::warn!(
                    configured = %self.configured,
                    detected = %unit,
                    confidence = analysis.confidence,
                    average = analysis.average,
                    "Temperature readings do not match the configured unit"
                );
                MonitorVerdict::Mismatch {
                    configured: self.configured,
                    analysis,
                }
            }
            Some(unit) if unit != self.configured => MonitorVerdict::Pending,
            _ if analysis.samples >= CONFIRM_SAMPLES => {
                self.active = false;
                tracing::info!(
                    unit = %self.configured,
                    samples = analysis.samples,
                    "Temperature unit confirmed"
                );
                MonitorVerdict::Consistent(analysis)
            }
            _ => MonitorVerdict::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(30);
    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn classifies_fahrenheit_and_celsius() {
        let f = analyze(&[78.0, 80.0, 82.0]).unwrap();
        assert_eq!(f.detected, Some(TemperatureUnit::Fahrenheit));

        let c = analyze(&[26.0, 27.0, 28.0]).unwrap();
        assert_eq!(c.detected, Some(TemperatureUnit::Celsius));
        assert!((c.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn confidence_tiers() {
        let f = analyze(&[66.0, 67.0, 68.0]).unwrap();
        assert!((f.confidence - 0.8).abs() < f64::EPSILON);

        let c = analyze(&[16.0, 16.5, 17.0]).unwrap();
        assert!((c.confidence - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn ambiguous_and_small_samples() {
        assert!(analyze(&[80.0, 80.0]).is_none());
        let mixed = analyze(&[10.0, 60.0, 110.0]).unwrap();
        assert_eq!(mixed.detected, None);
        assert!(mixed.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn reports_confident_mismatch_once() {
        let start = Instant::now();
        let mut monitor = UnitMonitor::new(TemperatureUnit::Celsius, INTERVAL, WINDOW, start);
        let verdict = monitor.poll(start, [80.0, 82.0, 84.0]);
        assert!(matches!(
            verdict,
            MonitorVerdict::Mismatch { configured: TemperatureUnit::Celsius, .. }
        ));
        assert!(!monitor.is_active());
        assert_eq!(monitor.poll(start + INTERVAL, [80.0]), MonitorVerdict::Inactive);
    }

    #[test]
    fn confirms_after_enough_samples() {
        let start = Instant::now();
        let mut monitor = UnitMonitor::new(TemperatureUnit::Fahrenheit, INTERVAL, WINDOW, start);
        assert_eq!(monitor.poll(start, [80.0, 81.0, 82.0, 83.0]), MonitorVerdict::Pending);

        // not due yet
        assert_eq!(monitor.poll(start + Duration::from_secs(10), [80.0; 6]), MonitorVerdict::Pending);
        assert_eq!(monitor.sample_count(), 4);

        let verdict = monitor.poll(start + INTERVAL, [80.0; 6]);
        assert!(matches!(verdict, MonitorVerdict::Consistent(a) if a.samples == 10));
        assert!(monitor.next_deadline().is_none());
    }

    #[test]
    fn ignores_invalid_readings_and_caps_samples() {
        let start = Instant::now();
        let mut monitor = UnitMonitor::new(TemperatureUnit::Fahrenheit, INTERVAL, WINDOW, start);
        monitor.poll(start, [f64::NAN, 250.0, -60.0]);
        assert_eq!(monitor.sample_count(), 0);

        // a low-confidence Celsius guess never settles, so the cap is reachable
        let mut t = start;
        for _ in 0..3 {
            t += INTERVAL;
            let verdict = monitor.poll(t, std::iter::repeat_n(16.0, 30));
            assert_eq!(verdict, MonitorVerdict::Pending);
        }
        assert_eq!(monitor.sample_count(), MAX_SAMPLES);
    }

    #[test]
    fn expires_after_window() {
        let start = Instant::now();
        let mut monitor = UnitMonitor::new(TemperatureUnit::Fahrenheit, INTERVAL, WINDOW, start);
        assert_eq!(monitor.poll(start + WINDOW, [80.0; 20]), MonitorVerdict::Inactive);
        assert!(!monitor.is_active());
    }
}
