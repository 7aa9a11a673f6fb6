// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Telemetry checks on controller readings.
//!
//! After the first discovery the session runs a [`UnitMonitor`] that samples
//! body and sensor temperatures as the controller reports them and flags a
//! configured [`TemperatureUnit`](crate::types::TemperatureUnit) that does
//! not match what the readings look like.
//!
//! Classification thresholds:
//!
//! | Unit | Average | Min/Max |
//! |------|---------|---------|
//! | °F   | 65-110  | 50-120  |
//! | °C   | 15-45   | 5-50    |

mod unit_monitor;

pub use unit_monitor::{
    CONFIRM_SAMPLES, MAX_SAMPLES, MIN_SAMPLES, MonitorVerdict, REPORT_CONFIDENCE, UnitAnalysis,
    UnitMonitor, analyze,
};
