// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `IntelliCenter` Lib - A Rust library for Pentair `IntelliCenter` pool
//! controllers.
//!
//! The library owns the controller's Telnet session: it frames and parses
//! the newline-delimited JSON protocol, discovers the installed hardware,
//! tracks bodies, circuits, heaters, pumps and sensors as status updates
//! arrive, and reconnects on its own when the network misbehaves.
//!
//! # Features
//!
//! - **Discovery**: serial hardware queries with per-query timeouts and one
//!   retry pass, merged into a typed topology
//! - **Status tracking**: inbound updates routed to pump-circuits, bodies,
//!   circuits, sensors and pumps, reported as [`StateChange`]s
//! - **Commands**: rate-limited FIFO with a fixed inter-command delay and a
//!   dead letter queue for failed sends
//! - **Resilience**: retry with exponential backoff, circuit breaker, health
//!   monitor, heartbeat and parse-error storm detection
//! - **Heating helpers**: set points in °C converted to the controller unit,
//!   heater selection and heating state resolution
//!
//! # Quick Start
//!
//! ```no_run
//! use intellicenter_lib::{ConnectionState, Session, SessionConfig, SessionEvent};
//! use intellicenter_lib::types::{ObjectId, TemperatureUnit};
//!
//! #[tokio::main]
//! async fn main() -> intellicenter_lib::Result<()> {
//!     let config = SessionConfig::builder()
//!         .host("192.168.1.40")
//!         .temperature_unit(TemperatureUnit::Fahrenheit)
//!         .temperature_bounds(40.0, 104.0)
//!         .build()?;
//!
//!     let session = Session::start(config)?;
//!     let mut events = session.events();
//!
//!     session.wait_for(ConnectionState::Ready).await?;
//!     session.set_temperature(&ObjectId::new("B1101"), 27.0).await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let SessionEvent::StateChanged(change) = event {
//!             println!("{change:?}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Callbacks
//!
//! ```no_run
//! use intellicenter_lib::{Session, SessionConfig, Subscribable};
//!
//! # async fn example() -> intellicenter_lib::Result<()> {
//! let session = Session::start(SessionConfig::builder().host("pool.local").build()?)?;
//!
//! session.on_pump_metrics_changed(|pump, metrics| {
//!     println!("{pump}: {:?} rpm", metrics.rpm);
//! });
//! session.on_temperature_changed(|change| {
//!     println!("{change:?}");
//! });
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod heating;
pub mod protocol;
pub mod resilience;
pub mod session;
pub mod state;
pub mod subscription;
pub mod telemetry;
pub mod topology;
pub mod types;

pub use config::{SessionConfig, SessionConfigBuilder, SessionTimings};
pub use error::{
    ConfigError, ConfigIssue, Error, ParseError, ProtocolError, ResilienceError, Result,
    ValueError,
};
pub use event::{ConnectionState, EventBus, SessionEvent};
pub use heating::{HeatingLimits, HeatingState};
pub use protocol::{
    DiscoveryCategory, IntelliCenterRequest, IntelliCenterResponse, ObjectParams, RequestCommand,
    RequestObject, ResponseCommand,
};
pub use session::{Diagnostics, Session};
pub use state::{EntityStore, SharedStore, StateChange};
pub use subscription::{CallbackRegistry, Subscribable, SubscriptionId};
pub use topology::{
    Body, Circuit, Entity, Heater, HeaterAssociation, Module, Panel, Pump, PumpCircuit,
    PumpMetrics, Sensor, SpeedBandHeuristic, Topology,
};
pub use types::{CircuitStatus, HeatMode, ObjectId, SpeedType, TemperatureUnit};
