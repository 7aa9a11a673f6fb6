// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Watch an `IntelliCenter` controller until Ctrl-C.
//!
//! Connects, prints the discovered bodies, pumps and sensors, then logs
//! every event the session publishes. Set `RUST_LOG` for library logs
//! (defaults to `info`).
//!
//! # Usage
//!
//! ```bash
//! cargo run --example monitor -- <host> [port] [F|C]
//! ```
//!
//! # Example
//!
//! ```bash
//! cargo run --example monitor -- 192.168.1.40
//! RUST_LOG=intellicenter_lib=debug cargo run --example monitor -- 192.168.1.40 6681 C
//! ```

use std::env;

use intellicenter_lib::config::DEFAULT_PORT;
use intellicenter_lib::types::TemperatureUnit;
use intellicenter_lib::{ConnectionState, Session, SessionConfig, SessionEvent, Subscribable};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <host> [port] [F|C]", args[0]);
        std::process::exit(1);
    }

    let port: u16 = args.get(2).and_then(|p| p.parse().ok()).unwrap_or(DEFAULT_PORT);
    let (unit, min, max) = match args.get(3).map(String::as_str) {
        Some("C" | "c") => (TemperatureUnit::Celsius, 4.0, 40.0),
        _ => (TemperatureUnit::Fahrenheit, 40.0, 104.0),
    };

    let config = SessionConfig::builder()
        .host(&args[1])
        .port(port)
        .temperature_unit(unit)
        .temperature_bounds(min, max)
        .build()?;

    println!("Connecting to {}...", config.address());
    let session = Session::start(config)?;
    let mut events = session.events();

    session.on_pump_metrics_changed(|pump, metrics| {
        println!(
            "  pump {pump}: {} rpm, {} gpm, {} W",
            metrics.rpm.unwrap_or_default(),
            metrics.gpm.unwrap_or_default(),
            metrics.watts.unwrap_or_default()
        );
    });

    tokio::select! {
        result = session.wait_for(ConnectionState::Ready) => result?,
        _ = tokio::signal::ctrl_c() => {
            session.shutdown().await;
            return Ok(());
        }
    }

    {
        let store = session.store();
        let store = store.read();
        println!("Discovered {} objects", store.len());
        for body in store.bodies() {
            println!(
                "  body {} ({}): {:?} °C, heater {}",
                body.circuit.id,
                body.circuit.name,
                body.temperature,
                body.heater_id
            );
        }
        for pump in store.pumps() {
            println!(
                "  pump {} ({}): {}-{} rpm",
                pump.circuit.id, pump.circuit.name, pump.min_rpm, pump.max_rpm
            );
        }
        for sensor in store.sensors() {
            println!("  sensor {} ({}): {:?} °C", sensor.id, sensor.name, sensor.probe);
        }
    }
    println!("Watching for changes, Ctrl-C to stop");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::StateChanged(change)) => println!("{change:?}"),
                Ok(SessionEvent::UnitMismatch { configured, analysis }) => println!(
                    "Configured unit is {configured} but readings look like {:?} ({:.0}% confidence)",
                    analysis.detected,
                    analysis.confidence * 100.0
                ),
                Ok(event) => println!("{event:?}"),
                Err(RecvError::Lagged(missed)) => println!("(missed {missed} events)"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("Shutting down...");
    if let Ok(diagnostics) = session.diagnostics().await {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    }
    session.shutdown().await;
    Ok(())
}
