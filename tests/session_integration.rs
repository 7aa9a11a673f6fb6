// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for a session against a fake controller on localhost.

use std::sync::Arc;
use std::time::Duration;

use intellicenter_lib::event::ParseErrorLevel;
use intellicenter_lib::types::{CircuitStatus, ObjectId, TemperatureUnit};
use intellicenter_lib::{
    ConnectionState, DiscoveryCategory, Session, SessionConfig, SessionEvent, SessionTimings,
    StateChange, Subscribable,
};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Fake controller
// ============================================================================

enum Push {
    Line(String),
    Close,
}

/// Answers hardware queries and records every request it receives.
struct FakeController {
    port: u16,
    requests: mpsc::UnboundedReceiver<Value>,
    push: mpsc::UnboundedSender<Push>,
}

impl FakeController {
    /// Starts a controller; categories in `ignore_once` go unanswered the
    /// first time they are queried.
    async fn start(ignore_once: &[&str]) -> Self {
        Self::start_with(ignore_once, &[]).await
    }

    /// Like [`FakeController::start`]; categories in `reject_once` are
    /// answered with a parse error the first time they are queried.
    async fn start_with(ignore_once: &[&str], reject_once: &[&str]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (push, mut push_rx) = mpsc::unbounded_channel::<Push>();
        let mut ignore: Vec<String> = ignore_once.iter().map(ToString::to_string).collect();
        let mut reject: Vec<String> = reject_once.iter().map(ToString::to_string).collect();

        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                let (read, mut write) = socket.into_split();
                let mut lines = BufReader::new(read).lines();
                loop {
                    tokio::select! {
                        line = lines.next_line() => {
                            let Ok(Some(line)) = line else { break };
                            let Ok(request) = serde_json::from_str::<Value>(&line) else {
                                continue;
                            };
                            if request["command"] == "GetQuery" {
                                let category = request["arguments"].as_str().unwrap_or_default().to_string();
                                if let Some(pos) = ignore.iter().position(|c| *c == category) {
                                    ignore.remove(pos);
                                } else if let Some(pos) = reject.iter().position(|c| *c == category) {
                                    reject.remove(pos);
                                    let answer = parse_error_answer(&request["messageID"]);
                                    let _ = write.write_all(format!("{answer}\r\n").as_bytes()).await;
                                } else {
                                    let answer = hardware_answer(&category, &request["messageID"]);
                                    let _ = write.write_all(format!("{answer}\r\n").as_bytes()).await;
                                }
                            }
                            let _ = requests_tx.send(request);
                        }
                        push = push_rx.recv() => match push {
                            Some(Push::Line(line)) => {
                                let _ = write.write_all(format!("{line}\r\n").as_bytes()).await;
                            }
                            Some(Push::Close) => break,
                            None => return,
                        }
                    }
                }
            }
        });

        Self {
            port,
            requests,
            push,
        }
    }

    fn notify(&self, objects: Value) {
        let line = json!({"command": "NotifyList", "objectList": objects}).to_string();
        self.push.send(Push::Line(line)).unwrap();
    }

    fn close_connection(&self) {
        self.push.send(Push::Close).unwrap();
    }

    /// Waits for the first request matching `predicate`.
    async fn expect_request(&mut self, predicate: impl Fn(&Value) -> bool) -> Value {
        timeout(WAIT, async {
            loop {
                let request = self.requests.recv().await.expect("controller stopped");
                if predicate(&request) {
                    return request;
                }
            }
        })
        .await
        .expect("request not received")
    }
}

fn hardware_answer(category: &str, message_id: &Value) -> Value {
    let objects = match category {
        "CIRCUITS" => json!([
            {"objnam": "M0101", "params": {"OBJTYP": "MODULE", "CIRCUITS": [
                {"objnam": "B1101", "params": {"OBJTYP": "BODY", "SUBTYP": "POOL", "SNAME": "Pool",
                    "LSTTMP": "25", "LOTMP": "27", "HITMP": "30", "HEATER": "H0001",
                    "HTSRC": "00000", "HTMODE": "0", "STATUS": "ON"}},
                {"objnam": "C0006", "params": {"OBJTYP": "CIRCUIT", "SUBTYP": "POOL", "SNAME": "Pool", "FEATR": "OFF"}},
                {"objnam": "C0003", "params": {"OBJTYP": "CIRCUIT", "SUBTYP": "INTELLI", "SNAME": "Lights",
                    "FEATR": "ON", "STATUS": "OFF", "USE": "WHITER"}}
            ]}}
        ]),
        "HEATERS" => json!([
            {"objnam": "M0101", "params": {"OBJTYP": "MODULE", "CIRCUITS": [
                {"objnam": "H0001", "params": {"OBJTYP": "HEATER", "SUBTYP": "GENERIC", "SNAME": "Gas Heater",
                    "BODY": "B1101"}}
            ]}}
        ]),
        "PUMPS" => json!([
            {"objnam": "PMP01", "params": {"OBJTYP": "PUMP", "SUBTYP": "SPEED", "SNAME": "VS Pump",
                "MIN": "450", "MAX": "3450", "MINF": "20", "MAXF": "140", "OBJLIST": [
                    {"objnam": "p0101", "params": {"OBJTYP": "PMPCIRC", "CIRCUIT": "C0006", "SPEED": "2000", "SELECT": "RPM"}}
                ]}}
        ]),
        "SENSORS" => json!([
            {"objnam": "SSW11", "params": {"OBJTYP": "SENSE", "SUBTYP": "POOL", "SNAME": "Water", "PROBE": "25"}}
        ]),
        _ => json!([]),
    };
    json!({
        "command": "SendQuery",
        "messageID": message_id,
        "queryName": "GetHardwareDefinition",
        "response": "200",
        "answer": [{"objnam": "INCR", "params": {"OBJTYP": "PANEL", "OBJLIST": objects}}]
    })
}

fn parse_error_answer(message_id: &Value) -> Value {
    json!({
        "command": "Error",
        "messageID": message_id,
        "response": "400",
        "description": "ParseError: bad request"
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn config(port: u16) -> SessionConfig {
    let timings = SessionTimings {
        reconnect_delay: Duration::from_millis(100),
        reconnect_debounce: Duration::from_millis(100),
        command_delay: Duration::from_millis(10),
        discovery_timeout: Duration::from_millis(300),
        discovery_pacing: Duration::from_millis(10),
        discovery_retry_pacing: Duration::from_millis(10),
        discovery_settle: Duration::from_millis(10),
        ..SessionTimings::default()
    };
    SessionConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .temperature_unit(TemperatureUnit::Celsius)
        .temperature_bounds(5.0, 40.0)
        .skip_reachability_check(true)
        .timings(timings)
        .build()
        .unwrap()
}

async fn ready_session(controller: &FakeController) -> Session {
    let session = Session::start(config(controller.port)).unwrap();
    timeout(WAIT, session.wait_for(ConnectionState::Ready))
        .await
        .expect("session never became ready")
        .unwrap();
    session
}

async fn next_event(
    events: &mut broadcast::Receiver<SessionEvent>,
    predicate: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event bus closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not received")
}

fn id(s: &str) -> ObjectId {
    ObjectId::new(s)
}

// ============================================================================
// Discovery
// ============================================================================

mod discovery {
    use super::*;

    #[tokio::test]
    async fn builds_store_from_hardware_answers() {
        let mut controller = FakeController::start(&[]).await;
        let session = ready_session(&controller).await;

        {
            let store = session.store();
            let store = store.read();
            let pool = store.body(&id("B1101")).expect("pool body");
            assert_eq!(pool.temperature, Some(25.0));
            assert_eq!(pool.circuit_id, Some(id("C0006")));
            assert!(store.circuit(&id("C0003")).is_some());
            assert!(store.pump(&id("PMP01")).is_some());
            assert!(store.sensor(&id("SSW11")).is_some());
            assert_eq!(store.pump_for_circuit(&id("C0006")), Some(&id("PMP01")));
        }

        let subscribe = controller
            .expect_request(|r| r["command"] == "RequestParamList")
            .await;
        assert!(subscribe["objectList"].as_array().is_some_and(|o| !o.is_empty()));

        session.shutdown().await;
    }

    #[tokio::test]
    async fn unanswered_query_is_retried() {
        let controller = FakeController::start(&["PUMPS"]).await;
        let session = Session::start(config(controller.port)).unwrap();
        let mut events = session.events();

        let completed = next_event(&mut events, |e| {
            matches!(e, SessionEvent::DiscoveryCompleted { .. })
        })
        .await;
        let SessionEvent::DiscoveryCompleted {
            succeeded, failed, ..
        } = completed
        else {
            unreachable!()
        };
        assert!(failed.is_empty());
        assert!(succeeded.contains(&DiscoveryCategory::Pumps));
        assert!(session.store().read().pump(&id("PMP01")).is_some());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn rejected_queries_count_as_parse_errors() {
        let controller = FakeController::start_with(&[], &["CIRCUITS", "HEATERS", "PUMPS"]).await;
        let session = Session::start(config(controller.port)).unwrap();
        let mut events = session.events();

        let storm = next_event(&mut events, |e| matches!(e, SessionEvent::ParseErrorStorm { .. })).await;
        assert_eq!(
            storm,
            SessionEvent::ParseErrorStorm {
                count: 3,
                level: ParseErrorLevel::Elevated,
            }
        );

        // the retry pass still fills the store
        timeout(WAIT, session.wait_for(ConnectionState::Ready))
            .await
            .expect("session never became ready")
            .unwrap();
        assert!(session.store().read().pump(&id("PMP01")).is_some());

        session.shutdown().await;
    }
}

// ============================================================================
// Status updates
// ============================================================================

mod updates {
    use super::*;

    #[tokio::test]
    async fn notify_list_updates_store_and_callbacks() {
        let controller = FakeController::start(&[]).await;
        let session = ready_session(&controller).await;
        let mut events = session.events();

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.on_status_changed(move |object, status| {
            sink.lock().push((object.clone(), status));
        });

        controller.notify(json!([{"objnam": "C0003", "params": {"STATUS": "ON"}}]));

        let event = next_event(&mut events, |e| {
            matches!(e, SessionEvent::StateChanged(StateChange::CircuitStatus { .. }))
        })
        .await;
        assert_eq!(
            event,
            SessionEvent::StateChanged(StateChange::CircuitStatus {
                id: id("C0003"),
                status: CircuitStatus::On,
            })
        );
        assert_eq!(
            session.store().read().circuit(&id("C0003")).and_then(|c| c.status),
            Some(CircuitStatus::On)
        );
        assert_eq!(seen.lock().as_slice(), &[(id("C0003"), CircuitStatus::On)]);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn body_temperature_is_reported_in_celsius() {
        let controller = FakeController::start(&[]).await;
        let session = ready_session(&controller).await;
        let mut events = session.events();

        controller.notify(json!([{"objnam": "B1101", "params": {"LSTTMP": "26"}}]));

        let event = next_event(&mut events, |e| {
            matches!(e, SessionEvent::StateChanged(StateChange::Temperature { .. }))
        })
        .await;
        assert_eq!(
            event,
            SessionEvent::StateChanged(StateChange::Temperature {
                id: id("B1101"),
                celsius: 26.0,
            })
        );

        session.shutdown().await;
    }

    #[tokio::test]
    async fn repeated_values_are_not_reported() {
        let controller = FakeController::start(&[]).await;
        let session = ready_session(&controller).await;
        let mut events = session.events();

        controller.notify(json!([{"objnam": "C0003", "params": {"STATUS": "OFF"}}]));
        controller.notify(json!([{"objnam": "C0003", "params": {"STATUS": "ON"}}]));

        // the unchanged OFF produces nothing, so the first change seen is ON
        let event = next_event(&mut events, |e| e.state_change().is_some()).await;
        assert_eq!(
            event,
            SessionEvent::StateChanged(StateChange::CircuitStatus {
                id: id("C0003"),
                status: CircuitStatus::On,
            })
        );

        session.shutdown().await;
    }
}

// ============================================================================
// Commands
// ============================================================================

mod commands {
    use super::*;

    #[tokio::test]
    async fn set_circuit_reaches_controller() {
        let mut controller = FakeController::start(&[]).await;
        let session = ready_session(&controller).await;

        session.set_circuit(&id("C0003"), true).await.unwrap();

        let request = controller
            .expect_request(|r| r["command"] == "SetParamList")
            .await;
        assert_eq!(request["objectList"][0]["objnam"], "C0003");
        assert_eq!(request["objectList"][0]["params"]["STATUS"], "ON");

        session.shutdown().await;
    }

    #[tokio::test]
    async fn set_temperature_is_clamped_to_bounds() {
        let mut controller = FakeController::start(&[]).await;
        let session = ready_session(&controller).await;

        session.set_temperature(&id("B1101"), 55.0).await.unwrap();

        let request = controller
            .expect_request(|r| r["command"] == "SetParamList")
            .await;
        assert_eq!(request["objectList"][0]["objnam"], "B1101");
        assert_eq!(request["objectList"][0]["params"]["LOTMP"], "40");

        session.shutdown().await;
    }

    #[tokio::test]
    async fn commands_after_shutdown_fail() {
        let controller = FakeController::start(&[]).await;
        let session = ready_session(&controller).await;
        session.shutdown().await;

        assert!(session.is_closed());
        assert!(session.set_circuit(&id("C0003"), true).await.is_err());
    }
}

// ============================================================================
// Reconnection
// ============================================================================

mod reconnect {
    use super::*;

    #[tokio::test]
    async fn reconnects_after_controller_drops_connection() {
        let controller = FakeController::start(&[]).await;
        let session = ready_session(&controller).await;
        let mut events = session.events();

        controller.close_connection();

        next_event(&mut events, |e| {
            matches!(
                e,
                SessionEvent::ConnectionChanged {
                    state: ConnectionState::Disconnected,
                    ..
                }
            )
        })
        .await;
        next_event(&mut events, |e| {
            matches!(
                e,
                SessionEvent::ConnectionChanged {
                    state: ConnectionState::Ready,
                    ..
                }
            )
        })
        .await;
        assert!(session.store().read().body(&id("B1101")).is_some());

        let diagnostics = session.diagnostics().await.unwrap();
        assert_eq!(diagnostics.connection, ConnectionState::Ready);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn silent_controller_is_dropped_and_redialed() {
        let controller = FakeController::start(&[]).await;
        let mut config = config(controller.port);
        config.timings.heartbeat_interval = Duration::from_millis(50);
        config.timings.silence_threshold = Duration::from_millis(300);
        let session = Session::start(config).unwrap();
        timeout(WAIT, session.wait_for(ConnectionState::Ready))
            .await
            .expect("session never became ready")
            .unwrap();
        let mut events = session.events();

        // the fake never answers heartbeats
        let dropped = next_event(&mut events, |e| {
            matches!(
                e,
                SessionEvent::ConnectionChanged {
                    state: ConnectionState::Disconnected,
                    ..
                }
            )
        })
        .await;
        assert_eq!(
            dropped,
            SessionEvent::ConnectionChanged {
                state: ConnectionState::Disconnected,
                error: Some("connection silent".to_string()),
            }
        );
        next_event(&mut events, |e| {
            matches!(
                e,
                SessionEvent::ConnectionChanged {
                    state: ConnectionState::Connecting,
                    ..
                }
            )
        })
        .await;

        session.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_clears_state() {
        let controller = FakeController::start(&[]).await;
        let session = ready_session(&controller).await;

        session.shutdown().await;

        assert!(session.store().read().is_empty());
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    }
}
