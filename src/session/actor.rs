// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The session task.
//!
//! One task owns the connection, the command queue, discovery, the
//! resilience primitives and every timer. Socket bytes arrive from the
//! per-connection reader task and collaborator requests from the
//! [`Session`](super::Session) handle, both over channels, so all session
//! state has a single writer.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::discovery::{DiscoveryAction, DiscoveryOrchestrator, DiscoveryOutcome, DiscoveryTimings};
use crate::dispatch::Router;
use crate::error::{Error, ProtocolError, ResilienceError};
use crate::event::{ConnectionState, EventBus, ParseErrorLevel, SessionEvent};
use crate::protocol::{
    Connection, ConnectionEvent, IntelliCenterRequest, IntelliCenterResponse, LineFramer,
    RequestEncoder, TaggedEvent, TelnetFilter, check_reachability,
};
use crate::resilience::{
    CircuitBreaker, CircuitState, DeadLetterQueue, HealthMonitor, RateLimiter,
};
use crate::state::{SharedStore, StateChange};
use crate::subscription::CallbackRegistry;
use crate::telemetry::{MonitorVerdict, UnitMonitor};
use crate::topology::{HeaterAssociation, TopologyBuilder, TopologyOptions};
use crate::types::ObjectId;

use super::command_queue::CommandQueue;
use super::parse_errors::ParseErrorTracker;
use super::Diagnostics;

const EVENT_CHANNEL_CAPACITY: usize = 256;

type ConnectResult = Result<Connection, ResilienceError>;

/// Requests from the session handle.
#[derive(Debug)]
pub(crate) enum Control {
    Send(IntelliCenterRequest),
    ReplayDeadLetters(oneshot::Sender<usize>),
    Diagnostics(oneshot::Sender<Diagnostics>),
    RestoreAccessories(Vec<ObjectId>),
    Rediscover,
}

/// Shared pieces the handle keeps a reference to.
pub(crate) struct Shared {
    pub store: SharedStore,
    pub callbacks: Arc<CallbackRegistry>,
    pub bus: EventBus,
    pub state: watch::Sender<ConnectionState>,
}

pub(crate) struct Actor {
    config: SessionConfig,
    shared: Shared,
    control: mpsc::Receiver<Control>,
    cancel: CancellationToken,
    association: Box<dyn HeaterAssociation>,

    events_tx: mpsc::Sender<TaggedEvent>,
    events_rx: mpsc::Receiver<TaggedEvent>,
    connection: Option<Connection>,
    connecting: Option<JoinHandle<ConnectResult>>,
    generation: u64,

    telnet: TelnetFilter,
    framer: LineFramer,
    encoder: RequestEncoder,
    discovery: DiscoveryOrchestrator,
    router: Router,
    queue: CommandQueue,
    parse_errors: ParseErrorTracker,

    breaker: CircuitBreaker,
    health: HealthMonitor,
    dead_letters: DeadLetterQueue,
    monitor: Option<UnitMonitor>,
    monitor_started: bool,

    last_received: Instant,
    next_heartbeat: Option<Instant>,
    reconnect_at: Option<Instant>,
    last_connect: Option<Instant>,
    cleaned_up: bool,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn join_connect(task: &mut Option<JoinHandle<ConnectResult>>) -> Result<ConnectResult, JoinError> {
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn earliest(deadlines: impl IntoIterator<Item = Option<Instant>>) -> Option<Instant> {
    deadlines.into_iter().flatten().min()
}

impl Actor {
    pub(crate) fn new(
        config: SessionConfig,
        shared: Shared,
        control: mpsc::Receiver<Control>,
        cancel: CancellationToken,
        association: Box<dyn HeaterAssociation>,
    ) -> Self {
        let timings = &config.timings;
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let now = Instant::now();
        Self {
            telnet: TelnetFilter::new(),
            framer: LineFramer::new(config.max_buffer_size),
            encoder: RequestEncoder::new(),
            discovery: DiscoveryOrchestrator::new(DiscoveryTimings::from(timings)),
            router: Router::new(config.temperature_unit),
            queue: CommandQueue::new(
                RateLimiter::new(timings.rate_limit_capacity, timings.rate_limit_window),
                timings.command_delay,
            ),
            parse_errors: ParseErrorTracker::new(timings.parse_error_window),
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            health: HealthMonitor::new(),
            dead_letters: DeadLetterQueue::default(),
            monitor: None,
            monitor_started: false,
            last_received: now,
            next_heartbeat: None,
            reconnect_at: Some(now),
            last_connect: None,
            cleaned_up: false,
            connection: None,
            connecting: None,
            generation: 0,
            events_tx,
            events_rx,
            config,
            shared,
            control,
            cancel,
            association,
        }
    }

    fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn next_deadline(&self, now: Instant) -> Option<Instant> {
        let idle = self.connection.is_none() && self.connecting.is_none();
        earliest([
            self.reconnect_at.filter(|_| idle),
            self.next_heartbeat,
            self.discovery.next_deadline(),
            self.queue.next_deadline(now, self.is_connected()),
            self.monitor.as_ref().and_then(UnitMonitor::next_deadline),
        ])
    }

    /// Runs until cancelled or the handle is dropped.
    pub(crate) async fn run(mut self) {
        tracing::info!(address = %self.config.address(), "Session started");
        loop {
            let deadline = self.next_deadline(Instant::now());
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                Some((generation, event)) = self.events_rx.recv() => {
                    self.on_connection_event(generation, event).await;
                }
                result = join_connect(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_result(result).await;
                }
                control = self.control.recv() => match control {
                    Some(control) => self.on_control(control).await,
                    None => break,
                },
                () = sleep_until_opt(deadline) => {}
            }
            self.tick(Instant::now()).await;
        }
        self.cleanup().await;
        tracing::info!("Session stopped");
    }

    // =========================================================================
    // Events and notifications
    // =========================================================================

    fn emit(&self, event: SessionEvent) {
        self.shared.callbacks.dispatch_event(&event);
        self.shared.bus.publish(event);
    }

    fn set_state(&self, state: ConnectionState, error: Option<String>) {
        let changed = self.shared.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        if changed {
            tracing::debug!(state = %state, "Connection state changed");
            self.emit(SessionEvent::ConnectionChanged { state, error });
        }
    }

    fn emit_changes(&self, changes: Vec<StateChange>) {
        for change in changes {
            self.emit(SessionEvent::StateChanged(change));
        }
    }

    // =========================================================================
    // Timers
    // =========================================================================

    async fn tick(&mut self, now: Instant) {
        if let Some(at) = self.reconnect_at
            && now >= at
            && self.connection.is_none()
            && self.connecting.is_none()
        {
            self.start_connect(now);
        }

        if let Some(at) = self.next_heartbeat
            && now >= at
        {
            self.next_heartbeat = Some(now + self.config.timings.heartbeat_interval);
            self.heartbeat(now).await;
        }

        self.drive_discovery(now).await;
        self.drain_queue(now).await;
        self.poll_monitor(now);
    }

    async fn heartbeat(&mut self, now: Instant) {
        let silence = now.saturating_duration_since(self.last_received);
        if self.is_connected() && silence > self.config.timings.silence_threshold {
            tracing::warn!(
                silent_secs = silence.as_secs(),
                "No data from controller, assuming a half-open socket"
            );
            self.disconnect(now, Some("connection silent".to_string())).await;
        } else {
            tracing::trace!(silent_secs = silence.as_secs(), "Heartbeat");
        }
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        if self.connecting.is_some() || self.reconnect_at.is_some() {
            tracing::debug!("Reconnect already pending");
            return;
        }
        let timings = &self.config.timings;
        let mut at = now + timings.reconnect_delay;
        if let Some(last) = self.last_connect {
            at = at.max(last + timings.reconnect_debounce);
        }
        tracing::info!(
            delay_ms = u64::try_from(at.saturating_duration_since(now).as_millis()).unwrap_or(u64::MAX),
            "Reconnect scheduled"
        );
        self.reconnect_at = Some(at);
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    fn start_connect(&mut self, now: Instant) {
        self.reconnect_at = None;
        self.last_connect = Some(now);

        if let Err(e) = self.breaker.try_acquire(now) {
            let retry_in = self.config.timings.reconnect_delay;
            let breaker = self.breaker.state(now);
            tracing::warn!(error = %e, breaker = %breaker, "Connect attempt rejected");
            self.emit(SessionEvent::ConnectFailed {
                error: e.to_string(),
                breaker,
                retry_in,
            });
            self.reconnect_at = Some(now + retry_in);
            return;
        }

        self.generation += 1;
        self.set_state(ConnectionState::Connecting, None);

        let address = self.config.address();
        let skip_check = self.config.skip_reachability_check;
        let timeout = self.config.timings.reachability_timeout;
        let retry = self.config.retry.clone();
        let events = self.events_tx.clone();
        let generation = self.generation;

        self.connecting = Some(tokio::spawn(async move {
            retry
                .run(|attempt| {
                    let address = address.clone();
                    let events = events.clone();
                    async move {
                        tracing::debug!(attempt, address = %address, "Connecting to controller");
                        if !skip_check {
                            check_reachability(&address, timeout).await?;
                        }
                        Connection::open(&address, timeout, generation, events).await
                    }
                })
                .await
        }));
    }

    async fn on_connect_result(&mut self, result: Result<ConnectResult, JoinError>) {
        let now = Instant::now();
        let error = match result {
            Ok(Ok(connection)) => {
                self.on_connected(connection, now).await;
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("connect task failed: {e}"),
        };

        self.breaker.record_failure(now);
        self.health.record_failure(error.clone());
        let breaker = self.breaker.state(now);
        let retry_in = self.config.timings.reconnect_delay;
        tracing::error!(
            error = %error,
            breaker = %breaker,
            consecutive_failures = self.breaker.consecutive_failures(),
            "Could not connect to controller"
        );
        self.set_state(ConnectionState::Disconnected, Some(error.clone()));
        self.emit(SessionEvent::ConnectFailed {
            error,
            breaker,
            retry_in,
        });
        self.reconnect_at = Some(now + retry_in);
    }

    async fn on_connected(&mut self, connection: Connection, now: Instant) {
        if self.breaker.current_state() != CircuitState::Closed {
            tracing::info!("Circuit breaker closed after successful connect");
        }
        self.breaker.record_success();
        self.health.record_success();
        self.connection = Some(connection);
        self.telnet.reset();
        self.framer.clear();
        self.last_received = now;
        self.next_heartbeat = Some(now + self.config.timings.heartbeat_interval);
        self.set_state(ConnectionState::Connected, None);

        self.discovery.start(now);
        self.drive_discovery(now).await;
    }

    /// Tears the connection down and schedules a reconnect.
    async fn disconnect(&mut self, now: Instant, error: Option<String>) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        if self.discovery.is_active() {
            tracing::warn!("Discovery interrupted by disconnect");
        }
        self.discovery.cancel();
        self.framer.clear();
        self.telnet.reset();
        self.next_heartbeat = None;
        if let Some(error) = &error {
            self.health.record_failure(error.clone());
        }
        self.set_state(ConnectionState::Disconnected, error);
        self.schedule_reconnect(now);
    }

    async fn on_connection_event(&mut self, generation: u64, event: ConnectionEvent) {
        let current = self.connection.as_ref().map(Connection::generation);
        if current != Some(generation) {
            tracing::trace!(generation, "Ignoring event from a stale connection");
            return;
        }
        let now = Instant::now();
        match event {
            ConnectionEvent::Data(bytes) => {
                self.last_received = now;
                self.on_data(&bytes, now).await;
            }
            ConnectionEvent::Closed => {
                tracing::warn!("Controller closed the connection");
                self.disconnect(now, Some("connection closed".to_string())).await;
            }
            ConnectionEvent::Error(e) => {
                tracing::warn!(error = %e, "Connection error");
                self.disconnect(now, Some(e.to_string())).await;
            }
        }
    }

    async fn on_data(&mut self, bytes: &[u8], now: Instant) {
        let filtered = self.telnet.filter(bytes);
        if !filtered.replies.is_empty()
            && let Some(connection) = self.connection.as_mut()
            && let Err(e) = connection.write(&filtered.replies).await
        {
            tracing::warn!(error = %e, "Failed to answer telnet negotiation");
        }

        let frames = self.framer.push(&filtered.data);
        if !frames.errors.is_empty() {
            tracing::debug!(dropped = frames.errors.len(), "Dropped undecodable data");
        }
        for response in frames.responses {
            if self.cancel.is_cancelled() || !self.is_connected() {
                break;
            }
            self.on_response(response, now).await;
        }
    }

    // =========================================================================
    // Inbound messages
    // =========================================================================

    async fn on_response(&mut self, response: IntelliCenterResponse, now: Instant) {
        if self.discovery.handle_response(&response, now) {
            if response.is_parse_error() {
                self.on_parse_error(&response, now).await;
            }
            self.drive_discovery(now).await;
            return;
        }

        if response.is_parse_error() {
            self.on_parse_error(&response, now).await;
            return;
        }
        if response.is_error() {
            tracing::error!(
                command = ?response.command,
                code = response.response.as_deref().unwrap_or(""),
                description = response.description.as_deref().unwrap_or(""),
                message_id = response.message_id.as_deref().unwrap_or(""),
                "Controller reported an error"
            );
            return;
        }

        let updates = response.status_updates();
        if updates.is_empty() {
            tracing::trace!(command = ?response.command, "Response without status updates");
            return;
        }
        let changes = {
            let mut store = self.shared.store.write();
            self.router.route_all(&mut store, updates)
        };
        self.emit_changes(changes);
    }

    async fn on_parse_error(&mut self, response: &IntelliCenterResponse, now: Instant) {
        let report = self.parse_errors.record(now);
        let description = response.description.as_deref().unwrap_or("");
        match report.level {
            None => tracing::warn!(count = report.count, description, "Controller parse error"),
            Some(ParseErrorLevel::Elevated) => tracing::warn!(
                count = report.count,
                description,
                "Repeated controller parse errors"
            ),
            Some(ParseErrorLevel::FirmwareSuspect) => tracing::error!(
                count = report.count,
                description,
                "Parse errors point at a controller firmware issue"
            ),
            Some(ParseErrorLevel::Reconnect) => tracing::error!(
                count = report.count,
                description,
                "Parse error storm, forcing reconnect"
            ),
        }
        if let Some(level) = report.level.filter(|_| report.escalated) {
            self.emit(SessionEvent::ParseErrorStorm {
                count: report.count,
                level,
            });
            if level == ParseErrorLevel::Reconnect {
                self.parse_errors.reset();
                self.disconnect(now, Some("parse error storm".to_string())).await;
            }
        }
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    async fn drive_discovery(&mut self, now: Instant) {
        while let Some(action) = self.discovery.poll(now) {
            match action {
                DiscoveryAction::Send(mut request) => {
                    if let Err(e) = self.write(&mut request).await {
                        tracing::warn!(
                            error = %e,
                            arguments = request.arguments.as_deref().unwrap_or(""),
                            "Failed to send discovery query"
                        );
                        if is_connection_related(&e) {
                            self.disconnect(now, Some(e.to_string())).await;
                            return;
                        }
                    }
                }
                DiscoveryAction::Complete(outcome) => self.finish_discovery(outcome, now).await,
            }
        }
    }

    async fn finish_discovery(&mut self, outcome: DiscoveryOutcome, now: Instant) {
        let failed: Vec<_> = outcome.failed.iter().copied().collect();
        if !outcome.has_data() {
            tracing::error!(failed = ?failed, "Discovery returned no data, keeping previous topology");
            self.emit(SessionEvent::DiscoveryFailed { failed });
            let known = !self.shared.store.read().is_empty();
            if !known {
                self.disconnect(now, Some("discovery returned no data".to_string()))
                    .await;
            } else {
                self.set_state(ConnectionState::Ready, None);
            }
            return;
        }

        let options = TopologyOptions {
            include_all_circuits: self.config.include_all_circuits,
            air_temp: self.config.air_temp,
            unit: self.config.temperature_unit,
        };
        let mut topology = TopologyBuilder::new(options, self.association.as_ref()).build(&outcome.tree);
        let subscriptions = std::mem::take(&mut topology.subscriptions);
        let removed = self.shared.store.write().apply_topology(topology);

        tracing::info!(
            succeeded = outcome.succeeded.len(),
            failed = failed.len(),
            removed = removed.len(),
            elapsed_ms = u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Discovery complete"
        );
        self.emit_changes(
            removed
                .iter()
                .map(|id| StateChange::EntityRemoved { id: id.clone() })
                .collect(),
        );
        self.emit(SessionEvent::DiscoveryCompleted {
            succeeded: outcome.succeeded.iter().copied().collect(),
            failed,
            elapsed: outcome.elapsed,
            removed,
        });

        for request in subscriptions {
            self.enqueue(request, now);
        }
        self.set_state(ConnectionState::Ready, None);

        if !self.monitor_started {
            self.monitor_started = true;
            let timings = &self.config.timings;
            self.monitor = Some(UnitMonitor::new(
                self.config.temperature_unit,
                timings.monitor_interval,
                timings.monitor_duration,
                now,
            ));
        }
    }

    // =========================================================================
    // Outbound commands
    // =========================================================================

    fn enqueue(&mut self, request: IntelliCenterRequest, now: Instant) {
        let targets = owned_targets(&request);
        if !self.queue.enqueue(request, now) {
            self.emit(SessionEvent::CommandDropped { targets });
        }
    }

    async fn write(&mut self, request: &mut IntelliCenterRequest) -> Result<(), Error> {
        let line = self.encoder.encode(request)?;
        let connection = self
            .connection
            .as_mut()
            .ok_or(ProtocolError::NotConnected)?;
        connection.write(line.as_bytes()).await?;
        tracing::debug!(
            command = %request.command,
            message_id = %request.message_id,
            targets = ?request.targets(),
            "Sent request"
        );
        Ok(())
    }

    async fn drain_queue(&mut self, now: Instant) {
        loop {
            let connected = self.is_connected();
            let Some(mut request) = self.queue.pop_due(now, connected) else {
                break;
            };
            if let Err(e) = self.write(&mut request).await {
                let error = e.to_string();
                let targets = owned_targets(&request);
                self.health.record_failure(error.clone());
                self.dead_letters.push(request, error.clone(), Utc::now());
                self.emit(SessionEvent::CommandDeadLettered {
                    targets,
                    error: error.clone(),
                });
                if is_connection_related(&e) {
                    self.disconnect(now, Some(error)).await;
                    return;
                }
            }
        }
    }

    // =========================================================================
    // Unit monitor
    // =========================================================================

    fn poll_monitor(&mut self, now: Instant) {
        let Some(monitor) = self.monitor.as_mut() else {
            return;
        };
        if monitor.next_deadline().is_none_or(|at| now < at) {
            return;
        }
        let unit = self.config.temperature_unit;
        let readings: Vec<f64> = {
            let store = self.shared.store.read();
            store
                .bodies()
                .filter_map(|b| b.temperature)
                .chain(store.sensors().filter_map(|s| s.probe))
                .map(|celsius| unit.to_device(celsius))
                .collect()
        };
        match monitor.poll(now, readings) {
            MonitorVerdict::Pending => {}
            MonitorVerdict::Consistent(analysis) => {
                self.monitor = None;
                self.emit(SessionEvent::UnitConfirmed(analysis));
            }
            MonitorVerdict::Mismatch {
                configured,
                analysis,
            } => {
                self.monitor = None;
                self.emit(SessionEvent::UnitMismatch {
                    configured,
                    analysis,
                });
            }
            MonitorVerdict::Inactive => self.monitor = None,
        }
    }

    // =========================================================================
    // Control requests
    // =========================================================================

    async fn on_control(&mut self, control: Control) {
        let now = Instant::now();
        match control {
            Control::Send(request) => self.enqueue(request, now),
            Control::ReplayDeadLetters(reply) => {
                let letters = self.dead_letters.drain(Utc::now());
                let count = letters.len();
                tracing::info!(count, "Replaying dead letters");
                for letter in letters {
                    self.enqueue(letter.request, now);
                }
                let _ = reply.send(count);
            }
            Control::Diagnostics(reply) => {
                let diagnostics = Diagnostics {
                    connection: *self.shared.state.borrow(),
                    breaker: self.breaker.state(now),
                    health: self.health.snapshot(),
                    dead_letters: self.dead_letters.snapshot(Utc::now()),
                    discovered_ids: self.shared.store.read().discovered_ids().clone(),
                    queued_commands: self.queue.len(),
                    rate_limit_available: self.queue.available(now),
                    parse_errors: self.parse_errors.count(now),
                };
                let _ = reply.send(diagnostics);
            }
            Control::RestoreAccessories(ids) => {
                self.shared.store.write().restore_accessories(ids);
            }
            Control::Rediscover => {
                if self.is_connected() {
                    self.discovery.start(now);
                    self.drive_discovery(now).await;
                } else {
                    tracing::debug!("Rediscovery requested while disconnected");
                }
            }
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Releases every resource. Safe to call more than once.
    pub(crate) async fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;

        if let Some(task) = self.connecting.take() {
            task.abort();
        }
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        self.discovery.cancel();
        self.queue.clear();
        self.monitor = None;
        self.reconnect_at = None;
        self.next_heartbeat = None;
        self.framer.clear();
        self.telnet.reset();
        self.parse_errors.reset();
        self.breaker.reset();
        self.health.reset();
        self.shared.store.write().clear();
        self.set_state(ConnectionState::Disconnected, None);
    }
}

fn owned_targets(request: &IntelliCenterRequest) -> Vec<ObjectId> {
    request.object_list.iter().map(|o| o.objnam.clone()).collect()
}

fn is_connection_related(error: &Error) -> bool {
    matches!(error, Error::Protocol(e) if e.is_connection_related())
}
