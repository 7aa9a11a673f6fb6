// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controller session.
//!
//! [`Session::start`] validates the configuration and spawns the session
//! task, which connects, discovers the hardware, subscribes to status
//! updates and keeps the [`EntityStore`](crate::state::EntityStore) current
//! until [`Session::shutdown`].
//!
//! # Examples
//!
//! ```no_run
//! use intellicenter_lib::{ConnectionState, Session, SessionConfig};
//! use intellicenter_lib::types::ObjectId;
//!
//! # async fn example() -> intellicenter_lib::Result<()> {
//! let config = SessionConfig::builder().host("192.168.1.40").build()?;
//! let session = Session::start(config)?;
//!
//! session.wait_for(ConnectionState::Ready).await?;
//! session.set_circuit(&ObjectId::new("C0006"), true).await?;
//!
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod actor;
mod command_queue;
mod parse_errors;

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::event::{ConnectionState, EventBus, SessionEvent};
use crate::heating::{HeatingLimits, HeatingState, resolve_heating_state};
use crate::protocol::IntelliCenterRequest;
use crate::resilience::{CircuitState, DeadLetter, HealthSnapshot};
use crate::state::{EntityStore, SharedStore};
use crate::subscription::{CallbackRegistry, Subscribable};
use crate::topology::{HeaterAssociation, SpeedBandHeuristic};
use crate::types::ObjectId;

use actor::{Actor, Control, Shared};
pub use command_queue::CommandQueue;
pub use parse_errors::{
    ELEVATED_THRESHOLD, FIRMWARE_THRESHOLD, ParseErrorReport, ParseErrorTracker,
    RECONNECT_THRESHOLD,
};

const CONTROL_CHANNEL_CAPACITY: usize = 64;

/// Point-in-time view of the session internals.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    /// Connection state.
    pub connection: ConnectionState,
    /// Circuit breaker guarding connects.
    pub breaker: CircuitState,
    /// Connection health counters.
    pub health: HealthSnapshot,
    /// Retained commands that failed to send.
    pub dead_letters: Vec<DeadLetter>,
    /// Every id the last discovery produced.
    pub discovered_ids: BTreeSet<ObjectId>,
    /// Commands waiting to be sent.
    pub queued_commands: usize,
    /// Rate limiter tokens left.
    pub rate_limit_available: u32,
    /// Controller parse errors in the current window.
    pub parse_errors: usize,
}

/// Handle to a running controller session.
///
/// Dropping the handle stops the session task; [`shutdown`](Self::shutdown)
/// does the same and waits for cleanup to finish.
pub struct Session {
    control: mpsc::Sender<Control>,
    store: SharedStore,
    callbacks: Arc<CallbackRegistry>,
    bus: EventBus,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    limits: HeatingLimits,
}

impl Session {
    /// Validates `config` and starts the session with the default heater
    /// association heuristic.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every invalid setting. Nothing is
    /// spawned in that case.
    pub fn start(config: SessionConfig) -> Result<Self> {
        let association = SpeedBandHeuristic::new(config.heater_scoring.clone());
        Self::start_with(config, association)
    }

    /// Like [`start`](Self::start) with a custom heater association.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every invalid setting.
    pub fn start_with(
        config: SessionConfig,
        association: impl HeaterAssociation + 'static,
    ) -> Result<Self> {
        config.validate()?;

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let store = EntityStore::shared();
        let callbacks = Arc::new(CallbackRegistry::new());
        let bus = EventBus::new();
        let cancel = CancellationToken::new();
        let limits = HeatingLimits::from_config(&config);

        let shared = Shared {
            store: Arc::clone(&store),
            callbacks: Arc::clone(&callbacks),
            bus: bus.clone(),
            state: state_tx,
        };
        let actor = Actor::new(config, shared, control_rx, cancel.clone(), Box::new(association));
        let task = tokio::spawn(actor.run());

        Ok(Self {
            control: control_tx,
            store,
            callbacks,
            bus,
            state: state_rx,
            cancel,
            task: Mutex::new(Some(task)),
            limits,
        })
    }

    async fn control(&self, control: Control) -> Result<()> {
        self.control
            .send(control)
            .await
            .map_err(|_| Error::SessionClosed)
    }

    async fn ask<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Control) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.control(make(tx)).await?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Queues a request for the controller.
    ///
    /// Fire-and-forget: the request is dropped if the rate limit is
    /// exceeded, and held while disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] after shutdown.
    pub async fn send(&self, request: IntelliCenterRequest) -> Result<()> {
        self.control(Control::Send(request)).await
    }

    /// Writes parameters of one object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] after shutdown.
    pub async fn set_params<K, V>(
        &self,
        objnam: &ObjectId,
        params: impl IntoIterator<Item = (K, V)>,
    ) -> Result<()>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.send(IntelliCenterRequest::set_params(objnam.clone(), params))
            .await
    }

    /// Turns a circuit, feature or body on or off.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] after shutdown.
    pub async fn set_circuit(&self, id: &ObjectId, on: bool) -> Result<()> {
        self.send(IntelliCenterRequest::set_status(id.clone(), on))
            .await
    }

    /// Sets a body's heating set point, given in °C.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Value`] for a non-finite temperature, or
    /// [`Error::SessionClosed`] after shutdown.
    pub async fn set_temperature(&self, body: &ObjectId, celsius: f64) -> Result<()> {
        let request = self.limits.set_point(body, celsius)?;
        self.send(request).await
    }

    /// Sets a body's cooling set point, given in °C.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Value`] for a non-finite temperature, or
    /// [`Error::SessionClosed`] after shutdown.
    pub async fn set_cooling_temperature(&self, body: &ObjectId, celsius: f64) -> Result<()> {
        let request = self.limits.cooling_set_point(body, celsius)?;
        self.send(request).await
    }

    /// Selects a heater for a body, or none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] after shutdown.
    pub async fn set_heat_mode(&self, body: &ObjectId, heater: Option<&ObjectId>) -> Result<()> {
        self.send(self.limits.heat_mode(body, heater)).await
    }

    /// Re-runs hardware discovery on the current connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] after shutdown.
    pub async fn rediscover(&self) -> Result<()> {
        self.control(Control::Rediscover).await
    }

    /// Re-queues every retained dead letter and returns how many there were.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] after shutdown.
    pub async fn replay_dead_letters(&self) -> Result<usize> {
        self.ask(Control::ReplayDeadLetters).await
    }

    /// Registers ids known from a previous run so the next discovery can
    /// prune the ones that disappeared.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] after shutdown.
    pub async fn restore_accessories(&self, ids: impl IntoIterator<Item = ObjectId>) -> Result<()> {
        self.control(Control::RestoreAccessories(ids.into_iter().collect()))
            .await
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Shared entity store. Only the session task writes to it.
    #[must_use]
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Current heating state of a body, if it is known.
    #[must_use]
    pub fn heating_state(&self, body: &ObjectId) -> Option<HeatingState> {
        self.store.read().body(body).map(resolve_heating_state)
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Waits until the connection reaches `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session stops first.
    pub async fn wait_for(&self, target: ConnectionState) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| Error::SessionClosed)
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    /// Snapshot of connection, breaker, health and dead letter state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] after shutdown.
    pub async fn diagnostics(&self) -> Result<Diagnostics> {
        self.ask(Control::Diagnostics).await
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Returns `true` once shutdown started.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stops the session and waits for cleanup. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "Session task failed");
        }
    }
}

impl Subscribable for Session {
    fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.connection_state())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_spawns_nothing() {
        // no runtime here: a spawn attempt would panic
        let config = SessionConfig {
            host: String::new(),
            port: 0,
            ..SessionConfig::default()
        };
        let err = Session::start(config).unwrap_err();
        match err {
            Error::Config(e) => assert!(e.issues().len() >= 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let config = SessionConfig::builder()
            .host("127.0.0.1")
            .port(1)
            .skip_reachability_check(true)
            .build()
            .unwrap();
        let session = Session::start(config).unwrap();
        session.shutdown().await;
        session.shutdown().await;
        assert!(session.is_closed());
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(matches!(
            session.send(IntelliCenterRequest::set_status("C0001", true)).await,
            Err(Error::SessionClosed)
        ));
    }
}
