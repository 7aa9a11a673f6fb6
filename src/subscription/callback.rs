// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callback management for entity and session subscriptions.
//!
//! - [`SubscriptionId`] - Unique identifier for unsubscribing
//! - [`CallbackRegistry`] - Registry storing and dispatching callbacks

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::event::{ConnectionState, SessionEvent};
use crate::state::StateChange;
use crate::topology::{LightColor, PumpMetrics};
use crate::types::{CircuitStatus, ObjectId};

/// Unique identifier for a subscription.
///
/// Returned when registering a callback; pass it to
/// [`CallbackRegistry::unsubscribe`] to remove the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

type StatusCallback = Arc<dyn Fn(&ObjectId, CircuitStatus) + Send + Sync>;
type TemperatureCallback = Arc<dyn Fn(&StateChange) + Send + Sync>;
type PumpMetricsCallback = Arc<dyn Fn(&ObjectId, PumpMetrics) + Send + Sync>;
type ColorCallback = Arc<dyn Fn(&ObjectId, LightColor) + Send + Sync>;
type HeatModeCallback = Arc<dyn Fn(&StateChange) + Send + Sync>;
type ConnectionCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;
type StateChangedCallback = Arc<dyn Fn(&StateChange) + Send + Sync>;
type EventCallback = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Per-entity update hooks for the presentation layer.
///
/// The session dispatches every applied [`StateChange`] and every
/// [`SessionEvent`] here, in addition to the broadcast event bus. Callbacks
/// run synchronously on the session task and must not block.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// use intellicenter_lib::state::StateChange;
/// use intellicenter_lib::subscription::CallbackRegistry;
/// use intellicenter_lib::types::{CircuitStatus, ObjectId};
///
/// let registry = CallbackRegistry::new();
/// let hits = Arc::new(AtomicU32::new(0));
/// let counter = hits.clone();
/// let id = registry.on_status_changed(move |_, _| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// registry.dispatch(&StateChange::circuit_status(ObjectId::new("C0003"), CircuitStatus::On));
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// assert!(registry.unsubscribe(id));
/// ```
pub struct CallbackRegistry {
    next_id: AtomicU64,
    status_callbacks: RwLock<HashMap<SubscriptionId, StatusCallback>>,
    temperature_callbacks: RwLock<HashMap<SubscriptionId, TemperatureCallback>>,
    heat_mode_callbacks: RwLock<HashMap<SubscriptionId, HeatModeCallback>>,
    pump_metrics_callbacks: RwLock<HashMap<SubscriptionId, PumpMetricsCallback>>,
    color_callbacks: RwLock<HashMap<SubscriptionId, ColorCallback>>,
    connection_callbacks: RwLock<HashMap<SubscriptionId, ConnectionCallback>>,
    state_changed_callbacks: RwLock<HashMap<SubscriptionId, StateChangedCallback>>,
    event_callbacks: RwLock<HashMap<SubscriptionId, EventCallback>>,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            status_callbacks: RwLock::new(HashMap::new()),
            temperature_callbacks: RwLock::new(HashMap::new()),
            heat_mode_callbacks: RwLock::new(HashMap::new()),
            pump_metrics_callbacks: RwLock::new(HashMap::new()),
            color_callbacks: RwLock::new(HashMap::new()),
            connection_callbacks: RwLock::new(HashMap::new()),
            state_changed_callbacks: RwLock::new(HashMap::new()),
            event_callbacks: RwLock::new(HashMap::new()),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // Registration methods
    // =========================================================================

    /// Registers a callback for on/off changes of circuits, bodies and pumps.
    pub fn on_status_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ObjectId, CircuitStatus) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.status_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for water temperature, set point range and
    /// sensor reading changes.
    pub fn on_temperature_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.temperature_callbacks
            .write()
            .insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for heater selection and heat mode changes.
    pub fn on_heat_mode_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.heat_mode_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for pump RPM/GPM/WATTS changes.
    pub fn on_pump_metrics_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ObjectId, PumpMetrics) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.pump_metrics_callbacks
            .write()
            .insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for colour light show changes.
    pub fn on_color_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ObjectId, LightColor) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.color_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for connection state changes.
    pub fn on_connection_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.connection_callbacks
            .write()
            .insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback receiving every state change.
    pub fn on_state_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.state_changed_callbacks
            .write()
            .insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback receiving every session event.
    pub fn on_event<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.event_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    // =========================================================================
    // Unsubscription
    // =========================================================================

    /// Removes a callback. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.status_callbacks.write().remove(&id).is_some()
            || self.temperature_callbacks.write().remove(&id).is_some()
            || self.heat_mode_callbacks.write().remove(&id).is_some()
            || self.pump_metrics_callbacks.write().remove(&id).is_some()
            || self.color_callbacks.write().remove(&id).is_some()
            || self.connection_callbacks.write().remove(&id).is_some()
            || self.state_changed_callbacks.write().remove(&id).is_some()
            || self.event_callbacks.write().remove(&id).is_some()
    }

    /// Removes every callback.
    pub fn clear(&self) {
        self.status_callbacks.write().clear();
        self.temperature_callbacks.write().clear();
        self.heat_mode_callbacks.write().clear();
        self.pump_metrics_callbacks.write().clear();
        self.color_callbacks.write().clear();
        self.connection_callbacks.write().clear();
        self.state_changed_callbacks.write().clear();
        self.event_callbacks.write().clear();
    }

    // =========================================================================
    // Dispatch methods
    // =========================================================================

    /// Dispatches a state change to the matching callbacks.
    ///
    /// Batches are dispatched to the generic callbacks once as a whole and
    /// then item by item.
    pub fn dispatch(&self, change: &StateChange) {
        for callback in self.state_changed_callbacks.read().values() {
            callback(change);
        }

        match change {
            StateChange::CircuitStatus { id, status } => {
                for callback in self.status_callbacks.read().values() {
                    callback(id, *status);
                }
            }
            StateChange::Temperature { .. }
            | StateChange::TemperatureRange { .. }
            | StateChange::SensorReading { .. } => {
                for callback in self.temperature_callbacks.read().values() {
                    callback(change);
                }
            }
            StateChange::HeatMode { .. } => {
                for callback in self.heat_mode_callbacks.read().values() {
                    callback(change);
                }
            }
            StateChange::PumpMetrics { pump, metrics } => {
                for callback in self.pump_metrics_callbacks.read().values() {
                    callback(pump, *metrics);
                }
            }
            StateChange::Color { id, color } => {
                for callback in self.color_callbacks.read().values() {
                    callback(id, color.clone());
                }
            }
            StateChange::PumpCircuit { .. } | StateChange::EntityRemoved { .. } => {
                // generic callbacks only
            }
            StateChange::Batch(changes) => {
                for nested in changes {
                    self.dispatch(nested);
                }
            }
        }
    }

    /// Dispatches a session event. State changes carried by the event are
    /// also dispatched as in [`dispatch`](Self::dispatch).
    pub fn dispatch_event(&self, event: &SessionEvent) {
        for callback in self.event_callbacks.read().values() {
            callback(event);
        }
        match event {
            SessionEvent::ConnectionChanged { state, .. } => {
                for callback in self.connection_callbacks.read().values() {
                    callback(*state);
                }
            }
            SessionEvent::StateChanged(change) => self.dispatch(change),
            _ => {}
        }
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Total number of registered callbacks.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.status_callbacks.read().len()
            + self.temperature_callbacks.read().len()
            + self.heat_mode_callbacks.read().len()
            + self.pump_metrics_callbacks.read().len()
            + self.color_callbacks.read().len()
            + self.connection_callbacks.read().len()
            + self.state_changed_callbacks.read().len()
            + self.event_callbacks.read().len()
    }

    /// Returns `true` if no callback is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callback_count() == 0
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callback_count", &self.callback_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counter() -> (Arc<AtomicU32>, Arc<AtomicU32>) {
        let c = Arc::new(AtomicU32::new(0));
        (c.clone(), c)
    }

    fn pool_on() -> StateChange {
        StateChange::circuit_status(ObjectId::new("C0006"), CircuitStatus::On)
    }

    #[test]
    fn subscription_id_display_and_hash() {
        use std::collections::HashSet;

        assert_eq!(SubscriptionId::new(42).to_string(), "Sub(42)");
        let set: HashSet<_> = [1, 2, 1].into_iter().map(SubscriptionId::new).collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn ids_are_unique() {
        let registry = CallbackRegistry::new();
        let a = registry.on_state_changed(|_| {});
        let b = registry.on_event(|_| {});
        assert_ne!(a, b);
        assert_eq!(registry.callback_count(), 2);
    }

    #[test]
    fn status_callback_and_unsubscribe() {
        let registry = CallbackRegistry::new();
        let (hits, c) = counter();
        let id = registry.on_status_changed(move |id, status| {
            assert_eq!(id.as_str(), "C0006");
            assert_eq!(status, CircuitStatus::On);
            c.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(&pool_on());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.dispatch(&pool_on());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn temperature_callbacks_see_all_temperature_kinds() {
        let registry = CallbackRegistry::new();
        let (hits, c) = counter();
        registry.on_temperature_changed(move |change| {
            assert!(change.is_temperature());
            c.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(&StateChange::Temperature {
            id: ObjectId::new("B1101"),
            celsius: 26.0,
        });
        registry.dispatch(&StateChange::SensorReading {
            id: ObjectId::new("SSW11"),
            celsius: 25.0,
        });
        registry.dispatch(&pool_on());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn pump_metrics_callback() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(RwLock::new(None));
        let sink = seen.clone();
        registry.on_pump_metrics_changed(move |pump, metrics| {
            *sink.write() = Some((pump.clone(), metrics));
        });

        let metrics = PumpMetrics {
            rpm: Some(2750.0),
            gpm: None,
            watts: Some(900.0),
        };
        registry.dispatch(&StateChange::PumpMetrics {
            pump: ObjectId::new("PMP01"),
            metrics,
        });
        assert_eq!(*seen.read(), Some((ObjectId::new("PMP01"), metrics)));
    }

    #[test]
    fn batch_dispatches_whole_and_items() {
        let registry = CallbackRegistry::new();
        let (generic, g) = counter();
        let (status, s) = counter();
        registry.on_state_changed(move |_| {
            g.fetch_add(1, Ordering::SeqCst);
        });
        registry.on_status_changed(move |_, _| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(&StateChange::batch(vec![pool_on(), pool_on()]));
        assert_eq!(generic.load(Ordering::SeqCst), 3);
        assert_eq!(status.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn events_reach_connection_and_state_callbacks() {
        let registry = CallbackRegistry::new();
        let (events, e) = counter();
        let (status, s) = counter();
        let states = Arc::new(RwLock::new(Vec::new()));
        let sink = states.clone();
        registry.on_event(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });
        registry.on_status_changed(move |_, _| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        registry.on_connection_changed(move |state| sink.write().push(state));

        registry.dispatch_event(&SessionEvent::ConnectionChanged {
            state: ConnectionState::Connected,
            error: None,
        });
        registry.dispatch_event(&SessionEvent::StateChanged(pool_on()));

        assert_eq!(events.load(Ordering::SeqCst), 2);
        assert_eq!(status.load(Ordering::SeqCst), 1);
        assert_eq!(*states.read(), vec![ConnectionState::Connected]);
    }

    #[test]
    fn clear_removes_everything() {
        let registry = CallbackRegistry::new();
        registry.on_color_changed(|_, _| {});
        registry.on_heat_mode_changed(|_| {});
        registry.clear();
        assert!(registry.is_empty());
    }
}
