// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscribable trait for handles that expose a callback registry.

use crate::event::{ConnectionState, SessionEvent};
use crate::state::StateChange;
use crate::subscription::{CallbackRegistry, SubscriptionId};
use crate::topology::{LightColor, PumpMetrics};
use crate::types::{CircuitStatus, ObjectId};

/// Subscription methods shared by anything backed by a [`CallbackRegistry`].
///
/// Only [`callbacks`](Self::callbacks) is required; every other method
/// forwards to the registry.
///
/// # Examples
///
/// ```no_run
/// use intellicenter_lib::{Session, SessionConfig};
/// use intellicenter_lib::subscription::Subscribable;
///
/// # async fn example() -> intellicenter_lib::Result<()> {
/// let config = SessionConfig::builder().host("192.168.1.20").build()?;
/// let session = Session::start(config)?;
///
/// let sub = session.on_status_changed(|id, status| {
///     println!("{id} is now {status}");
/// });
/// session.unsubscribe(sub);
/// # Ok(())
/// # }
/// ```
pub trait Subscribable {
    /// The registry callbacks are stored in.
    fn callbacks(&self) -> &CallbackRegistry;

    /// Subscribes to on/off changes.
    fn on_status_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ObjectId, CircuitStatus) + Send + Sync + 'static,
    {
        self.callbacks().on_status_changed(callback)
    }

    /// Subscribes to temperature changes.
    fn on_temperature_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.callbacks().on_temperature_changed(callback)
    }

    /// Subscribes to heat mode changes.
    fn on_heat_mode_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.callbacks().on_heat_mode_changed(callback)
    }

    /// Subscribes to pump RPM/GPM/WATTS changes.
    fn on_pump_metrics_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ObjectId, PumpMetrics) + Send + Sync + 'static,
    {
        self.callbacks().on_pump_metrics_changed(callback)
    }

    /// Subscribes to colour light changes.
    fn on_color_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ObjectId, LightColor) + Send + Sync + 'static,
    {
        self.callbacks().on_color_changed(callback)
    }

    /// Subscribes to connection state changes.
    fn on_connection_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.callbacks().on_connection_changed(callback)
    }

    /// Subscribes to every state change.
    fn on_state_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.callbacks().on_state_changed(callback)
    }

    /// Subscribes to every session event.
    fn on_event<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.callbacks().on_event(callback)
    }

    /// Removes a subscription. Returns `true` if it existed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.callbacks().unsubscribe(id)
    }
}
