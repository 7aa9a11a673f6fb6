// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callback subscriptions for entity updates.
//!
//! The presentation layer refreshes its own representation through
//! per-entity hooks: status, temperature, heat mode, pump metrics and colour
//! changes, plus connection changes and raw session events.
//!
//! - [`SubscriptionId`] - Identifies a subscription, used to unsubscribe
//! - [`CallbackRegistry`] - Stores callbacks and dispatches changes
//! - [`Subscribable`] - Subscription methods on the session handle
//!
//! Callbacks run on the session task. The broadcast
//! [`EventBus`](crate::event::EventBus) is the alternative for consumers that
//! prefer to await events.

mod callback;
mod subscribable;

pub use callback::{CallbackRegistry, SubscriptionId};
pub use subscribable::Subscribable;
