// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session events.
//!
//! The session publishes a [`SessionEvent`] for every connection change,
//! discovery result, state change and dropped command on an [`EventBus`]
//! backed by a tokio broadcast channel.
//!
//! # Examples
//!
//! ```
//! use intellicenter_lib::event::{ConnectionState, EventBus, SessionEvent};
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//! bus.publish(SessionEvent::DiscoveryFailed { failed: vec![] });
//! assert!(matches!(rx.try_recv(), Ok(SessionEvent::DiscoveryFailed { .. })));
//! ```

mod event_bus;
mod session_event;

pub use event_bus::EventBus;
pub use session_event::{ConnectionState, ParseErrorLevel, SessionEvent};
