// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tracked entity state.
//!
//! The [`EntityStore`] is the single arena holding every discovered
//! entity; [`StateChange`] describes what a status update altered.
//!
//! # Examples
//!
//! ```
//! use intellicenter_lib::state::{EntityStore, StateChange};
//! use intellicenter_lib::types::{CircuitStatus, ObjectId};
//!
//! let store = EntityStore::shared();
//! assert!(store.read().accessory_ids().is_empty());
//!
//! let change = StateChange::circuit_status(ObjectId::new("C0003"), CircuitStatus::Off);
//! assert_eq!(change.change_count(), 1);
//! ```

mod state_change;
mod store;

pub use state_change::StateChange;
pub use store::{EntityStore, SharedStore, is_legacy_id};
