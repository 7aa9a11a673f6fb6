// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hardware discovery.
//!
//! The controller describes its hardware in answer to one
//! `GetHardwareDefinition` query per [`DiscoveryCategory`](crate::protocol::DiscoveryCategory).
//! [`DiscoveryOrchestrator`] sends those queries one after another and
//! [`merge_tree`] folds the partial answers into one tree, which the
//! [`topology`](crate::topology) builder then turns into entities.

mod merge;
mod orchestrator;

pub use merge::merge_tree;
pub use orchestrator::{DiscoveryAction, DiscoveryOrchestrator, DiscoveryOutcome, DiscoveryTimings};
