// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire protocol of the controller.
//!
//! The controller speaks newline-delimited JSON over a Telnet port
//! (default 6681). Every request carries a UUID v4 `messageID`.
//!
//! - [`IntelliCenterRequest`] / [`IntelliCenterResponse`] - typed messages
//! - [`LineFramer`] - reassembles JSON lines from raw chunks
//! - [`RequestEncoder`] - serializes requests and polices message ids
//! - [`TelnetFilter`] - strips Telnet option negotiation
//! - [`Connection`] - TCP socket with a background reader task

mod codec;
mod connection;
mod message;
mod sanitize;
mod telnet;

pub use codec::{FrameError, Frames, LineFramer, RequestEncoder};
pub use connection::{Connection, ConnectionEvent, TaggedEvent, check_reachability};
pub use message::{
    DiscoveryCategory, HARDWARE_QUERY, IntelliCenterRequest, IntelliCenterResponse,
    ObjectParams, RequestCommand, RequestObject, ResponseCommand, is_valid_message_id, keys,
    new_message_id,
};
pub use sanitize::{sanitize_argument, sanitize_object_name};
pub use telnet::{TelnetFilter, TelnetOutput};
