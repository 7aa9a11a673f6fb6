// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Telnet option negotiation filter.
//!
//! The controller's port speaks Telnet and may interleave IAC sequences
//! with JSON. [`TelnetFilter`] removes them, refusing every option, and
//! keeps its state between chunks so a sequence split across reads is
//! still recognised.

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Data,
    Iac,
    Negotiate(u8),
    Subnegotiation,
    SubnegotiationIac,
}

/// Output of [`TelnetFilter::filter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelnetOutput {
    /// Payload bytes with negotiation removed.
    pub data: Vec<u8>,
    /// Bytes to write back to the peer.
    pub replies: Vec<u8>,
}

/// Stateful IAC stripper.
#[derive(Debug, Clone, Default)]
pub struct TelnetFilter {
    state: State,
}

impl TelnetFilter {
    /// Creates a filter in the data state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters one chunk.
    pub fn filter(&mut self, chunk: &[u8]) -> TelnetOutput {
        let mut out = TelnetOutput {
            data: Vec::with_capacity(chunk.len()),
            replies: Vec::new(),
        };

        for &byte in chunk {
            self.state = match self.state {
                State::Data if byte == IAC => State::Iac,
                State::Data => {
                    out.data.push(byte);
                    State::Data
                }
                State::Iac => match byte {
                    IAC => {
                        out.data.push(IAC);
                        State::Data
                    }
                    DO | DONT | WILL | WONT => State::Negotiate(byte),
                    SB => State::Subnegotiation,
                    // NOP, GA and the other two-byte commands
                    _ => State::Data,
                },
                State::Negotiate(verb) => {
                    match verb {
                        DO => out.replies.extend_from_slice(&[IAC, WONT, byte]),
                        WILL => out.replies.extend_from_slice(&[IAC, DONT, byte]),
                        _ => {}
                    }
                    tracing::trace!(verb, option = byte, "Refused telnet option");
                    State::Data
                }
                State::Subnegotiation if byte == IAC => State::SubnegotiationIac,
                State::Subnegotiation => State::Subnegotiation,
                State::SubnegotiationIac if byte == SE => State::Data,
                State::SubnegotiationIac => State::Subnegotiation,
            };
        }

        out
    }

    /// Returns to the data state, e.g. after a reconnect.
    pub fn reset(&mut self) {
        self.state = State::Data;
    }
}
