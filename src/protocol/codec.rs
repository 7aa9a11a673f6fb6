// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Newline-delimited JSON framing and request serialization.
//!
//! # Inbound
//!
//! [`LineFramer`] accumulates raw chunks. A chunk that does not end in a
//! newline is buffered (bounded by `max_buffer_size`); a chunk that does
//! flushes the buffer and every complete line is decoded. Lines that are
//! not brace-delimited or fail to decode are logged and dropped.
//!
//! # Outbound
//!
//! [`RequestEncoder`] guarantees each request carries a fresh UUID v4
//! `messageID`, sanitizes object names and arguments, and appends the
//! newline delimiter.

use std::collections::{HashSet, VecDeque};

use crate::error::{ParseError, ProtocolError};
use crate::types::ObjectId;

use super::message::{IntelliCenterRequest, IntelliCenterResponse, is_valid_message_id, new_message_id};
use super::sanitize::{sanitize_argument, sanitize_object_name};

/// Characters of a rejected line quoted in logs.
const EXCERPT_LEN: usize = 200;

/// Number of recently sent message ids remembered for reuse detection.
const RECENT_ID_CAPACITY: usize = 1024;

pub(crate) fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(EXCERPT_LEN) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Result of feeding one chunk to the framer.
#[derive(Debug, Default)]
pub struct Frames {
    /// Decoded responses, in arrival order.
    pub responses: Vec<IntelliCenterResponse>,
    /// Lines or buffers that were dropped.
    pub errors: Vec<FrameError>,
}

/// Why data was dropped by the framer.
#[derive(Debug)]
pub enum FrameError {
    /// The partial-line buffer exceeded its bound.
    Overflow(ProtocolError),
    /// A line was not a decodable response.
    Malformed(ParseError),
}

/// Reassembles newline-delimited JSON from arbitrary chunks.
///
/// # Examples
///
/// ```
/// use intellicenter_lib::protocol::LineFramer;
///
/// let mut framer = LineFramer::new(1024 * 1024);
/// assert!(framer.push(b"{\"command\":\"Notify").responses.is_empty());
/// let frames = framer.push(b"List\"}\n");
/// assert_eq!(frames.responses.len(), 1);
/// ```
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_buffer_size: usize,
}

impl LineFramer {
    /// Creates a framer that drops partial data beyond `max_buffer_size` bytes.
    #[must_use]
    pub fn new(max_buffer_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_buffer_size,
        }
    }

    /// Bytes currently waiting for a newline.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any buffered partial data.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Feeds one chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Frames {
        let mut frames = Frames::default();
        if chunk.is_empty() {
            return frames;
        }

        if chunk.last() != Some(&b'\n') {
            let total = self.buffer.len() + chunk.len();
            if total > self.max_buffer_size {
                let err = ProtocolError::BufferOverflow {
                    limit: self.max_buffer_size,
                    dropped: total,
                };
                tracing::error!(
                    limit = self.max_buffer_size,
                    dropped = total,
                    "Receive buffer overflow, discarding partial data"
                );
                self.buffer.clear();
                frames.errors.push(FrameError::Overflow(err));
            } else {
                self.buffer.extend_from_slice(chunk);
            }
            return frames;
        }

        self.buffer.extend_from_slice(chunk);
        let data = std::mem::take(&mut self.buffer);
        for raw in data.split(|b| *b == b'\n') {
            let text = String::from_utf8_lossy(raw);
            let line = text.trim();
            if line.is_empty() {
                continue;
            }
            match decode_line(line) {
                Ok(response) => frames.responses.push(response),
                Err(e) => {
                    tracing::warn!(error = %e, excerpt = %excerpt(line), "Dropping undecodable line");
                    frames.errors.push(FrameError::Malformed(e));
                }
            }
        }
        frames
    }
}

fn decode_line(line: &str) -> Result<IntelliCenterResponse, ParseError> {
    if !(line.starts_with('{') && line.ends_with('}')) {
        return Err(ParseError::MalformedFrame(
            "line is not a brace-delimited object".to_string(),
        ));
    }
    IntelliCenterResponse::parse(line)
}

/// Serializes requests and polices their message ids.
#[derive(Debug, Default)]
pub struct RequestEncoder {
    recent: VecDeque<String>,
    recent_set: HashSet<String>,
}

impl RequestEncoder {
    /// Creates an encoder with no remembered ids.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the message id if it is malformed or was used before, and
    /// records it. Returns `true` if the id was regenerated.
    pub fn ensure_message_id(&mut self, request: &mut IntelliCenterRequest) -> bool {
        let regenerate = !is_valid_message_id(&request.message_id)
            || self.recent_set.contains(&request.message_id);
        if regenerate {
            let previous = std::mem::take(&mut request.message_id);
            let mut fresh = new_message_id();
            while self.recent_set.contains(&fresh) {
                fresh = new_message_id();
            }
            tracing::debug!(previous = %previous, message_id = %fresh, "Regenerated message id");
            request.message_id = fresh;
        }
        self.remember(request.message_id.clone());
        regenerate
    }

    fn remember(&mut self, id: String) {
        if self.recent.len() >= RECENT_ID_CAPACITY
            && let Some(oldest) = self.recent.pop_front()
        {
            self.recent_set.remove(&oldest);
        }
        self.recent_set.insert(id.clone());
        self.recent.push_back(id);
    }

    /// Produces the newline-terminated wire form of `request`.
    ///
    /// The id is fixed up in place so callers can correlate answers.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Json`] if serialization fails.
    pub fn encode(&mut self, request: &mut IntelliCenterRequest) -> Result<String, ParseError> {
        self.ensure_message_id(request);
        for object in &mut request.object_list {
            let clean = sanitize_object_name(object.objnam.as_str());
            if clean != object.objnam.as_str() {
                tracing::warn!(original = %object.objnam, sanitized = %clean, "Sanitized object name");
                object.objnam = ObjectId::new(clean);
            }
        }
        if let Some(arguments) = request.arguments.as_mut() {
            *arguments = sanitize_argument(arguments);
        }
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DiscoveryCategory, ResponseCommand};

    const PAYLOAD: &str = concat!(
        "{\"command\":\"NotifyList\",\"objectList\":[{\"objnam\":\"C0006\",\"params\":{\"STATUS\":\"ON\"}}]}\n",
        "{\"command\":\"SendQuery\",\"queryName\":\"GetHardwareDefinition\",\"answer\":[]}\n",
        "{\"command\":\"WriteParamList\",\"response\":\"200\"}\n",
    );

    fn commands(responses: &[IntelliCenterResponse]) -> Vec<ResponseCommand> {
        responses.iter().map(|r| r.command).collect()
    }

    #[test]
    fn reconstructs_regardless_of_split_points() {
        let bytes = PAYLOAD.as_bytes();
        let mut whole = LineFramer::new(1 << 20);
        let expected = whole.push(bytes).responses;
        assert_eq!(expected.len(), 3);

        for split in 1..bytes.len() {
            let mut framer = LineFramer::new(1 << 20);
            let mut got = framer.push(&bytes[..split]).responses;
            got.extend(framer.push(&bytes[split..]).responses);
            assert_eq!(got, expected, "split at {split}");
        }

        // one byte at a time
        let mut framer = LineFramer::new(1 << 20);
        let mut got = Vec::new();
        for b in bytes {
            got.extend(framer.push(std::slice::from_ref(b)).responses);
        }
        assert_eq!(commands(&got), commands(&expected));
    }

    #[test]
    fn overflow_drops_buffer() {
        let mut framer = LineFramer::new(1024);
        let mut big = b"{\"command\":\"NotifyList\",\"x\":\"".to_vec();
        big.extend(std::iter::repeat_n(b'a', 2000));
        let frames = framer.push(&big);
        assert!(matches!(
            frames.errors.as_slice(),
            [FrameError::Overflow(ProtocolError::BufferOverflow { limit: 1024, .. })]
        ));
        assert_eq!(framer.buffered_len(), 0);

        let frames = framer.push(b"\"}\n");
        assert!(frames.responses.is_empty());
        assert_eq!(frames.errors.len(), 1);
    }

    #[test]
    fn accumulation_past_bound_drops_buffer() {
        let mut framer = LineFramer::new(1024);
        for _ in 0..3 {
            framer.push(&[b'{'; 400]);
        }
        assert!(framer.buffered_len() < 1024);
        assert!(framer.push(b"}\n").responses.is_empty());
    }

    #[test]
    fn rejects_non_object_lines() {
        let mut framer = LineFramer::new(1 << 20);
        let frames = framer.push(b"login: \n[1,2]\n{\"command\":\"NotifyList\"}\n");
        assert_eq!(frames.responses.len(), 1);
        assert_eq!(frames.errors.len(), 2);
    }

    #[test]
    fn invalid_json_does_not_stop_following_lines() {
        let mut framer = LineFramer::new(1 << 20);
        let frames = framer.push(b"{\"command\":}\r\n  {\"command\":\"NotifyList\"}  \r\n");
        assert_eq!(frames.responses.len(), 1);
        assert!(matches!(frames.errors[0], FrameError::Malformed(ParseError::Json(_))));
    }

    #[test]
    fn encodes_with_newline_and_valid_id() {
        let mut encoder = RequestEncoder::new();
        let mut request = IntelliCenterRequest::discovery(DiscoveryCategory::Heaters);
        let line = encoder.encode(&mut request).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(is_valid_message_id(&request.message_id));
        assert!(line.contains(&request.message_id));
    }

    #[test]
    fn regenerates_invalid_and_reused_ids() {
        let mut encoder = RequestEncoder::new();

        let mut bad = IntelliCenterRequest::set_status("C0001", true);
        bad.message_id = "123".to_string();
        assert!(encoder.ensure_message_id(&mut bad));
        assert!(is_valid_message_id(&bad.message_id));

        let mut first = IntelliCenterRequest::set_status("C0001", true);
        let mut reused = first.clone();
        assert!(!encoder.ensure_message_id(&mut first));
        assert!(encoder.ensure_message_id(&mut reused));
        assert_ne!(first.message_id, reused.message_id);

        let mut ids = HashSet::new();
        for _ in 0..50 {
            let mut r = IntelliCenterRequest::set_status("C0001", false);
            r.message_id = String::new();
            encoder.ensure_message_id(&mut r);
            assert!(ids.insert(r.message_id));
        }
    }

    #[test]
    fn sanitizes_names_and_arguments() {
        let mut encoder = RequestEncoder::new();
        let mut request = IntelliCenterRequest::set_status("C00\"06", true);
        request.arguments = Some("<x>;".to_string());
        let line = encoder.encode(&mut request).unwrap();
        assert!(line.contains("\"objnam\":\"C0006\""));
        assert!(line.contains("\"arguments\":\"x\""));
    }

    #[test]
    fn excerpt_is_bounded() {
        let long = "x".repeat(500);
        assert_eq!(excerpt(&long).len(), EXCERPT_LEN);
        assert_eq!(excerpt("short"), "short");
    }
}
