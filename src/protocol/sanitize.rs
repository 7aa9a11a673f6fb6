// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Light hygiene for outbound identifiers and free text.
//!
//! This is not a trust boundary: the controller accepts any JSON, these
//! helpers only keep obviously unintended characters off the wire.

/// Keeps only `[A-Za-z0-9_-]`.
///
/// # Examples
///
/// ```
/// use intellicenter_lib::protocol::sanitize_object_name;
///
/// assert_eq!(sanitize_object_name("C0006\"}"), "C0006");
/// ```
#[must_use]
pub fn sanitize_object_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Removes `<>"'&;` from free-text arguments.
#[must_use]
pub fn sanitize_argument(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\'' | '&' | ';'))
        .collect()
}
