// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deep merge of discovery answer trees.

use serde_json::Value;

/// Merges `incoming` into `base`.
///
/// - objects merge key by key, recursively
/// - arrays merge elements carrying the same `objnam` recursively and
///   append any other element not already present
/// - anything else is replaced by `incoming`
///
/// Merging a tree into itself leaves it unchanged.
///
/// # Examples
///
/// ```
/// use intellicenter_lib::discovery::merge_tree;
/// use serde_json::json;
///
/// let mut tree = json!([{"objnam": "INCR", "params": {"OBJLIST": [{"objnam": "C0001"}]}}]);
/// merge_tree(&mut tree, json!([{"objnam": "INCR", "params": {"OBJLIST": [{"objnam": "PMP01"}]}}]));
/// assert_eq!(tree[0]["params"]["OBJLIST"].as_array().unwrap().len(), 2);
/// ```
pub fn merge_tree(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match base.get_mut(&key) {
                    Some(existing) => merge_tree(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(incoming)) => {
            for item in incoming {
                if let Some(name) = objnam(&item)
                    && let Some(existing) = base.iter_mut().find(|e| objnam(e) == Some(name))
                {
                    merge_tree(existing, item);
                } else if !base.contains(&item) {
                    base.push(item);
                }
            }
        }
        (base, incoming) => *base = incoming,
    }
}

fn objnam(value: &Value) -> Option<&str> {
    value.get("objnam").and_then(Value::as_str)
}
