//! Execution-state helpers
//!
//! Graph state is a JSON object that flows through every node. Agents read
//! their declared input fields from it and write a single output field back;
//! the runtime merges each agent's result into the running state with
//! object-merge semantics (right side wins per key). The reserved
//! [`LAST_ACTION_SUCCESS`] flag drives `success`/`failure` edge routing.

use serde_json::{Map, Value};

/// Reserved state key read by conditional edge routers
pub const LAST_ACTION_SUCCESS: &str = "last_action_success";

/// Merge `update` into `state` with object-merge semantics
///
/// When both values are objects, keys from `update` overwrite keys in
/// `state`. Otherwise `update` replaces `state` wholesale.
pub fn merge_state(state: Value, update: Value) -> Value {
    match (state, update) {
        (Value::Object(mut left), Value::Object(right)) => {
            for (key, value) in right {
                left.insert(key, value);
            }
            Value::Object(left)
        }
        (_, update) => update,
    }
}

/// Read the `last_action_success` routing flag
pub fn last_action_success(state: &Value) -> Option<bool> {
    state.get(LAST_ACTION_SUCCESS).and_then(Value::as_bool)
}

/// Coerce a state value into an object map, treating `Null` as empty
pub fn as_object(state: &Value) -> Map<String, Value> {
    match state {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    }
}

/// Extract the named fields from a state object, skipping absent ones
pub fn extract_inputs(state: &Value, fields: &[String]) -> Map<String, Value> {
    let mut inputs = Map::new();
    if let Some(obj) = state.as_object() {
        for field in fields {
            if let Some(value) = obj.get(field) {
                inputs.insert(field.clone(), value.clone());
            }
        }
    }
    inputs
}
