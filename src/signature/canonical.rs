//! Canonical payload encoding
//!
//! Signers and verifiers must hash identical bytes, so JSON objects are
//! re-emitted with lexicographically sorted keys at every depth.

use serde_json::{Map, Value};

use crate::error::Result;

/// Returns a copy of `value` with every object's keys in sorted order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serializes `value` to its canonical JSON bytes.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&canonicalize(value))?)
}

/// Bytes a detached signature covers.
///
/// String payloads are signed as-is; anything else is signed over its
/// canonical JSON form.
pub fn payload_bytes(payload: &Value) -> Result<Vec<u8>> {
    match payload {
        Value::String(text) => Ok(text.as_bytes().to_vec()),
        other => canonical_bytes(other),
    }
}
