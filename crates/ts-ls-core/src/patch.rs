//! JSON-Patch helpers for the partial-result protocol (component H).
//!
//! A handler's result starts as `null` and is reshaped by a sequence of
//! `add` operations at the JSON-Pointer paths `""` (replace the whole value)
//! and `"/-"` (append to an array), mirroring the `$/partialResult` protocol
//! the dispatcher streams to clients that advertised streaming support.

use json_patch::{AddOperation, Patch, PatchOperation};
use serde_json::Value;

/// Builds the `add "" <value>` operation that replaces the entire result
/// value — used once, as the first patch of a stream, to seed an array or
/// object result.
pub fn replace_root(value: Value) -> PatchOperation {
    PatchOperation::Add(AddOperation {
        path: String::new(),
        value,
    })
}

/// Builds the `add "/-" <value>` operation that appends `value` to the
/// array at the result root.
pub fn append(value: Value) -> PatchOperation {
    PatchOperation::Add(AddOperation {
        path: "/-".to_string(),
        value,
    })
}

/// Applies `ops` in order to `target`. A malformed handler-produced patch is
/// a bug, not a recoverable condition, so this is the one place in the core
/// that does not swallow the error.
pub fn apply_all(target: &mut Value, ops: &[PatchOperation]) -> Result<(), json_patch::PatchError> {
    json_patch::patch(target, &Patch(ops.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replace_root_then_append_builds_an_array() {
        let mut value = Value::Null;
        apply_all(&mut value, &[replace_root(json!([]))]).unwrap();
        apply_all(&mut value, &[append(json!(123))]).unwrap();
        apply_all(&mut value, &[append(json!(456))]).unwrap();
        assert_eq!(value, json!([123, 456]));
    }
}
