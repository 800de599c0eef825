//! Deep merge of the AI payload over the deterministic snapshot.
//!
//! One merge policy lives here and is reused everywhere values meet: the
//! payload merger recurses with AI precedence, and the path setter delegates
//! its terminal merge to the same rules so the NAS builder and the merger
//! can never disagree.
//!
//! Policy:
//! - object over object recurses per key; keys only on one side survive,
//! - array over array merges element-wise when both sides hold only objects
//!   (`null` elements on the AI side preserve the snapshot value at that
//!   index); any other array pairing is a leaf where AI wins,
//! - a leaf type mismatch lets AI win and records an `error` conflict.

use serde_json::Value;

use crate::diag::{Severity, Warning, WarningCode};

/// Returns the JSON type name of a value, as used in conflict records.
#[must_use]
pub const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A recorded disagreement between the AI payload and the snapshot.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConflict {
    /// Dotted path of the disagreement.
    pub path: String,
    /// JSON type the snapshot held.
    pub expected_type: String,
    /// JSON type the AI payload supplied.
    pub actual_type: String,
    /// Human-readable description.
    pub message: String,
    /// `error` for type mismatches, `warning` for array overwrites.
    pub severity: Severity,
}

impl MergeConflict {
    /// Converts the conflict into a pipeline warning.
    #[must_use]
    pub fn into_warning(self) -> Warning {
        let details = serde_json::json!({
            "expectedType": self.expected_type,
            "actualType": self.actual_type,
        });
        Warning::new(self.severity, WarningCode::MergeConflict, self.message)
            .with_path(self.path)
            .with_details(details)
    }
}

/// Result of merging the AI payload over the snapshot.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The render payload.
    pub merged: Value,
    /// Every conflict the merge encountered, in walk order.
    pub conflicts: Vec<MergeConflict>,
}

/// Deep-merges the AI payload over the non-AI snapshot.
///
/// The snapshot is cloned as the base; AI values take precedence per the
/// module policy. Conflicts are recorded, never thrown.
#[must_use]
pub fn merge_payloads(ai: &Value, nas: &Value) -> MergeOutcome {
    let mut merged = nas.clone();
    let mut conflicts = Vec::new();
    merge_values(&mut merged, ai.clone(), "", &mut conflicts);
    MergeOutcome { merged, conflicts }
}

/// Merges `incoming` into `base` in place, recording conflicts.
///
/// `path` is the dotted prefix used in conflict records; pass `""` at the
/// root. This is the single canonical merge used by both the payload merger
/// and the terminal step of the path setter.
pub fn merge_values(
    base: &mut Value,
    incoming: Value,
    path: &str,
    conflicts: &mut Vec<MergeConflict>,
) {
    match (&mut *base, incoming) {
        (Value::Object(base_map), Value::Object(incoming_map)) => {
            for (key, incoming_value) in incoming_map {
                let child_path = join_path(path, &key);
                match base_map.get_mut(&key) {
                    Some(existing) => {
                        merge_values(existing, incoming_value, &child_path, conflicts);
                    }
                    None => {
                        base_map.insert(key, incoming_value);
                    }
                }
            }
        }
        (Value::Array(base_arr), Value::Array(incoming_arr)) => {
            if mergeable_elementwise(base_arr, &incoming_arr) {
                for (i, incoming_elem) in incoming_arr.into_iter().enumerate() {
                    // A null AI element preserves the snapshot value.
                    if incoming_elem.is_null() {
                        continue;
                    }
                    let child_path = format!("{path}[{i}]");
                    if i < base_arr.len() {
                        merge_values(&mut base_arr[i], incoming_elem, &child_path, conflicts);
                    } else {
                        base_arr.push(incoming_elem);
                    }
                }
            } else {
                conflicts.push(MergeConflict {
                    path: path.to_string(),
                    expected_type: "array".to_string(),
                    actual_type: "array".to_string(),
                    message: format!("array at {path} overwritten by AI output"),
                    severity: Severity::Warning,
                });
                *base = Value::Array(incoming_arr);
            }
        }
        (base_slot, incoming_value) => {
            let base_kind = json_type_name(base_slot);
            let incoming_kind = json_type_name(&incoming_value);
            if base_kind != incoming_kind && !base_slot.is_null() {
                conflicts.push(MergeConflict {
                    path: path.to_string(),
                    expected_type: base_kind.to_string(),
                    actual_type: incoming_kind.to_string(),
                    message: format!(
                        "type mismatch at {path}: expected {base_kind}, AI returned {incoming_kind}"
                    ),
                    severity: Severity::Error,
                });
            }
            *base_slot = incoming_value;
        }
    }
}

/// Element-wise merge applies only when both arrays hold plain objects.
/// Null elements on the incoming side count as holes, not disqualifiers.
fn mergeable_elementwise(base: &[Value], incoming: &[Value]) -> bool {
    base.iter().all(Value::is_object) && incoming.iter().all(|v| v.is_object() || v.is_null())
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}
