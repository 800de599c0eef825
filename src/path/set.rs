//! Path-addressed reads and writes over JSON values.
//!
//! `set_by_path` is the single canonical setter used by the NAS builder and
//! the context slicer. It understands indexed and wildcard segments, grows
//! arrays sparsely (holes become `null` until overwritten), and delegates
//! its terminal merge to the payload-merge policy in [`crate::merge`].

use serde_json::Value;
use thiserror::Error;

use super::{Accessor, Segment, SlotPath};
use crate::merge::{json_type_name, merge_values};

/// A write could not navigate the existing structure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetError {
    /// An intermediate value had the wrong shape for the next segment.
    #[error("cannot write through {path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Canonical path of the segment that failed.
        path: String,
        /// Shape the segment required.
        expected: &'static str,
        /// Shape actually present.
        found: &'static str,
    },
}

/// Reads the value at `path`, if present.
///
/// Indexed segments step into arrays; a wildcard segment returns the whole
/// enclosing array (projection keeps array structure for wildcard paths).
#[must_use]
pub fn get_by_path<'a>(value: &'a Value, path: &SlotPath) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.segments() {
        let field = current.as_object()?.get(&segment.key)?;
        current = match segment.accessor {
            Accessor::Key => field,
            Accessor::Index(i) => field.as_array()?.get(i)?,
            Accessor::Wildcard => {
                // Whole-array projection; nothing past the wildcard narrows it.
                return field.is_array().then_some(field);
            }
        };
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate objects and arrays.
///
/// Wildcard segments append a fresh element, growing the enclosing array.
/// Indexed segments fill holes with `null`. The terminal write deep-merges
/// with the incoming value taking precedence (object over object, array over
/// array element-wise, primitive overwrites).
///
/// Returns the concrete path written, with wildcards replaced by the indices
/// they received.
///
/// # Errors
///
/// Returns [`SetError::TypeMismatch`] when an existing value blocks
/// navigation (e.g. writing through a string as if it were an object).
pub fn set_by_path(target: &mut Value, path: &SlotPath, value: Value) -> Result<SlotPath, SetError> {
    let mut concrete: Vec<Segment> = Vec::with_capacity(path.len());
    set_recursive(target, path.segments(), value, &mut concrete)?;
    Ok(SlotPath::from_segments(concrete))
}

fn set_recursive(
    current: &mut Value,
    segments: &[Segment],
    value: Value,
    concrete: &mut Vec<Segment>,
) -> Result<(), SetError> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(());
    };

    if current.is_null() {
        *current = Value::Object(serde_json::Map::new());
    }
    let Some(map) = current.as_object_mut() else {
        return Err(SetError::TypeMismatch {
            path: rendered(concrete, segment),
            expected: "object",
            found: json_type_name(current),
        });
    };

    let slot = map.entry(segment.key.clone()).or_insert(Value::Null);

    match segment.accessor {
        Accessor::Key => {
            concrete.push(segment.clone());
            if rest.is_empty() {
                terminal_merge(slot, value, concrete);
                Ok(())
            } else {
                set_recursive(slot, rest, value, concrete)
            }
        }
        Accessor::Index(index) => {
            let elem = array_slot(slot, segment, index, concrete)?;
            concrete.push(segment.clone());
            if rest.is_empty() {
                terminal_merge(elem, value, concrete);
                Ok(())
            } else {
                set_recursive(elem, rest, value, concrete)
            }
        }
        Accessor::Wildcard => {
            // A wildcard write grows the enclosing array by one element.
            let next = match slot {
                Value::Null => 0,
                Value::Array(arr) => arr.len(),
                other => {
                    return Err(SetError::TypeMismatch {
                        path: rendered(concrete, segment),
                        expected: "array",
                        found: json_type_name(other),
                    });
                }
            };
            let elem = array_slot(slot, segment, next, concrete)?;
            concrete.push(Segment::index(segment.key.clone(), next));
            if rest.is_empty() {
                terminal_merge(elem, value, concrete);
                Ok(())
            } else {
                set_recursive(elem, rest, value, concrete)
            }
        }
    }
}

/// Ensures `slot` is an array and returns element `index`, growing sparsely.
fn array_slot<'a>(
    slot: &'a mut Value,
    segment: &Segment,
    index: usize,
    concrete: &[Segment],
) -> Result<&'a mut Value, SetError> {
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    if !slot.is_array() {
        return Err(SetError::TypeMismatch {
            path: rendered(concrete, segment),
            expected: "array",
            found: json_type_name(slot),
        });
    }
    let Some(arr) = slot.as_array_mut() else {
        unreachable!()
    };
    while arr.len() <= index {
        arr.push(Value::Null);
    }
    Ok(&mut arr[index])
}

/// Terminal writes reuse the payload-merge policy; conflicts raised by an
/// overwrite are the policy working as intended here, so they are dropped.
fn terminal_merge(slot: &mut Value, value: Value, concrete: &[Segment]) {
    let mut sink = Vec::new();
    let prefix = SlotPath::from_segments(concrete.to_vec()).canonical();
    merge_values(slot, value, &prefix, &mut sink);
}

fn rendered(concrete: &[Segment], failing: &Segment) -> String {
    let mut segments = concrete.to_vec();
    segments.push(failing.clone());
    SlotPath::from_segments(segments).canonical()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn parse(p: &str) -> SlotPath {
        SlotPath::parse(p).unwrap()
    }

    #[test]
    fn test_set_plain_path() {
        let mut v = json!({});
        let written = set_by_path(&mut v, &parse("header.patientName"), json!("Jane")).unwrap();
        assert_eq!(v, json!({"header": {"patientName": "Jane"}}));
        assert_eq!(written.canonical(), "header.patientName");
    }

    #[test]
    fn test_set_indexed_grows_sparsely() {
        let mut v = json!({});
        set_by_path(&mut v, &parse("rows[2].text"), json!("third")).unwrap();
        assert_eq!(
            v,
            json!({"rows": [null, null, {"text": "third"}]})
        );
    }

    #[test]
    fn test_set_wildcard_appends() {
        let mut v = json!({});
        let first = set_by_path(&mut v, &parse("tasks[].name"), json!("a")).unwrap();
        let second = set_by_path(&mut v, &parse("tasks[].name"), json!("b")).unwrap();
        assert_eq!(v, json!({"tasks": [{"name": "a"}, {"name": "b"}]}));
        assert_eq!(first.canonical(), "tasks[0].name");
        assert_eq!(second.canonical(), "tasks[1].name");
    }

    #[test]
    fn test_terminal_deep_merge() {
        let mut v = json!({"quote": {"text": "old", "kept": true}});
        set_by_path(&mut v, &parse("quote"), json!({"text": "new"})).unwrap();
        assert_eq!(v, json!({"quote": {"text": "new", "kept": true}}));
    }

    #[test]
    fn test_primitive_overwrites_at_terminal() {
        let mut v = json!({"score": 3});
        set_by_path(&mut v, &parse("score"), json!(9)).unwrap();
        assert_eq!(v["score"], 9);
    }

    #[test]
    fn test_type_mismatch_on_navigation() {
        let mut v = json!({"header": "not an object"});
        let err = set_by_path(&mut v, &parse("header.name"), json!("x")).unwrap_err();
        assert!(matches!(err, SetError::TypeMismatch { expected: "object", .. }));

        let mut v = json!({"rows": {"a": 1}});
        let err = set_by_path(&mut v, &parse("rows[0]"), json!("x")).unwrap_err();
        assert!(matches!(err, SetError::TypeMismatch { expected: "array", .. }));
    }

    #[test]
    fn test_get_by_path() {
        let v = json!({"a": {"b": [{"c": 1}, {"c": 2}]}});
        assert_eq!(get_by_path(&v, &parse("a.b[1].c")), Some(&json!(2)));
        assert_eq!(get_by_path(&v, &parse("a.b[]")), Some(&json!([{"c": 1}, {"c": 2}])));
        assert_eq!(get_by_path(&v, &parse("a.missing")), None);
        assert_eq!(get_by_path(&v, &parse("a.b[9]")), None);
    }

    #[test]
    fn test_null_intermediate_becomes_object() {
        let mut v = json!({"a": null});
        set_by_path(&mut v, &parse("a.b"), json!(1)).unwrap();
        assert_eq!(v, json!({"a": {"b": 1}}));
    }

    proptest! {
        /// setByPath(setByPath(x, p, v), p, v) == setByPath(x, p, v)
        /// for concrete (non-wildcard) paths.
        #[test]
        fn prop_set_idempotent(
            keys in proptest::collection::vec("[a-z]{1,6}", 1..4),
            index in proptest::option::of(0usize..4),
            text in "[a-zA-Z0-9 ]{0,16}",
        ) {
            let mut segments: Vec<Segment> = keys.iter().map(|k| Segment::key(k.as_str())).collect();
            if let (Some(i), Some(last)) = (index, segments.last_mut()) {
                last.accessor = Accessor::Index(i);
            }
            let path = SlotPath::from_segments(segments);

            let mut once = json!({});
            set_by_path(&mut once, &path, json!(text)).unwrap();
            let mut twice = once.clone();
            set_by_path(&mut twice, &path, json!(text)).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
