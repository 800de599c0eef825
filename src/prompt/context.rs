//! Context slicing.
//!
//! The LLM never sees the whole snapshot. The slicer projects the snapshot
//! (and the optional fact pack) down to the union of the dependency paths
//! the field guide references, preserving array structure for wildcard
//! paths and reusing the canonical path-setter semantics.

use serde_json::Value;

use super::guide::{DepScope, FieldGuideEntry};
use crate::path::{SlotPath, get_by_path, set_by_path};

/// Projects the snapshot to the NAS-scoped dependency paths.
#[must_use]
pub fn slice_nas(nas_data: &Value, guide: &[FieldGuideEntry]) -> Value {
    project(nas_data, guide, DepScope::Nas)
}

/// Projects the fact pack to its referenced dependency paths.
///
/// Returns `None` when the guide declares no fact-pack dependencies.
#[must_use]
pub fn slice_fact_pack(fact_pack: &Value, guide: &[FieldGuideEntry]) -> Option<Value> {
    let references_fact_pack = guide
        .iter()
        .flat_map(|e| &e.dependencies)
        .any(|d| d.scope == DepScope::FactPack);
    references_fact_pack.then(|| project(fact_pack, guide, DepScope::FactPack))
}

fn project(source: &Value, guide: &[FieldGuideEntry], scope: DepScope) -> Value {
    let mut projection = Value::Object(serde_json::Map::new());
    for entry in guide {
        for dependency in &entry.dependencies {
            if dependency.scope != scope {
                continue;
            }
            let Ok(path) = SlotPath::parse(&dependency.path) else {
                continue;
            };
            if let Some(value) = get_by_path(source, &path) {
                // Wildcard reads return the whole array; write it back at
                // the array's own position so the projection keeps shape.
                let write_path = if path.has_wildcard() {
                    strip_terminal_wildcard(&path)
                } else {
                    path
                };
                let _ = set_by_path(&mut projection, &write_path, value.clone());
            }
        }
    }
    projection
}

/// Rewrites `a.b[]` to `a.b` so the projected array lands at its own key.
fn strip_terminal_wildcard(path: &SlotPath) -> SlotPath {
    let mut segments = path.segments().to_vec();
    if let Some(last) = segments.last_mut() {
        if last.accessor == crate::path::Accessor::Wildcard {
            last.accessor = crate::path::Accessor::Key;
        }
    }
    SlotPath::from_segments(segments)
}
