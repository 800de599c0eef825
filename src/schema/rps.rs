//! Render payload schema: the structural union of AIS and NAS.
//!
//! Interior object nodes may be shared between the two schemas; leaves may
//! not. A leaf-level overlap means the template assigns one path both to
//! the LLM and to a deterministic resolver, which is disallowed.

use super::{NodeKind, SchemaNode};
use crate::error::SchemaError;

/// Structurally unions the AI and non-AI schemas into the render payload
/// schema (RPS).
///
/// # Errors
///
/// Returns [`SchemaError::LeafOverlap`] when the schemas meet at a leaf,
/// and [`SchemaError::IncompatibleMerge`] when an object meets an array.
pub fn merge_render_schema(ais: &SchemaNode, nas: &SchemaNode) -> Result<SchemaNode, SchemaError> {
    union(ais, nas, "")
}

fn union(a: &SchemaNode, b: &SchemaNode, path: &str) -> Result<SchemaNode, SchemaError> {
    match (&a.kind, &b.kind) {
        (
            NodeKind::Object {
                properties: a_props,
                required: a_required,
            },
            NodeKind::Object {
                properties: b_props,
                required: b_required,
            },
        ) => {
            let mut properties = a_props.clone();
            for (key, b_node) in b_props {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                match properties.get(key) {
                    Some(a_node) => {
                        let merged = union(a_node, b_node, &child_path)?;
                        properties.insert(key.clone(), merged);
                    }
                    None => {
                        properties.insert(key.clone(), b_node.clone());
                    }
                }
            }
            let mut required = a_required.clone();
            required.extend(b_required.iter().cloned());
            Ok(SchemaNode {
                kind: NodeKind::Object {
                    properties,
                    required,
                },
                provenance: a.provenance.clone().or_else(|| b.provenance.clone()),
            })
        }
        (NodeKind::Array { items: a_items }, NodeKind::Array { items: b_items }) => {
            let items = match (a_items, b_items) {
                (Some(a_items), Some(b_items)) => {
                    Some(Box::new(union(a_items, b_items, &format!("{path}[]"))?))
                }
                (Some(items), None) | (None, Some(items)) => Some(items.clone()),
                (None, None) => None,
            };
            Ok(SchemaNode {
                kind: NodeKind::Array { items },
                provenance: a.provenance.clone().or_else(|| b.provenance.clone()),
            })
        }
        (NodeKind::Leaf { .. }, _) | (_, NodeKind::Leaf { .. }) => Err(SchemaError::LeafOverlap {
            path: path.to_string(),
        }),
        _ => Err(SchemaError::IncompatibleMerge {
            path: path.to_string(),
            left: a.kind_name().to_string(),
            right: b.kind_name().to_string(),
        }),
    }
}
