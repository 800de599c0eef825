//! Schema node library.
//!
//! Derived schemas are trees of [`SchemaNode`]: objects with properties and
//! required lists, arrays with an `items` node, and leaves carrying a JSON
//! type plus constraint keywords. Every node remembers the content item
//! that produced it, so collisions can name both contributors.
//!
//! [`SchemaBuilder`] tracks canonical-path claims on top of the structural
//! rules: two items may share a canonical path only when their subtrees are
//! structurally compatible, and an exact leaf claim by two different items
//! is always a duplicate-path error.

mod derive;
mod rps;
mod validate;

pub use derive::{derive_ai_schema, derive_nas_schema};
pub use rps::merge_render_schema;
pub use validate::{CachedValidator, SchemaValidator, check_soft_constraints};

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use crate::error::SchemaError;
use crate::path::{Accessor, SlotPath};
use crate::template::Constraints;

/// JSON type of a leaf node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafType {
    /// `"string"`.
    String,
    /// `"number"`.
    Number,
    /// `"boolean"`.
    Boolean,
}

impl LeafType {
    /// The JSON Schema `type` keyword value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

/// Structure of a schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// `type: "object"` with named properties.
    Object {
        /// Property nodes by key.
        properties: BTreeMap<String, SchemaNode>,
        /// Keys listed in `required`.
        required: BTreeSet<String>,
    },
    /// `type: "array"` with a single items schema.
    Array {
        /// Element schema, once one contributor has shaped it.
        items: Option<Box<SchemaNode>>,
    },
    /// A typed leaf with constraint keywords.
    Leaf {
        /// JSON type.
        ty: LeafType,
        /// Constraint keywords mirrored from the content item.
        constraints: Constraints,
    },
}

/// A JSON-Schema-shaped node with path provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    /// Node structure.
    pub kind: NodeKind,
    /// Content item that produced the node, when one did directly.
    pub provenance: Option<String>,
}

impl SchemaNode {
    /// Creates an empty object node.
    #[must_use]
    pub fn object() -> Self {
        Self {
            kind: NodeKind::Object {
                properties: BTreeMap::new(),
                required: BTreeSet::new(),
            },
            provenance: None,
        }
    }

    /// Creates an array node with an optional items schema.
    #[must_use]
    pub fn array(items: Option<Self>) -> Self {
        Self {
            kind: NodeKind::Array {
                items: items.map(Box::new),
            },
            provenance: None,
        }
    }

    /// Creates a string leaf without constraints.
    #[must_use]
    pub fn string() -> Self {
        Self::leaf(LeafType::String, Constraints::default())
    }

    /// Creates a number leaf without constraints.
    #[must_use]
    pub fn number() -> Self {
        Self::leaf(LeafType::Number, Constraints::default())
    }

    /// Creates a boolean leaf without constraints.
    #[must_use]
    pub fn boolean() -> Self {
        Self::leaf(LeafType::Boolean, Constraints::default())
    }

    /// Creates a typed leaf with constraint keywords.
    #[must_use]
    pub fn leaf(ty: LeafType, constraints: Constraints) -> Self {
        Self {
            kind: NodeKind::Leaf { ty, constraints },
            provenance: None,
        }
    }

    /// Tags the node with the content item that produced it.
    #[must_use]
    pub fn with_provenance(mut self, item_id: impl Into<String>) -> Self {
        self.provenance = Some(item_id.into());
        self
    }

    /// Short structural name, used in error reporting.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Object { .. } => "object",
            NodeKind::Array { .. } => "array",
            NodeKind::Leaf { ty, .. } => ty.as_str(),
        }
    }

    /// Returns `true` for an object node without properties.
    #[must_use]
    pub fn is_empty_object(&self) -> bool {
        matches!(&self.kind, NodeKind::Object { properties, .. } if properties.is_empty())
    }

    /// Looks up the node a path points to, honouring array accessors.
    #[must_use]
    pub fn node_at(&self, path: &SlotPath) -> Option<&Self> {
        let mut current = self;
        for segment in path.segments() {
            let NodeKind::Object { properties, .. } = &current.kind else {
                return None;
            };
            let child = properties.get(&segment.key)?;
            current = match segment.accessor {
                Accessor::Key => child,
                Accessor::Index(_) | Accessor::Wildcard => {
                    let NodeKind::Array { items } = &child.kind else {
                        return None;
                    };
                    items.as_deref()?
                }
            };
        }
        Some(current)
    }

    /// Emits the node as a JSON Schema (draft 2020-12) value.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        match &self.kind {
            NodeKind::Object {
                properties,
                required,
            } => {
                let mut schema = json!({
                    "type": "object",
                    "properties": properties
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_json_schema()))
                        .collect::<serde_json::Map<String, Value>>(),
                    "additionalProperties": false,
                });
                if !required.is_empty() {
                    schema["required"] = json!(required.iter().collect::<Vec<_>>());
                }
                schema
            }
            NodeKind::Array { items } => {
                let mut schema = json!({"type": "array"});
                if let Some(items) = items {
                    schema["items"] = items.to_json_schema();
                }
                schema
            }
            NodeKind::Leaf { ty, constraints } => {
                let mut schema = json!({"type": ty.as_str()});
                if let Some(pattern) = &constraints.pattern {
                    schema["pattern"] = json!(pattern);
                }
                if let Some(values) = &constraints.enum_values {
                    schema["enum"] = json!(values);
                }
                if let Some(n) = constraints.min_length {
                    schema["minLength"] = json!(n);
                }
                if let Some(n) = constraints.max_length {
                    schema["maxLength"] = json!(n);
                }
                if let Some(n) = constraints.min_words {
                    schema["x-minWords"] = json!(n);
                }
                if let Some(n) = constraints.max_words {
                    schema["x-maxWords"] = json!(n);
                }
                if let Some(n) = constraints.min_sentences {
                    schema["x-minSentences"] = json!(n);
                }
                if let Some(n) = constraints.max_sentences {
                    schema["x-maxSentences"] = json!(n);
                }
                schema
            }
        }
    }
}

/// Structurally merges `incoming` into `existing`.
///
/// Objects union their properties and required sets, arrays merge their
/// items, and leaves merge only when type and keywords agree exactly.
///
/// # Errors
///
/// Returns [`SchemaError::IncompatibleMerge`] when the shapes disagree, or
/// [`SchemaError::DuplicatePath`] when both sides carry provenance from
/// different items.
pub fn merge_nodes(
    existing: &mut SchemaNode,
    incoming: SchemaNode,
    path: &str,
) -> Result<(), SchemaError> {
    let left_kind = existing.kind_name();
    let left_provenance = existing.provenance.clone();
    let right_kind = incoming.kind_name();
    match (&mut existing.kind, incoming.kind) {
        (
            NodeKind::Object {
                properties,
                required,
            },
            NodeKind::Object {
                properties: incoming_props,
                required: incoming_required,
            },
        ) => {
            for (key, node) in incoming_props {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                match properties.get_mut(&key) {
                    Some(existing_child) => merge_nodes(existing_child, node, &child_path)?,
                    None => {
                        properties.insert(key, node);
                    }
                }
            }
            required.extend(incoming_required);
            Ok(())
        }
        (NodeKind::Array { items }, NodeKind::Array {
            items: incoming_items,
        }) => {
            if let Some(incoming_items) = incoming_items {
                match items {
                    Some(existing_items) => {
                        merge_nodes(existing_items, *incoming_items, &format!("{path}[]"))?;
                    }
                    None => *items = Some(incoming_items),
                }
            }
            Ok(())
        }
        (
            NodeKind::Leaf { ty, constraints },
            NodeKind::Leaf {
                ty: incoming_ty,
                constraints: incoming_constraints,
            },
        ) => {
            if *ty == incoming_ty && *constraints == incoming_constraints {
                Ok(())
            } else {
                Err(collision(
                    left_provenance,
                    incoming.provenance,
                    path,
                    left_kind,
                    right_kind,
                ))
            }
        }
        _ => Err(collision(
            left_provenance,
            incoming.provenance,
            path,
            left_kind,
            right_kind,
        )),
    }
}

fn collision(
    left_provenance: Option<String>,
    incoming_provenance: Option<String>,
    path: &str,
    left_kind: &str,
    right_kind: &str,
) -> SchemaError {
    match (left_provenance, incoming_provenance) {
        (Some(first), Some(second)) if first != second => SchemaError::DuplicatePath {
            path: path.to_string(),
            first,
            second,
        },
        _ => SchemaError::IncompatibleMerge {
            path: path.to_string(),
            left: left_kind.to_string(),
            right: right_kind.to_string(),
        },
    }
}

/// Builds a schema tree from path-addressed leaf contributions, tracking
/// canonical-path claims for duplicate detection.
#[derive(Debug)]
pub struct SchemaBuilder {
    root: SchemaNode,
    claims: FxHashMap<String, String>,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Creates a builder with an empty object root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: SchemaNode::object(),
            claims: FxHashMap::default(),
        }
    }

    /// Adds a leaf (or subtree) node at a path on behalf of a content item.
    ///
    /// `required` marks the terminal key in its parent's `required` set.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicatePath`] naming both contributors when
    /// the canonical path is already claimed by a different item, and
    /// [`SchemaError::IncompatibleMerge`] / duplicate-path errors when the
    /// structures cannot be unioned.
    pub fn add_property(
        &mut self,
        path: &SlotPath,
        node: SchemaNode,
        item_id: &str,
        required: bool,
    ) -> Result<(), SchemaError> {
        let canonical = path.canonical();
        if let Some(first) = self.claims.get(&canonical) {
            if first != item_id {
                return Err(SchemaError::DuplicatePath {
                    path: canonical,
                    first: first.clone(),
                    second: item_id.to_string(),
                });
            }
        }

        let node = node.with_provenance(item_id);
        insert_at(&mut self.root, path.segments(), node, required, "")?;
        self.claims.insert(canonical, item_id.to_string());
        Ok(())
    }

    /// Finishes the build, returning the schema tree.
    #[must_use]
    pub fn finish(self) -> SchemaNode {
        self.root
    }

    /// The canonical paths claimed so far.
    #[must_use]
    pub fn claims(&self) -> &FxHashMap<String, String> {
        &self.claims
    }
}

fn insert_at(
    current: &mut SchemaNode,
    segments: &[crate::path::Segment],
    node: SchemaNode,
    required: bool,
    path_so_far: &str,
) -> Result<(), SchemaError> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(());
    };
    let child_path = if path_so_far.is_empty() {
        segment.to_string()
    } else {
        format!("{path_so_far}.{segment}")
    };

    let NodeKind::Object {
        properties,
        required: required_set,
    } = &mut current.kind
    else {
        return Err(SchemaError::IncompatibleMerge {
            path: path_so_far.to_string(),
            left: current.kind_name().to_string(),
            right: "object".to_string(),
        });
    };

    // Only the terminal key is marked required in its parent.
    if required && rest.is_empty() {
        required_set.insert(segment.key.clone());
    }

    let is_array = !matches!(segment.accessor, Accessor::Key);

    if !is_array && rest.is_empty() {
        return match properties.get_mut(&segment.key) {
            Some(existing) => merge_nodes(existing, node, &child_path),
            None => {
                properties.insert(segment.key.clone(), node);
                Ok(())
            }
        };
    }

    let slot = properties.entry(segment.key.clone()).or_insert_with(|| {
        if is_array {
            SchemaNode::array(None)
        } else {
            SchemaNode::object()
        }
    });

    if is_array {
        let NodeKind::Array { items } = &mut slot.kind else {
            return Err(collision(
                slot.provenance.clone(),
                node.provenance,
                &child_path,
                slot.kind_name(),
                "array",
            ));
        };
        match items {
            None => {
                if rest.is_empty() {
                    *items = Some(Box::new(node));
                } else {
                    let mut fresh = SchemaNode::object();
                    insert_at(&mut fresh, rest, node, required, &child_path)?;
                    *items = Some(Box::new(fresh));
                }
                Ok(())
            }
            Some(existing) => {
                if rest.is_empty() {
                    merge_nodes(existing, node, &child_path)
                } else {
                    insert_at(existing, rest, node, required, &child_path)
                }
            }
        }
    } else {
        insert_at(slot, rest, node, required, &child_path)
    }
}
