//! AIS and NAS schema derivation.
//!
//! Both derivers walk the template layout depth-first and contribute one
//! leaf node per content item of their slot universe: the AI input schema
//! covers only `ai` items via `outputPath`, the non-AI snapshot schema
//! covers the other three kinds via `targetPath`. Items nested in
//! `listItems` and `tableMap` follow the same path discipline.

use super::{LeafType, SchemaBuilder, SchemaNode};
use crate::error::{Error, TemplateError};
use crate::path::SlotPath;
use crate::template::{Constraints, ContentItem, NoteTemplate, SlotKind};

/// Derives the AI input schema (AIS) covering only `ai` slots.
///
/// # Errors
///
/// Fails with a duplicate-path error naming both contributors when two `ai`
/// items claim the same canonical path with incompatible subtrees.
pub fn derive_ai_schema(template: &NoteTemplate) -> Result<SchemaNode, Error> {
    derive(template, |slot| slot == SlotKind::Ai, ai_path)
}

/// Derives the non-AI snapshot schema (NAS) covering the deterministic
/// slot kinds.
///
/// # Errors
///
/// Same failure mode as [`derive_ai_schema`], within the non-AI universe.
pub fn derive_nas_schema(template: &NoteTemplate) -> Result<SchemaNode, Error> {
    derive(template, |slot| slot != SlotKind::Ai, nas_path)
}

fn ai_path(item: &ContentItem) -> Option<&str> {
    item.output_path.as_deref()
}

fn nas_path(item: &ContentItem) -> Option<&str> {
    item.target_path.as_deref()
}

fn derive(
    template: &NoteTemplate,
    in_universe: impl Fn(SlotKind) -> bool,
    path_of: fn(&ContentItem) -> Option<&str>,
) -> Result<SchemaNode, Error> {
    let mut builder = SchemaBuilder::new();
    let mut failure: Option<Error> = None;

    template.for_each_item(&mut |_, item| {
        if failure.is_some() || !in_universe(item.slot) {
            return;
        }
        let result = contribute(&mut builder, item, path_of(item));
        if let Err(err) = result {
            failure = Some(err);
        }
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(builder.finish()),
    }
}

fn contribute(
    builder: &mut SchemaBuilder,
    item: &ContentItem,
    path: Option<&str>,
) -> Result<(), Error> {
    let Some(raw_path) = path else {
        return Err(TemplateError::MissingField {
            item: item.id.clone(),
            field: if item.slot == SlotKind::Ai {
                "outputPath".to_string()
            } else {
                "targetPath".to_string()
            },
            slot: item.slot.to_string(),
        }
        .into());
    };
    let path = SlotPath::parse_terminal_wildcard(raw_path).map_err(|source| {
        Error::Template(TemplateError::InvalidPath {
            item: item.id.clone(),
            source,
        })
    })?;

    let required = item.constraints.as_ref().is_some_and(|c| c.required);
    let node = leaf_for_item(item);
    builder
        .add_property(&path, node, &item.id, required)
        .map_err(Error::Schema)
}

/// Shapes the leaf a content item contributes.
///
/// Verbatim targets become `{text, ref}` objects with provenance; all other
/// kinds infer the JSON type from constraints, defaulting to `string`.
fn leaf_for_item(item: &ContentItem) -> SchemaNode {
    if item.slot == SlotKind::Verbatim {
        let mut object = SchemaNode::object();
        if let super::NodeKind::Object {
            properties,
            required,
        } = &mut object.kind
        {
            properties.insert("text".to_string(), SchemaNode::string());
            properties.insert("ref".to_string(), SchemaNode::string());
            required.insert("text".to_string());
            required.insert("ref".to_string());
        }
        return object;
    }

    let constraints = item.constraints.clone().unwrap_or_default();
    SchemaNode::leaf(infer_leaf_type(&constraints), keywords_of(constraints))
}

fn infer_leaf_type(constraints: &Constraints) -> LeafType {
    match &constraints.enum_values {
        Some(values) if !values.is_empty() && values.iter().all(serde_json::Value::is_number) => {
            LeafType::Number
        }
        Some(values) if !values.is_empty() && values.iter().all(serde_json::Value::is_boolean) => {
            LeafType::Boolean
        }
        _ => LeafType::String,
    }
}

/// The `required` flag lives in the parent's required list, not on the leaf.
fn keywords_of(mut constraints: Constraints) -> Constraints {
    constraints.required = false;
    constraints
}
