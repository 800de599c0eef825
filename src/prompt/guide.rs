//! Field guide construction.
//!
//! One entry per `ai` content item: its output path, guidance lines,
//! constraints, and the dependencies it declares. Dependency paths with a
//! `factPack.` prefix are tagged for the fact pack; everything else reads
//! from the snapshot.

use serde::{Deserialize, Serialize};

use crate::template::{Constraints, NoteTemplate, SlotKind};

/// Which context a dependency path reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DepScope {
    /// The non-AI snapshot.
    Nas,
    /// The side fact pack.
    FactPack,
}

/// A single declared dependency of an `ai` slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    /// Context the path reads from.
    pub scope: DepScope,
    /// Dotted path within that context (prefix already stripped).
    pub path: String,
}

/// Field guide entry for one `ai` content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldGuideEntry {
    /// Output path the LLM must fill.
    pub path: String,
    /// Free-form guidance lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guidance: Vec<String>,
    /// Constraints mirrored from the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
    /// Declared dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

/// Prefix that routes a dependency to the fact pack.
const FACT_PACK_PREFIX: &str = "factPack.";

/// Builds the field guide by walking the layout in order.
#[must_use]
pub fn build_field_guide(template: &NoteTemplate) -> Vec<FieldGuideEntry> {
    let mut entries = Vec::new();
    template.for_each_item(&mut |_, item| {
        if item.slot != SlotKind::Ai {
            return;
        }
        let Some(path) = item.output_path.clone() else {
            return;
        };
        let dependencies = item
            .ai_deps
            .iter()
            .map(|dep| match dep.strip_prefix(FACT_PACK_PREFIX) {
                Some(stripped) => Dependency {
                    scope: DepScope::FactPack,
                    path: stripped.to_string(),
                },
                None => Dependency {
                    scope: DepScope::Nas,
                    path: dep.clone(),
                },
            })
            .collect();
        entries.push(FieldGuideEntry {
            path,
            guidance: item.guidance.clone(),
            constraints: item.constraints.clone(),
            dependencies,
        });
    });
    entries
}
