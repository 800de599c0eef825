//! NAS builder: orchestrates the resolvers over the template layout.
//!
//! For every non-AI content item the builder records an expected slot, asks
//! the first matching resolver for a value, and writes it into the partial
//! snapshot through the canonical path setter. AI items are skipped. After
//! the walk, coverage post-processing flags every expected slot that
//! neither materialised a resolved path nor produced a warning.

use serde_json::Value;
use tracing::debug;

use super::{ResolveCtx, ResolvedField, SlotResolver, default_resolvers};
use crate::diag::{Severity, Warning, WarningCode};
use crate::path::{SlotPath, set_by_path};
use crate::template::{NoteTemplate, SlotKind};

/// A non-AI slot the template expects the snapshot to cover.
#[derive(Debug, Clone)]
pub struct ExpectedSlot {
    /// Content item id.
    pub slot_id: String,
    /// Owning component id.
    pub component_id: String,
    /// Target path (possibly with a terminal wildcard).
    pub path: SlotPath,
    /// Whether the item's constraints mark it required.
    pub required: bool,
}

/// Output of the NAS build.
#[derive(Debug)]
pub struct NasResolution {
    /// The partial snapshot.
    pub nas_data: Value,
    /// Every successfully resolved field, in layout order.
    pub resolved: Vec<ResolvedField>,
    /// Diagnostics collected during resolution and coverage.
    pub warnings: Vec<Warning>,
    /// Canonical paths of slots that produced neither value nor warning.
    pub unresolved_slots: Vec<String>,
}

/// Walks the layout and assembles the non-AI snapshot.
pub struct NasBuilder {
    resolvers: Vec<Box<dyn SlotResolver>>,
}

impl Default for NasBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NasBuilder {
    /// Creates a builder with the built-in resolver set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolvers: default_resolvers(),
        }
    }

    /// Creates a builder with a custom resolver set.
    #[must_use]
    pub fn with_resolvers(resolvers: Vec<Box<dyn SlotResolver>>) -> Self {
        Self { resolvers }
    }

    /// Builds the snapshot for a template against a source record.
    #[must_use]
    pub fn build(&self, template: &NoteTemplate, source: &Value) -> NasResolution {
        let ctx = ResolveCtx { source };
        let mut nas_data = Value::Object(serde_json::Map::new());
        let mut expected: Vec<ExpectedSlot> = Vec::new();
        let mut resolved: Vec<ResolvedField> = Vec::new();
        let mut warnings: Vec<Warning> = Vec::new();
        let mut written: Vec<SlotPath> = Vec::new();
        let mut warned_slots: Vec<String> = Vec::new();

        template.for_each_item(&mut |component, item| {
            if item.slot == SlotKind::Ai {
                return;
            }
            let required = item.constraints.as_ref().is_some_and(|c| c.required);
            let severity = if required {
                Severity::Error
            } else {
                Severity::Warning
            };

            if let Some(path) = item
                .target_path
                .as_deref()
                .and_then(|p| SlotPath::parse_terminal_wildcard(p).ok())
            {
                expected.push(ExpectedSlot {
                    slot_id: item.id.clone(),
                    component_id: component.id.clone(),
                    path,
                    required,
                });
            }

            let Some(resolver) = self.resolvers.iter().find(|r| r.can_resolve(item.slot)) else {
                warnings.push(
                    Warning::error(
                        WarningCode::MissingSource,
                        format!("no resolver for {} slot", item.slot),
                    )
                    .with_component(component.id.clone())
                    .with_slot(item.id.clone()),
                );
                warned_slots.push(item.id.clone());
                return;
            };

            match resolver.resolve(item, &ctx) {
                Ok(field) => {
                    debug!(slot = %field.slot_id, path = %field.path, resolver = resolver.name(), "slot resolved");
                    match set_by_path(&mut nas_data, &field.path, field.value.clone()) {
                        Ok(concrete) => {
                            written.push(concrete);
                            resolved.push(field);
                        }
                        Err(e) => {
                            warnings.push(
                                Warning::new(severity, WarningCode::TypeMismatch, e.to_string())
                                    .with_component(component.id.clone())
                                    .with_slot(item.id.clone())
                                    .with_path(field.path.canonical()),
                            );
                            warned_slots.push(item.id.clone());
                        }
                    }
                }
                Err(failure) => {
                    debug!(slot = %item.id, code = ?failure.code, "slot unresolved");
                    let mut warning =
                        Warning::new(severity, failure.code, failure.message)
                            .with_component(component.id.clone())
                            .with_slot(item.id.clone());
                    if let Some(path) = item.target_path.as_deref() {
                        warning = warning.with_path(path);
                    }
                    warnings.push(warning);
                    warned_slots.push(item.id.clone());
                }
            }
        });

        let unresolved_slots =
            coverage(&expected, &written, &warned_slots, &mut warnings);

        NasResolution {
            nas_data,
            resolved,
            warnings,
            unresolved_slots,
        }
    }
}

/// Compares expected slots against written paths (after wildcard
/// normalisation) and already-warned slots; anything left over becomes an
/// `unresolved_slot` warning.
fn coverage(
    expected: &[ExpectedSlot],
    written: &[SlotPath],
    warned_slots: &[String],
    warnings: &mut Vec<Warning>,
) -> Vec<String> {
    let mut unresolved = Vec::new();
    for slot in expected {
        if warned_slots.contains(&slot.slot_id) {
            continue;
        }
        let materialised = written.iter().any(|w| slot.path.accepts(w));
        if materialised {
            continue;
        }
        let severity = if slot.required {
            Severity::Error
        } else {
            Severity::Warning
        };
        warnings.push(
            Warning::new(
                severity,
                WarningCode::UnresolvedSlot,
                format!("expected slot was never written: {}", slot.path),
            )
            .with_component(slot.component_id.clone())
            .with_slot(slot.slot_id.clone())
            .with_path(slot.path.canonical()),
        );
        unresolved.push(slot.path.canonical());
    }
    unresolved
}
