//! Lookup resolver: copies a value from the source record.

use super::{ResolveCtx, ResolveFailure, ResolvedField, SlotResolver, target_path};
use crate::diag::WarningCode;
use crate::path::{SlotPath, get_by_path};
use crate::template::{ContentItem, SlotKind};

/// Resolves `lookup` slots by reading the source record at `item.lookup`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LookupResolver;

impl SlotResolver for LookupResolver {
    fn name(&self) -> &'static str {
        "lookup"
    }

    fn can_resolve(&self, kind: SlotKind) -> bool {
        kind == SlotKind::Lookup
    }

    fn resolve(
        &self,
        item: &ContentItem,
        ctx: &ResolveCtx<'_>,
    ) -> Result<ResolvedField, ResolveFailure> {
        let path = target_path(item)?;
        let raw = item.lookup.as_deref().ok_or_else(|| {
            ResolveFailure::new(WarningCode::MissingSource, "lookup item has no lookup path")
        })?;
        let lookup = SlotPath::parse(raw).map_err(|e| {
            ResolveFailure::new(WarningCode::MissingSource, format!("invalid lookup path: {e}"))
        })?;

        let value = get_by_path(ctx.source, &lookup).ok_or_else(|| {
            ResolveFailure::new(
                WarningCode::MissingSource,
                format!("source has no value at {raw}"),
            )
        })?;

        Ok(ResolvedField {
            slot_id: item.id.clone(),
            path,
            value: value.clone(),
        })
    }
}
