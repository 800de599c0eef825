//! Static resolver: passes a literal through to the snapshot.

use serde_json::Value;

use super::{ResolveCtx, ResolveFailure, ResolvedField, SlotResolver, target_path};
use crate::diag::WarningCode;
use crate::template::{ContentItem, SlotKind};

/// Resolves `static` slots from the item's literal `value` or `text`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticResolver;

impl SlotResolver for StaticResolver {
    fn name(&self) -> &'static str {
        "static"
    }

    fn can_resolve(&self, kind: SlotKind) -> bool {
        kind == SlotKind::Static
    }

    fn resolve(
        &self,
        item: &ContentItem,
        _ctx: &ResolveCtx<'_>,
    ) -> Result<ResolvedField, ResolveFailure> {
        let path = target_path(item)?;
        let value = item
            .value
            .clone()
            .or_else(|| item.text.clone().map(Value::String))
            .ok_or_else(|| {
                ResolveFailure::new(
                    WarningCode::MissingSource,
                    "static item has neither text nor value",
                )
            })?;

        Ok(ResolvedField {
            slot_id: item.id.clone(),
            path,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_literal() {
        let item = ContentItem {
            id: "st".to_string(),
            slot: SlotKind::Static,
            text: Some("Plan".to_string()),
            target_path: Some("plan.title".to_string()),
            ..ContentItem::default()
        };
        let source = json!({});
        let field = StaticResolver
            .resolve(&item, &ResolveCtx { source: &source })
            .unwrap();
        assert_eq!(field.value, json!("Plan"));
    }

    #[test]
    fn test_value_wins_over_text() {
        let item = ContentItem {
            id: "st".to_string(),
            slot: SlotKind::Static,
            text: Some("ignored".to_string()),
            value: Some(json!(42)),
            target_path: Some("plan.priority".to_string()),
            ..ContentItem::default()
        };
        let source = json!({});
        let field = StaticResolver
            .resolve(&item, &ResolveCtx { source: &source })
            .unwrap();
        assert_eq!(field.value, json!(42));
    }

    #[test]
    fn test_missing_literal_fails() {
        let item = ContentItem {
            id: "st".to_string(),
            slot: SlotKind::Static,
            target_path: Some("plan.title".to_string()),
            ..ContentItem::default()
        };
        let source = json!({});
        let failure = StaticResolver
            .resolve(&item, &ResolveCtx { source: &source })
            .unwrap_err();
        assert_eq!(failure.code, WarningCode::MissingSource);
    }
}
