//! Computed resolver: evaluates a formula over the source record.

use super::{ResolveCtx, ResolveFailure, ResolvedField, SlotResolver, target_path};
use crate::diag::WarningCode;
use crate::formula::{apply_format, eval_str};
use crate::template::{ContentItem, SlotKind};

/// Resolves `computed` slots by evaluating `item.formula` and applying the
/// optional `format` post-processing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputedResolver;

impl SlotResolver for ComputedResolver {
    fn name(&self) -> &'static str {
        "computed"
    }

    fn can_resolve(&self, kind: SlotKind) -> bool {
        kind == SlotKind::Computed
    }

    fn resolve(
        &self,
        item: &ContentItem,
        ctx: &ResolveCtx<'_>,
    ) -> Result<ResolvedField, ResolveFailure> {
        let path = target_path(item)?;
        let formula = item.formula.as_deref().ok_or_else(|| {
            ResolveFailure::new(WarningCode::FormulaError, "computed item has no formula")
        })?;

        let raw = eval_str(formula, ctx.source)
            .map_err(|e| ResolveFailure::new(WarningCode::FormulaError, e.to_string()))?;
        let value = match item.format {
            Some(format) => apply_format(&raw, format)
                .map_err(|e| ResolveFailure::new(WarningCode::FormulaError, e.to_string()))?,
            None => raw,
        };

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
    use crate::formula::FormatKind;
    use serde_json::json;

    fn item(formula: &str, format: Option<FormatKind>) -> ContentItem {
        ContentItem {
            id: "cp".to_string(),
            slot: SlotKind::Computed,
            formula: Some(formula.to_string()),
            format,
            target_path: Some("assessments.phq9Delta".to_string()),
            ..ContentItem::default()
        }
    }

    #[test]
    fn test_delta_score_formula() {
        let source = json!({"assessments": {"current": {"PHQ9": 9}, "previous": {"PHQ9": 15}}});
        let ctx = ResolveCtx { source: &source };
        let field = ComputedResolver
            .resolve(
                &item(
                    "assessments.current.PHQ9 - assessments.previous.PHQ9",
                    Some(FormatKind::DeltaScore),
                ),
                &ctx,
            )
            .unwrap();
        assert_eq!(field.value, json!("-6"));
    }

    #[test]
    fn test_unformatted_result_stays_raw() {
        let source = json!({"a": 2, "b": 3});
        let ctx = ResolveCtx { source: &source };
        let field = ComputedResolver.resolve(&item("a * b", None), &ctx).unwrap();
        assert_eq!(field.value, json!(6.0));
    }

    #[test]
    fn test_missing_identifier_is_formula_error() {
        let source = json!({});
        let ctx = ResolveCtx { source: &source };
        let failure = ComputedResolver
            .resolve(&item("missing.path + 1", None), &ctx)
            .unwrap_err();
        assert_eq!(failure.code, WarningCode::FormulaError);
        assert!(failure.message.contains("missing.path"));
    }

    #[test]
    fn test_division_by_zero_is_formula_error() {
        let source = json!({"n": 0});
        let ctx = ResolveCtx { source: &source };
        let failure = ComputedResolver
            .resolve(&item("10 / n", None), &ctx)
            .unwrap_err();
        assert_eq!(failure.code, WarningCode::FormulaError);
    }
}
