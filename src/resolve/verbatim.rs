//! Verbatim resolver: extracts a quoted span with provenance.
//!
//! References follow `source:id#locator`. A time locator selects transcript
//! segments whose `timestamp` lies in the range; when only raw text exists
//! the span is approximated by character offsets at ~15 characters per
//! second. A page locator selects `pages[n-1].text`. Without a locator the
//! whole document text is returned. The resolved value is always
//! `{text, ref}`.

use serde_json::{Value, json};

use super::{ResolveCtx, ResolveFailure, ResolvedField, SlotResolver, target_path};
use crate::diag::WarningCode;
use crate::template::{ContentItem, Locator, SlotKind, VerbatimRef};

/// Character-range fallback rate for time locators over raw text.
const CHARS_PER_SECOND: usize = 15;

/// Resolves `verbatim` slots from a referenced source document.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerbatimResolver;

impl SlotResolver for VerbatimResolver {
    fn name(&self) -> &'static str {
        "verbatim"
    }

    fn can_resolve(&self, kind: SlotKind) -> bool {
        kind == SlotKind::Verbatim
    }

    fn resolve(
        &self,
        item: &ContentItem,
        ctx: &ResolveCtx<'_>,
    ) -> Result<ResolvedField, ResolveFailure> {
        let path = target_path(item)?;
        let raw_ref = item.verbatim_ref.as_deref().ok_or_else(|| {
            ResolveFailure::new(WarningCode::InvalidRef, "verbatim item has no ref")
        })?;
        let verbatim_ref = VerbatimRef::parse(raw_ref)
            .map_err(|message| ResolveFailure::new(WarningCode::InvalidRef, message))?;

        let document = ctx
            .source
            .get(&verbatim_ref.source)
            .and_then(|collection| collection.get(&verbatim_ref.id))
            .ok_or_else(|| {
                ResolveFailure::new(
                    WarningCode::MissingSource,
                    format!(
                        "source document {}:{} not found",
                        verbatim_ref.source, verbatim_ref.id
                    ),
                )
            })?;

        let text = extract(document, verbatim_ref.locator)?;
        Ok(ResolvedField {
            slot_id: item.id.clone(),
            path,
            value: json!({"text": text, "ref": raw_ref}),
        })
    }
}

fn extract(document: &Value, locator: Option<Locator>) -> Result<String, ResolveFailure> {
    match locator {
        None => whole_text(document),
        Some(Locator::Time { start, end }) => time_span(document, start, end),
        Some(Locator::Page(page)) => page_text(document, page),
    }
}

fn whole_text(document: &Value) -> Result<String, ResolveFailure> {
    if let Some(text) = document.as_str() {
        return Ok(text.to_string());
    }
    if let Some(text) = document.get("text").and_then(Value::as_str) {
        return Ok(text.to_string());
    }
    if let Some(segments) = document.get("segments").and_then(Value::as_array) {
        let joined: Vec<&str> = segments
            .iter()
            .filter_map(|s| s.get("text").and_then(Value::as_str))
            .collect();
        if !joined.is_empty() {
            return Ok(joined.join(" "));
        }
    }
    Err(ResolveFailure::new(
        WarningCode::InvalidRef,
        "document carries no text",
    ))
}

fn time_span(document: &Value, start: u64, end: u64) -> Result<String, ResolveFailure> {
    if let Some(segments) = document.get("segments").and_then(Value::as_array) {
        let selected: Vec<&str> = segments
            .iter()
            .filter(|segment| {
                segment
                    .get("timestamp")
                    .and_then(Value::as_f64)
                    .is_some_and(|ts| {
                        #[allow(clippy::cast_precision_loss)]
                        let (a, b) = (start as f64, end as f64);
                        ts >= a && ts <= b
                    })
            })
            .filter_map(|segment| segment.get("text").and_then(Value::as_str))
            .collect();
        if selected.is_empty() {
            return Err(ResolveFailure::new(
                WarningCode::InvalidRef,
                format!("no segments within t={start}-{end}"),
            ));
        }
        return Ok(selected.join(" "));
    }

    // No segment metadata: approximate by character range over raw text.
    let text = whole_text(document)?;
    let from = usize::try_from(start)
        .unwrap_or(usize::MAX)
        .saturating_mul(CHARS_PER_SECOND);
    let to = usize::try_from(end)
        .unwrap_or(usize::MAX)
        .saturating_mul(CHARS_PER_SECOND);
    let span: String = text
        .chars()
        .skip(from)
        .take(to.saturating_sub(from))
        .collect();
    if span.is_empty() {
        return Err(ResolveFailure::new(
            WarningCode::InvalidRef,
            format!("time range t={start}-{end} is past the end of the document"),
        ));
    }
    Ok(span)
}

fn page_text(document: &Value, page: usize) -> Result<String, ResolveFailure> {
    let pages = document
        .get("pages")
        .and_then(Value::as_array)
        .ok_or_else(|| ResolveFailure::new(WarningCode::InvalidRef, "document has no pages"))?;
    let entry = pages.get(page - 1).ok_or_else(|| {
        ResolveFailure::new(
            WarningCode::InvalidRef,
            format!("page {page} out of range ({} pages)", pages.len()),
        )
    })?;
    entry
        .as_str()
        .map(ToString::to_string)
        .or_else(|| {
            entry
                .get("text")
                .and_then(Value::as_str)
                .map(ToString::to_string)
        })
        .ok_or_else(|| ResolveFailure::new(WarningCode::InvalidRef, "page carries no text"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(verbatim_ref: &str) -> ContentItem {
        ContentItem {
            id: "vb".to_string(),
            slot: SlotKind::Verbatim,
            verbatim_ref: Some(verbatim_ref.to_string()),
            target_path: Some("subjective.quote".to_string()),
            ..ContentItem::default()
        }
    }

    #[test]
    fn test_time_locator_selects_segments() {
        let source = json!({
            "transcript": {"visit_123": {"segments": [
                {"timestamp": 12, "text": "earlier remark"},
                {"timestamp": 42, "text": "feeling a lot better"},
                {"timestamp": 80, "text": "later remark"}
            ]}}
        });
        let ctx = ResolveCtx { source: &source };
        let field = VerbatimResolver
            .resolve(&item("transcript:visit_123#t=40-55"), &ctx)
            .unwrap();
        assert_eq!(
            field.value,
            json!({"text": "feeling a lot better", "ref": "transcript:visit_123#t=40-55"})
        );
    }

    #[test]
    fn test_time_locator_joins_multiple_segments() {
        let source = json!({
            "transcript": {"v": {"segments": [
                {"timestamp": 40, "text": "first"},
                {"timestamp": 50, "text": "second"}
            ]}}
        });
        let ctx = ResolveCtx { source: &source };
        let field = VerbatimResolver
            .resolve(&item("transcript:v#t=40-55"), &ctx)
            .unwrap();
        assert_eq!(field.value["text"], "first second");
    }

    #[test]
    fn test_time_locator_character_fallback() {
        // 15 chars/second: t=1-2 selects chars [15, 30).
        let text: String = ('a'..='z').cycle().take(60).collect();
        let source = json!({"transcript": {"v": {"text": text}}});
        let ctx = ResolveCtx { source: &source };
        let field = VerbatimResolver
            .resolve(&item("transcript:v#t=1-2"), &ctx)
            .unwrap();
        let span = field.value["text"].as_str().unwrap();
        assert_eq!(span.len(), 15);
        assert_eq!(span.chars().next(), Some('p'));
    }

    #[test]
    fn test_page_locator_is_one_based() {
        let source = json!({"chart": {"doc": {"pages": [
            {"text": "page one"}, {"text": "page two"}
        ]}}});
        let ctx = ResolveCtx { source: &source };
        let field = VerbatimResolver.resolve(&item("chart:doc#p=2"), &ctx).unwrap();
        assert_eq!(field.value["text"], "page two");

        let failure = VerbatimResolver
            .resolve(&item("chart:doc#p=3"), &ctx)
            .unwrap_err();
        assert_eq!(failure.code, WarningCode::InvalidRef);
    }

    #[test]
    fn test_no_locator_returns_whole_text() {
        let source = json!({"chart": {"doc": {"text": "entire document"}}});
        let ctx = ResolveCtx { source: &source };
        let field = VerbatimResolver.resolve(&item("chart:doc"), &ctx).unwrap();
        assert_eq!(field.value["text"], "entire document");
    }

    #[test]
    fn test_missing_document() {
        let source = json!({"transcript": {}});
        let ctx = ResolveCtx { source: &source };
        let failure = VerbatimResolver
            .resolve(&item("transcript:gone#t=0-5"), &ctx)
            .unwrap_err();
        assert_eq!(failure.code, WarningCode::MissingSource);
    }

    #[test]
    fn test_no_segments_in_range() {
        let source = json!({"transcript": {"v": {"segments": [
            {"timestamp": 100, "text": "late"}
        ]}}});
        let ctx = ResolveCtx { source: &source };
        let failure = VerbatimResolver
            .resolve(&item("transcript:v#t=0-5"), &ctx)
            .unwrap_err();
        assert_eq!(failure.code, WarningCode::InvalidRef);
    }
}
