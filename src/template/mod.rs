//! Note template data model.
//!
//! A template is identified by `(id, name, version)` and carries an ordered
//! `layout` of components. Components nest via `children` and hold ordered
//! content items; each item declares one slot kind that says where its data
//! comes from (`ai`, `lookup`, `static`, `computed`, `verbatim`).
//!
//! Templates are constructed externally (usually deserialized from JSON)
//! and treated as immutable input.

mod validate;

pub use validate::validate_template;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::formula::FormatKind;

/// A declarative note template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteTemplate {
    /// Stable template identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Semver version string.
    pub version: String,
    /// Ordered component tree.
    pub layout: Vec<Component>,
    /// Presentational style block, passed through to the renderer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Value>,
    /// Prompt fragments for the LLM stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptSpec>,
}

/// Template-provided prompt fragments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptSpec {
    /// System-message body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Main instruction for the user message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    /// Additional rules appended to the system message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<String>,
}

/// A node in the template layout tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Component identifier, unique across the template.
    pub id: String,
    /// Component kind.
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    /// Kind-specific presentation properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<ComponentProps>,
    /// Ordered content items.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentItem>,
    /// Nested sub-components.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Component>,
}

/// The known component kinds. Unknown kinds deserialize as [`Self::Other`]
/// and render as generic blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// Titled section.
    Section,
    /// Untitled grouping block.
    Group,
    /// Column-mapped table.
    Table,
    /// Bullet or row list.
    List,
    /// Document header.
    Header,
    /// Any other kind; passed through to the renderer untyped.
    #[serde(other)]
    Other,
}

/// Kind-specific component properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentProps {
    /// Table column headings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    /// Table column widths (CSS lengths).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col_widths: Option<Vec<String>>,
    /// Display title for sections and headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Anything else; preserved for the renderer.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// The discriminant of a content item: where its data comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    /// Filled by the LLM.
    Ai,
    /// Copied from the source record.
    Lookup,
    /// Literal text or value.
    #[default]
    Static,
    /// Evaluated formula over the source record.
    Computed,
    /// Quoted span from a source document, with provenance.
    Verbatim,
}

impl SlotKind {
    /// The lowercase wire name of the slot kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Lookup => "lookup",
            Self::Static => "static",
            Self::Computed => "computed",
            Self::Verbatim => "verbatim",
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An addressable leaf of the template carrying one slot kind.
///
/// Only the fields matching the slot kind are meaningful; template
/// validation enforces their presence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    /// Item identifier, unique across the template.
    pub id: String,
    /// Where the item's data comes from.
    pub slot: SlotKind,

    /// `ai`: path the LLM writes to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// `ai`: dotted dependency paths into NAS or the fact pack.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ai_deps: Vec<String>,
    /// `ai`: free-form guidance lines for the field guide.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guidance: Vec<String>,

    /// Non-AI: path the resolved value is written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
    /// `lookup`: path into the source record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup: Option<String>,
    /// `static`: literal text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// `static`: literal value (wins over `text` when both are set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// `computed`: expression over the source record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// `computed`: post-processing applied to the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatKind>,
    /// `verbatim`: `source:id#locator` reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbatim_ref: Option<String>,

    /// Output constraints; `x-*` word/sentence bounds are soft.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
    /// Presentational hints consumed only by the renderer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_hints: Option<Value>,

    /// Nested items for list rows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub list_items: Vec<ContentItem>,
    /// Per-column items for table rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_map: Option<TableMap>,
}

/// Table row mapping: one item per column, positional or named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableMap {
    /// Items in column order.
    Columns(Vec<ContentItem>),
    /// Items keyed by column name.
    Named(BTreeMap<String, ContentItem>),
}

impl TableMap {
    /// Iterates the mapped items in deterministic order.
    pub fn items(&self) -> Box<dyn Iterator<Item = &ContentItem> + '_> {
        match self {
            Self::Columns(items) => Box::new(items.iter()),
            Self::Named(map) => Box::new(map.values()),
        }
    }
}

/// Output constraints attached to a content item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// The slot must produce a value; resolver misses become errors.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    /// Regex the value must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Closed set of admissible values.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    /// Minimum string length.
    #[serde(rename = "minLength", default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    /// Maximum string length.
    #[serde(rename = "maxLength", default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    /// Soft minimum word count.
    #[serde(rename = "x-minWords", default, skip_serializing_if = "Option::is_none")]
    pub min_words: Option<u64>,
    /// Soft maximum word count.
    #[serde(rename = "x-maxWords", default, skip_serializing_if = "Option::is_none")]
    pub max_words: Option<u64>,
    /// Soft minimum sentence count.
    #[serde(rename = "x-minSentences", default, skip_serializing_if = "Option::is_none")]
    pub min_sentences: Option<u64>,
    /// Soft maximum sentence count.
    #[serde(rename = "x-maxSentences", default, skip_serializing_if = "Option::is_none")]
    pub max_sentences: Option<u64>,
}

impl Constraints {
    /// Returns `true` when no constraint is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A verbatim reference: `source:id#locator`.
///
/// The locator is either a time range `t=a-b` over transcript segments or a
/// one-based page selector `p=n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbatimRef {
    /// Source collection name (e.g. `transcript`).
    pub source: String,
    /// Document id within the collection.
    pub id: String,
    /// Optional span locator.
    pub locator: Option<Locator>,
}

/// Span locator within a verbatim source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// Seconds range `t=a-b`, inclusive on both ends.
    Time {
        /// Range start in seconds.
        start: u64,
        /// Range end in seconds.
        end: u64,
    },
    /// One-based page number `p=n`.
    Page(usize),
}

impl VerbatimRef {
    /// Parses `source ":" id ("#" locator)?`.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first grammar violation.
    pub fn parse(input: &str) -> std::result::Result<Self, String> {
        let (source, rest) = input
            .split_once(':')
            .ok_or_else(|| format!("missing ':' in verbatim ref: {input}"))?;
        if source.is_empty() {
            return Err(format!("empty source in verbatim ref: {input}"));
        }
        let (id, locator) = match rest.split_once('#') {
            Some((id, locator_raw)) => (id, Some(parse_locator(locator_raw)?)),
            None => (rest, None),
        };
        if id.is_empty() {
            return Err(format!("empty id in verbatim ref: {input}"));
        }
        Ok(Self {
            source: source.to_string(),
            id: id.to_string(),
            locator,
        })
    }
}

impl fmt::Display for VerbatimRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.id)?;
        match self.locator {
            Some(Locator::Time { start, end }) => write!(f, "#t={start}-{end}"),
            Some(Locator::Page(n)) => write!(f, "#p={n}"),
            None => Ok(()),
        }
    }
}

fn parse_locator(raw: &str) -> std::result::Result<Locator, String> {
    if let Some(range) = raw.strip_prefix("t=") {
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| format!("time locator must be t=a-b: {raw}"))?;
        let start: u64 = start
            .parse()
            .map_err(|_| format!("invalid time range start: {raw}"))?;
        let end: u64 = end
            .parse()
            .map_err(|_| format!("invalid time range end: {raw}"))?;
        if end < start {
            return Err(format!("time range end precedes start: {raw}"));
        }
        return Ok(Locator::Time { start, end });
    }
    if let Some(page) = raw.strip_prefix("p=") {
        let page: usize = page
            .parse()
            .map_err(|_| format!("invalid page number: {raw}"))?;
        if page == 0 {
            return Err(format!("page numbers are one-based: {raw}"));
        }
        return Ok(Locator::Page(page));
    }
    Err(format!("unknown locator: {raw}"))
}

impl NoteTemplate {
    /// Visits every content item in layout order, including items nested in
    /// `listItems` and `tableMap`, together with the owning component.
    pub fn for_each_item<'a>(&'a self, f: &mut dyn FnMut(&'a Component, &'a ContentItem)) {
        for component in &self.layout {
            visit_component(component, f);
        }
    }

    /// Counts the `ai` content items across the whole layout.
    #[must_use]
    pub fn ai_item_count(&self) -> usize {
        let mut count = 0;
        self.for_each_item(&mut |_, item| {
            if item.slot == SlotKind::Ai {
                count += 1;
            }
        });
        count
    }
}

fn visit_component<'a>(
    component: &'a Component,
    f: &mut dyn FnMut(&'a Component, &'a ContentItem),
) {
    for item in &component.content {
        visit_item(component, item, f);
    }
    for child in &component.children {
        visit_component(child, f);
    }
}

fn visit_item<'a>(
    component: &'a Component,
    item: &'a ContentItem,
    f: &mut dyn FnMut(&'a Component, &'a ContentItem),
) {
    f(component, item);
    for nested in &item.list_items {
        visit_item(component, nested, f);
    }
    if let Some(table_map) = &item.table_map {
        for nested in table_map.items() {
            visit_item(component, nested, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn item(id: &str, slot: SlotKind) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            slot,
            ..ContentItem::default()
        }
    }

    #[test]
    fn test_template_roundtrip() {
        let raw = json!({
            "id": "tmpl_progress",
            "name": "Progress Note",
            "version": "1.2.0",
            "layout": [{
                "id": "header",
                "type": "header",
                "props": {"title": "Visit Note"},
                "content": [{
                    "id": "patient-name",
                    "slot": "lookup",
                    "lookup": "patient.name",
                    "targetPath": "header.patientName"
                }]
            }],
            "prompt": {"system": "You are a scribe.", "main": "Write the note."}
        });
        let template: NoteTemplate = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(template.id, "tmpl_progress");
        assert_eq!(template.layout[0].kind, ComponentKind::Header);
        assert_eq!(template.layout[0].content[0].slot, SlotKind::Lookup);
        assert_eq!(
            template.layout[0].content[0].target_path.as_deref(),
            Some("header.patientName")
        );
        let back = serde_json::to_value(&template).unwrap();
        assert_eq!(back["layout"][0]["content"][0]["targetPath"], "header.patientName");
    }

    #[test]
    fn test_unknown_component_kind() {
        let c: Component =
            serde_json::from_value(json!({"id": "x", "type": "timeline"})).unwrap();
        assert_eq!(c.kind, ComponentKind::Other);
    }

    #[test]
    fn test_constraints_camel_and_x_names() {
        let c: Constraints = serde_json::from_value(json!({
            "required": true,
            "minLength": 2,
            "x-maxWords": 50
        }))
        .unwrap();
        assert!(c.required);
        assert_eq!(c.min_length, Some(2));
        assert_eq!(c.max_words, Some(50));
        assert!(!c.is_empty());
        assert!(Constraints::default().is_empty());
    }

    #[test_case("transcript:visit_123#t=40-55", Some(Locator::Time { start: 40, end: 55 }))]
    #[test_case("chart:doc9#p=3", Some(Locator::Page(3)))]
    #[test_case("chart:doc9", None)]
    fn test_verbatim_ref_parse(input: &str, locator: Option<Locator>) {
        let r = VerbatimRef::parse(input).unwrap();
        assert_eq!(r.locator, locator);
        assert_eq!(r.to_string(), input);
    }

    #[test_case("noseparator"; "missing colon")]
    #[test_case(":id"; "empty source")]
    #[test_case("src:"; "empty id")]
    #[test_case("src:id#t=5"; "time without range")]
    #[test_case("src:id#t=9-5"; "inverted range")]
    #[test_case("src:id#p=0"; "zero page")]
    #[test_case("src:id#q=1"; "unknown locator")]
    fn test_verbatim_ref_rejects(input: &str) {
        assert!(VerbatimRef::parse(input).is_err());
    }

    #[test]
    fn test_for_each_item_recurses_lists_and_tables() {
        let mut row = item("row", SlotKind::Static);
        row.table_map = Some(TableMap::Columns(vec![
            item("col-a", SlotKind::Lookup),
            item("col-b", SlotKind::Ai),
        ]));
        let mut list = item("list", SlotKind::Static);
        list.list_items = vec![item("li-1", SlotKind::Ai), item("li-2", SlotKind::Computed)];

        let template = NoteTemplate {
            id: "t".to_string(),
            name: "t".to_string(),
            version: "1.0.0".to_string(),
            layout: vec![Component {
                id: "c".to_string(),
                kind: ComponentKind::Section,
                props: None,
                content: vec![row, list],
                children: vec![Component {
                    id: "child".to_string(),
                    kind: ComponentKind::Group,
                    props: None,
                    content: vec![item("nested-ai", SlotKind::Ai)],
                    children: vec![],
                }],
            }],
            style: None,
            prompt: None,
        };

        let mut seen = Vec::new();
        template.for_each_item(&mut |_, i| seen.push(i.id.clone()));
        assert_eq!(
            seen,
            vec!["row", "col-a", "col-b", "list", "li-1", "li-2", "nested-ai"]
        );
        assert_eq!(template.ai_item_count(), 3);
    }

    #[test]
    fn test_table_map_named_is_deterministic() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), item("ib", SlotKind::Static));
        map.insert("a".to_string(), item("ia", SlotKind::Static));
        let tm = TableMap::Named(map);
        let ids: Vec<&str> = tm.items().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["ia", "ib"]);
    }
}
