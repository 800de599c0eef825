//! Default HTML renderer and design-token CSS.
//!
//! The pipeline hands the merged render payload to a [`Renderer`]
//! capability. The built-in [`HtmlRenderer`] walks the template layout,
//! pulls leaf values from the payload by path, and emits semantic HTML plus
//! a screen/print stylesheet pair derived from optional design tokens.

use std::fmt::Write;

use serde_json::Value;

use crate::error::RenderError;
use crate::path::{SlotPath, get_by_path};
use crate::template::{Component, ComponentKind, ContentItem, NoteTemplate, SlotKind, TableMap};

/// The rendered document pair.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RenderedDocument {
    /// The document markup.
    pub html: String,
    /// Screen and print stylesheets.
    pub css: CssBundle,
}

/// Screen and print stylesheets.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CssBundle {
    /// Screen stylesheet.
    pub screen: String,
    /// Print stylesheet.
    pub print: String,
}

/// Rendering capability consumed by the pipeline.
pub trait Renderer: Send + Sync {
    /// Renders the merged payload for a template.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] when document assembly fails.
    fn render(
        &self,
        template: &NoteTemplate,
        payload: &Value,
        tokens: Option<&Value>,
    ) -> Result<RenderedDocument, RenderError>;
}

/// The built-in renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

const BASE_CSS: &str = "\
.note { font-family: var(--font-body, Georgia, serif); color: var(--color-ink, #1a1a1a); \
max-width: 52rem; margin: 0 auto; padding: 2rem; }
.note h1, .note h2 { font-family: var(--font-heading, Helvetica, sans-serif); }
.note section { margin-bottom: 1.5rem; }
.note table { border-collapse: collapse; width: 100%; }
.note th, .note td { border: 1px solid var(--color-rule, #d0d0d0); padding: 0.4rem 0.6rem; \
text-align: left; }
.note blockquote { border-left: 3px solid var(--color-accent, #4a6fa5); margin: 0.5rem 0; \
padding-left: 0.75rem; }
.note blockquote cite { display: block; font-size: 0.8em; color: var(--color-muted, #6a6a6a); }
";

const PRINT_CSS: &str = "\
@page { size: letter; margin: 2cm; }
.note { max-width: none; padding: 0; font-size: 11pt; }
.note section { break-inside: avoid; }
";

impl Renderer for HtmlRenderer {
    fn render(
        &self,
        template: &NoteTemplate,
        payload: &Value,
        tokens: Option<&Value>,
    ) -> Result<RenderedDocument, RenderError> {
        let mut html = String::new();
        writeln!(html, "<article class=\"note\" data-template=\"{}\">", escape(&template.id))?;
        for component in &template.layout {
            render_component(&mut html, component, payload)?;
        }
        html.push_str("</article>\n");

        let variables = token_variables(tokens);
        let screen = format!("{variables}{BASE_CSS}");
        let print = format!("{variables}{BASE_CSS}\n@media print {{\n{PRINT_CSS}}}\n");
        Ok(RenderedDocument {
            html,
            css: CssBundle { screen, print },
        })
    }
}

fn render_component(
    out: &mut String,
    component: &Component,
    payload: &Value,
) -> Result<(), RenderError> {
    let title = component
        .props
        .as_ref()
        .and_then(|p| p.title.as_deref());
    match component.kind {
        ComponentKind::Header => {
            writeln!(out, "<header id=\"{}\">", escape(&component.id))?;
            if let Some(title) = title {
                writeln!(out, "<h1>{}</h1>", escape(title))?;
            }
            render_items(out, &component.content, payload)?;
            out.push_str("</header>\n");
        }
        ComponentKind::Section | ComponentKind::Group | ComponentKind::Other => {
            writeln!(out, "<section id=\"{}\">", escape(&component.id))?;
            if let Some(title) = title {
                writeln!(out, "<h2>{}</h2>", escape(title))?;
            }
            render_items(out, &component.content, payload)?;
            out.push_str("</section>\n");
        }
        ComponentKind::Table => render_table(out, component, payload)?,
        ComponentKind::List => {
            writeln!(out, "<section id=\"{}\">", escape(&component.id))?;
            if let Some(title) = title {
                writeln!(out, "<h2>{}</h2>", escape(title))?;
            }
            out.push_str("<ul>\n");
            for item in &component.content {
                if item.list_items.is_empty() {
                    writeln!(out, "<li>{}</li>", item_value(item, payload))?;
                } else {
                    for nested in &item.list_items {
                        writeln!(out, "<li>{}</li>", item_value(nested, payload))?;
                    }
                }
            }
            out.push_str("</ul>\n</section>\n");
        }
    }
    for child in &component.children {
        render_component(out, child, payload)?;
    }
    Ok(())
}

fn render_table(
    out: &mut String,
    component: &Component,
    payload: &Value,
) -> Result<(), RenderError> {
    writeln!(out, "<table id=\"{}\">", escape(&component.id))?;
    let props = component.props.as_ref();
    if let Some(columns) = props.and_then(|p| p.columns.as_ref()) {
        let widths = props.and_then(|p| p.col_widths.as_ref());
        if let Some(widths) = widths {
            out.push_str("<colgroup>");
            for width in widths {
                write!(out, "<col style=\"width:{}\">", escape(width))?;
            }
            out.push_str("</colgroup>\n");
        }
        out.push_str("<thead><tr>");
        for column in columns {
            write!(out, "<th>{}</th>", escape(column))?;
        }
        out.push_str("</tr></thead>\n");
    }
    out.push_str("<tbody>\n");
    for item in &component.content {
        if let Some(table_map) = &item.table_map {
            out.push_str("<tr>");
            let cells: Vec<&ContentItem> = match table_map {
                TableMap::Columns(items) => items.iter().collect(),
                TableMap::Named(map) => map.values().collect(),
            };
            for cell in cells {
                write!(out, "<td>{}</td>", item_value(cell, payload))?;
            }
            out.push_str("</tr>\n");
        }
    }
    out.push_str("</tbody>\n</table>\n");
    Ok(())
}

fn render_items(
    out: &mut String,
    items: &[ContentItem],
    payload: &Value,
) -> Result<(), RenderError> {
    for item in items {
        let rendered = item_value(item, payload);
        if rendered.is_empty() {
            continue;
        }
        writeln!(out, "<p data-slot=\"{}\">{rendered}</p>", escape(&item.id))?;
    }
    Ok(())
}

/// Renders one item's payload value. Verbatim values render as quotes with
/// their provenance ref; missing values render empty.
fn item_value(item: &ContentItem, payload: &Value) -> String {
    let path = match item.slot {
        SlotKind::Ai => item.output_path.as_deref(),
        _ => item.target_path.as_deref(),
    };
    let value = path
        .and_then(|p| SlotPath::parse(p).ok())
        .and_then(|p| get_by_path(payload, &p));
    let Some(value) = value else {
        return String::new();
    };

    if item.slot == SlotKind::Verbatim {
        let text = value.get("text").and_then(Value::as_str).unwrap_or("");
        let reference = value.get("ref").and_then(Value::as_str).unwrap_or("");
        return format!(
            "<blockquote>{}<cite>{}</cite></blockquote>",
            escape(text),
            escape(reference)
        );
    }
    match value {
        Value::String(s) => escape(s),
        Value::Null => String::new(),
        other => escape(&other.to_string()),
    }
}

fn token_variables(tokens: Option<&Value>) -> String {
    let Some(map) = tokens.and_then(Value::as_object) else {
        return String::new();
    };
    let mut css = String::from(":root {\n");
    // Token groups flatten to --<group>-<name> custom properties.
    for (group, values) in map {
        if let Some(values) = values.as_object() {
            for (name, value) in values {
                if let Some(value) = value.as_str() {
                    let _ = writeln!(css, "  --{group}-{name}: {value};");
                }
            }
        }
    }
    css.push_str("}\n");
    css
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
