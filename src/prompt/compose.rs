//! Prompt bundle composition.
//!
//! Produces the two-message prompt: a system message carrying the
//! template's instructions plus the invariant rules, and a user message
//! carrying the context slices, the optional fact pack, the enumerated
//! field guide, and the mandatory response contract sentence. Given
//! identical inputs and the same bundle id, the output is byte-identical.

use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::{slice_fact_pack, slice_nas};
use super::guide::{DepScope, FieldGuideEntry};
use super::lint::{LintReport, lint_bundle};
use crate::schema::SchemaNode;
use crate::template::NoteTemplate;

/// The response contract sentence. Mandatory in the user message and
/// enforced by the lint pass.
pub const RESPONSE_CONTRACT: &str =
    "Return a single JSON object that conforms to the provided JSON schema.";

/// Baseline system instructions used when the template provides none.
const DEFAULT_SYSTEM: &str = "You are a clinical documentation assistant. You complete the \
                              AI-authored fields of a structured note from the context you are \
                              given.";

/// Baseline main instruction used when the template provides none.
const DEFAULT_MAIN: &str =
    "Fill every field listed in the field guide using only the supplied context.";

/// Invariant instructions appended to every system message.
const INVARIANT_INSTRUCTIONS: &str = "Respond with valid JSON only; no commentary, no markdown \
                                      fences. The field guide is authoritative: produce exactly \
                                      the fields it lists, at the paths it lists them.";

/// Message role in the outgoing prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User payload.
    User,
}

/// One prompt message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role.
    pub role: Role,
    /// Message body.
    pub content: String,
}

/// Context slices embedded in the bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptContext {
    /// Snapshot projection covering the NAS-scoped dependencies.
    pub nas_slices: Value,
    /// Fact-pack projection, when any dependency references it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fact_pack: Option<Value>,
}

/// Everything the LLM adapter needs for one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptBundle {
    /// Bundle id (caller-provided seed keeps composition deterministic).
    pub id: String,
    /// Template id.
    pub template_id: String,
    /// Template version.
    pub template_version: String,
    /// Ordered messages: `[system, user]`.
    pub messages: Vec<Message>,
    /// The AI input schema used as the strict response format.
    pub json_schema: Value,
    /// The enumerated field guide.
    pub field_guide: Vec<FieldGuideEntry>,
    /// Context slices the user message embeds.
    pub context: PromptContext,
}

/// Composes the prompt bundle and lints it.
#[must_use]
pub fn compose_prompt(
    template: &NoteTemplate,
    ais: &SchemaNode,
    field_guide: Vec<FieldGuideEntry>,
    nas_data: &Value,
    fact_pack: Option<&Value>,
    bundle_id: impl Into<String>,
) -> (PromptBundle, LintReport) {
    let nas_slices = slice_nas(nas_data, &field_guide);
    let fact_pack_slice =
        fact_pack.and_then(|pack| slice_fact_pack(pack, &field_guide));

    let context = PromptContext {
        nas_slices,
        fact_pack: fact_pack_slice,
    };
    let messages = vec![
        Message {
            role: Role::System,
            content: system_message(template),
        },
        Message {
            role: Role::User,
            content: user_message(template, &field_guide, &context),
        },
    ];

    let bundle = PromptBundle {
        id: bundle_id.into(),
        template_id: template.id.clone(),
        template_version: template.version.clone(),
        messages,
        json_schema: ais.to_json_schema(),
        field_guide,
        context,
    };
    let lint = lint_bundle(&bundle, template, ais);
    (bundle, lint)
}

fn system_message(template: &NoteTemplate) -> String {
    let prompt = template.prompt.as_ref();
    let mut body = prompt
        .and_then(|p| p.system.as_deref())
        .unwrap_or(DEFAULT_SYSTEM)
        .to_string();
    body.push_str("\n\n");
    body.push_str(INVARIANT_INSTRUCTIONS);

    if let Some(rules) = prompt.map(|p| &p.rules).filter(|r| !r.is_empty()) {
        body.push_str("\n\n## Rules\n");
        for rule in rules {
            let _ = writeln!(body, "- {rule}");
        }
    }
    body
}

fn user_message(
    template: &NoteTemplate,
    field_guide: &[FieldGuideEntry],
    context: &PromptContext,
) -> String {
    let main = template
        .prompt
        .as_ref()
        .and_then(|p| p.main.as_deref())
        .unwrap_or(DEFAULT_MAIN);

    let mut body = String::new();
    let _ = writeln!(body, "{main}\n");

    let _ = writeln!(body, "## Context\n```json\n{}\n```\n", pretty(&context.nas_slices));
    if let Some(fact_pack) = &context.fact_pack {
        let _ = writeln!(body, "## Fact pack\n```json\n{}\n```\n", pretty(fact_pack));
    }

    body.push_str("## Field guide\n");
    for (i, entry) in field_guide.iter().enumerate() {
        let _ = writeln!(body, "{}. `{}`", i + 1, entry.path);
        for line in &entry.guidance {
            let _ = writeln!(body, "   - {line}");
        }
        if let Some(constraints) = entry.constraints.as_ref().filter(|c| !c.is_empty()) {
            let rendered =
                serde_json::to_string(constraints).unwrap_or_else(|_| "{}".to_string());
            let _ = writeln!(body, "   - constraints: {rendered}");
        }
        if !entry.dependencies.is_empty() {
            let deps: Vec<String> = entry
                .dependencies
                .iter()
                .map(|d| match d.scope {
                    DepScope::Nas => d.path.clone(),
                    DepScope::FactPack => format!("factPack.{}", d.path),
                })
                .collect();
            let _ = writeln!(body, "   - depends on: {}", deps.join(", "));
        }
    }

    let _ = write!(body, "\n{RESPONSE_CONTRACT}");
    body
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::build_field_guide;
    use crate::schema::derive_ai_schema;
    use serde_json::json;

    fn template() -> NoteTemplate {
        serde_json::from_value(json!({
            "id": "tmpl", "name": "Note", "version": "2.0.0",
            "layout": [{
                "id": "sec", "type": "section",
                "content": [
                    {"id": "delta", "slot": "computed", "formula": "1 + 1",
                     "targetPath": "assessment.delta"},
                    {"id": "summary", "slot": "ai", "outputPath": "assessment.summary",
                     "aiDeps": ["assessment.delta"],
                     "guidance": ["Mention the score change."]}
                ]
            }],
            "prompt": {"system": "You write notes.", "main": "Write it.",
                        "rules": ["No speculation."]}
        }))
        .unwrap()
    }

    fn compose() -> (PromptBundle, LintReport) {
        let t = template();
        let ais = derive_ai_schema(&t).unwrap();
        let guide = build_field_guide(&t);
        let nas = json!({"assessment": {"delta": "-6"}});
        compose_prompt(&t, &ais, guide, &nas, None, "bundle-1")
    }

    #[test]
    fn test_two_messages_in_order() {
        let (bundle, lint) = compose();
        assert!(!lint.has_errors(), "lint errors: {:?}", lint.errors);
        assert_eq!(bundle.messages.len(), 2);
        assert_eq!(bundle.messages[0].role, Role::System);
        assert_eq!(bundle.messages[1].role, Role::User);
    }

    #[test]
    fn test_system_message_contents() {
        let (bundle, _) = compose();
        let system = &bundle.messages[0].content;
        assert!(system.contains("You write notes."));
        assert!(system.contains("field guide is authoritative"));
        assert!(system.contains("- No speculation."));
    }

    #[test]
    fn test_user_message_contents() {
        let (bundle, _) = compose();
        let user = &bundle.messages[1].content;
        assert!(user.contains("Write it."));
        assert!(user.contains("\"delta\": \"-6\""));
        assert!(user.contains("1. `assessment.summary`"));
        assert!(user.contains("Mention the score change."));
        assert!(user.contains("depends on: assessment.delta"));
        assert!(user.ends_with(RESPONSE_CONTRACT));
    }

    #[test]
    fn test_bundle_metadata() {
        let (bundle, _) = compose();
        assert_eq!(bundle.id, "bundle-1");
        assert_eq!(bundle.template_id, "tmpl");
        assert_eq!(bundle.template_version, "2.0.0");
        assert_eq!(bundle.json_schema["type"], "object");
    }

    #[test]
    fn test_deterministic_given_same_seed() {
        let (a, _) = compose();
        let (b, _) = compose();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_fact_pack_section_present_when_referenced() {
        let mut t = template();
        t.layout[0].content[1].ai_deps.push("factPack.vitals".to_string());
        let ais = derive_ai_schema(&t).unwrap();
        let guide = build_field_guide(&t);
        let nas = json!({"assessment": {"delta": "-6"}});
        let pack = json!({"vitals": {"bp": "120/80"}});
        let (bundle, _) = compose_prompt(&t, &ais, guide, &nas, Some(&pack), "b");
        assert!(bundle.messages[1].content.contains("## Fact pack"));
        assert_eq!(
            bundle.context.fact_pack,
            Some(json!({"vitals": {"bp": "120/80"}}))
        );
    }

    #[test]
    fn test_defaults_without_template_prompt() {
        let mut t = template();
        t.prompt = None;
        let ais = derive_ai_schema(&t).unwrap();
        let guide = build_field_guide(&t);
        let (bundle, _) = compose_prompt(&t, &ais, guide, &json!({}), None, "b");
        assert!(bundle.messages[0].content.contains("clinical documentation assistant"));
        assert!(bundle.messages[1].content.contains("field guide"));
    }
}
