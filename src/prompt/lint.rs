//! Prompt lint: five rules checked on every composed bundle.
//!
//! 1. Coverage — one field-guide entry per `ai` item.
//! 2. Path validity — every entry path resolves inside AIS.
//! 3. Constraint harmony — entry `pattern`/`enum` agree with the AIS node.
//! 4. Dependencies resolvable — every dependency exists in its context
//!    slice; an entry with no dependencies at all is an error.
//! 5. Message roles — `[system, user]` ordering, and the user message
//!    carries the response contract sentence.

use serde_json::Value;

use super::compose::{PromptBundle, RESPONSE_CONTRACT, Role};
use super::guide::{DepScope, FieldGuideEntry};
use crate::diag::{Warning, WarningCode};
use crate::path::{SlotPath, get_by_path};
use crate::schema::{NodeKind, SchemaNode};
use crate::template::NoteTemplate;

/// Classified findings of the lint pass.
#[derive(Debug, Clone, Default)]
pub struct LintReport {
    /// Blocking findings.
    pub errors: Vec<Warning>,
    /// Advisory findings.
    pub warnings: Vec<Warning>,
}

impl LintReport {
    /// Returns `true` when any blocking finding was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// All findings, errors first.
    #[must_use]
    pub fn all(&self) -> Vec<Warning> {
        let mut all = self.errors.clone();
        all.extend(self.warnings.iter().cloned());
        all
    }
}

/// Runs the five lint rules over a composed bundle.
#[must_use]
pub fn lint_bundle(
    bundle: &PromptBundle,
    template: &NoteTemplate,
    ais: &SchemaNode,
) -> LintReport {
    let mut report = LintReport::default();
    check_coverage(bundle, template, &mut report);
    check_paths_and_constraints(bundle, ais, &mut report);
    check_dependencies(bundle, &mut report);
    check_messages(bundle, &mut report);
    report
}

fn check_coverage(bundle: &PromptBundle, template: &NoteTemplate, report: &mut LintReport) {
    let expected = template.ai_item_count();
    let actual = bundle.field_guide.len();
    if expected != actual {
        report.errors.push(Warning::error(
            WarningCode::Coverage,
            format!("field guide covers {actual} of {expected} ai items"),
        ));
    }
}

fn check_paths_and_constraints(bundle: &PromptBundle, ais: &SchemaNode, report: &mut LintReport) {
    for entry in &bundle.field_guide {
        let Ok(path) = SlotPath::parse(&entry.path) else {
            report.errors.push(
                Warning::error(WarningCode::InvalidGuidePath, "unparseable field-guide path")
                    .with_path(entry.path.clone()),
            );
            continue;
        };
        let Some(node) = ais.node_at(&path) else {
            report.errors.push(
                Warning::error(
                    WarningCode::InvalidGuidePath,
                    "field-guide path has no node in the AI schema",
                )
                .with_path(entry.path.clone()),
            );
            continue;
        };
        check_harmony(entry, node, report);
    }
}

fn check_harmony(entry: &FieldGuideEntry, node: &SchemaNode, report: &mut LintReport) {
    let Some(constraints) = &entry.constraints else {
        return;
    };
    let NodeKind::Leaf {
        constraints: schema_constraints,
        ..
    } = &node.kind
    else {
        return;
    };
    if constraints.pattern != schema_constraints.pattern {
        report.warnings.push(
            Warning::warning(
                WarningCode::ConstraintMismatch,
                "field-guide pattern disagrees with the derived schema",
            )
            .with_path(entry.path.clone()),
        );
    }
    if constraints.enum_values != schema_constraints.enum_values {
        report.warnings.push(
            Warning::warning(
                WarningCode::ConstraintMismatch,
                "field-guide enum disagrees with the derived schema",
            )
            .with_path(entry.path.clone()),
        );
    }
}

fn check_dependencies(bundle: &PromptBundle, report: &mut LintReport) {
    for entry in &bundle.field_guide {
        if entry.dependencies.is_empty() {
            report.errors.push(
                Warning::error(
                    WarningCode::MissingAiDeps,
                    "ai item declares no dependencies",
                )
                .with_path(entry.path.clone()),
            );
            continue;
        }
        for dependency in &entry.dependencies {
            let (context, scope_name): (Option<&Value>, &str) = match dependency.scope {
                DepScope::Nas => (Some(&bundle.context.nas_slices), "nas"),
                DepScope::FactPack => (bundle.context.fact_pack.as_ref(), "factPack"),
            };
            let present = context.is_some_and(|ctx| {
                SlotPath::parse(&dependency.path)
                    .ok()
                    .and_then(|p| get_by_path(ctx, &p))
                    .is_some()
            });
            if !present {
                report.warnings.push(
                    Warning::warning(
                        WarningCode::MissingDependency,
                        format!(
                            "dependency {} is not present in the {scope_name} context",
                            dependency.path
                        ),
                    )
                    .with_path(entry.path.clone()),
                );
            }
        }
    }
}

fn check_messages(bundle: &PromptBundle, report: &mut LintReport) {
    let roles_ok = matches!(
        (
            bundle.messages.first().map(|m| m.role),
            bundle.messages.get(1).map(|m| m.role),
        ),
        (Some(Role::System), Some(Role::User))
    );
    if !roles_ok {
        report.errors.push(Warning::error(
            WarningCode::MessageRoles,
            "prompt messages must be ordered [system, user]",
        ));
    }
    let has_contract = bundle
        .messages
        .iter()
        .any(|m| m.role == Role::User && m.content.contains(RESPONSE_CONTRACT));
    if !has_contract {
        report.errors.push(Warning::error(
            WarningCode::MissingContract,
            "user message lacks the response contract sentence",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::compose::{Message, PromptContext};
    use crate::prompt::{build_field_guide, compose_prompt};
    use crate::schema::derive_ai_schema;
    use serde_json::json;

    fn template() -> NoteTemplate {
        serde_json::from_value(json!({
            "id": "t", "name": "t", "version": "1.0.0",
            "layout": [{
                "id": "sec", "type": "section",
                "content": [
                    {"id": "delta", "slot": "computed", "formula": "2 - 1",
                     "targetPath": "a.delta"},
                    {"id": "summary", "slot": "ai", "outputPath": "a.summary",
                     "aiDeps": ["a.delta"]}
                ]
            }]
        }))
        .unwrap()
    }

    fn lint_of(nas: Value) -> LintReport {
        let t = template();
        let ais = derive_ai_schema(&t).unwrap();
        let guide = build_field_guide(&t);
        let (_, lint) = compose_prompt(&t, &ais, guide, &nas, None, "b");
        lint
    }

    #[test]
    fn test_clean_bundle_passes() {
        let lint = lint_of(json!({"a": {"delta": "+1"}}));
        assert!(!lint.has_errors());
        assert!(lint.warnings.is_empty());
    }

    #[test]
    fn test_missing_dependency_is_warning() {
        let lint = lint_of(json!({}));
        assert!(!lint.has_errors());
        assert_eq!(lint.warnings.len(), 1);
        assert_eq!(lint.warnings[0].code, WarningCode::MissingDependency);
    }

    #[test]
    fn test_missing_ai_deps_is_error() {
        let mut t = template();
        t.layout[0].content[1].ai_deps.clear();
        let ais = derive_ai_schema(&t).unwrap();
        let guide = build_field_guide(&t);
        let (_, lint) = compose_prompt(&t, &ais, guide, &json!({}), None, "b");
        assert!(lint
            .errors
            .iter()
            .any(|w| w.code == WarningCode::MissingAiDeps));
    }

    #[test]
    fn test_coverage_mismatch_is_error() {
        let t = template();
        let ais = derive_ai_schema(&t).unwrap();
        let (_, lint) = compose_prompt(&t, &ais, vec![], &json!({}), None, "b");
        assert!(lint.errors.iter().any(|w| w.code == WarningCode::Coverage));
    }

    #[test]
    fn test_unknown_guide_path_is_error() {
        let t = template();
        let ais = derive_ai_schema(&t).unwrap();
        let mut guide = build_field_guide(&t);
        guide[0].path = "not.in.schema".to_string();
        let (_, lint) = compose_prompt(&t, &ais, guide, &json!({}), None, "b");
        assert!(lint
            .errors
            .iter()
            .any(|w| w.code == WarningCode::InvalidGuidePath));
    }

    #[test]
    fn test_constraint_mismatch_is_warning() {
        let t = template();
        let ais = derive_ai_schema(&t).unwrap();
        let mut guide = build_field_guide(&t);
        guide[0].constraints = Some(crate::template::Constraints {
            pattern: Some("^x".to_string()),
            ..Default::default()
        });
        let (_, lint) = compose_prompt(&t, &ais, guide, &json!({"a": {"delta": "1"}}), None, "b");
        assert!(lint
            .warnings
            .iter()
            .any(|w| w.code == WarningCode::ConstraintMismatch));
    }

    #[test]
    fn test_message_role_rules() {
        let t = template();
        let ais = derive_ai_schema(&t).unwrap();
        let guide = build_field_guide(&t);
        let (mut bundle, _) = compose_prompt(&t, &ais, guide, &json!({}), None, "b");
        bundle.messages.swap(0, 1);
        let lint = lint_bundle(&bundle, &t, &ais);
        assert!(lint.errors.iter().any(|w| w.code == WarningCode::MessageRoles));

        bundle.messages = vec![
            Message {
                role: Role::System,
                content: "sys".to_string(),
            },
            Message {
                role: Role::User,
                content: "no contract here".to_string(),
            },
        ];
        bundle.context = PromptContext {
            nas_slices: json!({}),
            fact_pack: None,
        };
        let lint = lint_bundle(&bundle, &t, &ais);
        assert!(lint
            .errors
            .iter()
            .any(|w| w.code == WarningCode::MissingContract));
    }
}
