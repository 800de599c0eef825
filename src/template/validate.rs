//! Template shape validation and lint.
//!
//! Shape violations (missing slot fields, unparseable paths, duplicate ids)
//! are fatal at the template-validation stage; softer findings come back as
//! warnings for the template-lint guard to weigh.

use std::collections::HashSet;

use regex::Regex;

use super::{ComponentKind, ContentItem, NoteTemplate, SlotKind, VerbatimRef};
use crate::diag::{Warning, WarningCode};
use crate::error::TemplateError;
use crate::path::SlotPath;

const SEMVER_PATTERN: &str =
    r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$";

/// Validates a template before derivation.
///
/// Returns lint warnings on success.
///
/// # Errors
///
/// Returns the first fatal [`TemplateError`]: empty id, non-semver version,
/// duplicate component or item ids, or a content item whose slot-specific
/// fields are missing or unparseable.
pub fn validate_template(template: &NoteTemplate) -> Result<Vec<Warning>, TemplateError> {
    if template.id.is_empty() {
        return Err(TemplateError::EmptyId);
    }
    if !is_semver(&template.version) {
        return Err(TemplateError::InvalidVersion {
            version: template.version.clone(),
        });
    }

    let mut warnings = Vec::new();
    check_component_ids(template)?;
    check_items(template, &mut warnings)?;
    lint_components(template, &mut warnings);

    if template
        .prompt
        .as_ref()
        .is_none_or(|p| p.system.is_none() && p.main.is_none())
    {
        warnings.push(Warning::warning(
            WarningCode::TemplateLint,
            "template has no prompt; baseline instructions will be used",
        ));
    }

    Ok(warnings)
}

fn is_semver(version: &str) -> bool {
    Regex::new(SEMVER_PATTERN).is_ok_and(|re| re.is_match(version))
}

fn check_component_ids(template: &NoteTemplate) -> Result<(), TemplateError> {
    fn walk<'a>(
        components: &'a [super::Component],
        seen: &mut HashSet<&'a str>,
    ) -> Result<(), TemplateError> {
        for component in components {
            if !seen.insert(component.id.as_str()) {
                return Err(TemplateError::DuplicateComponentId {
                    id: component.id.clone(),
                });
            }
            walk(&component.children, seen)?;
        }
        Ok(())
    }
    let mut seen = HashSet::new();
    walk(&template.layout, &mut seen)
}

fn check_items(template: &NoteTemplate, warnings: &mut Vec<Warning>) -> Result<(), TemplateError> {
    let mut result = Ok(());
    let mut item_ids: HashSet<String> = HashSet::new();
    template.for_each_item(&mut |component, item| {
        if result.is_err() {
            return;
        }
        if !item_ids.insert(item.id.clone()) {
            result = Err(TemplateError::DuplicateItemId {
                id: item.id.clone(),
            });
            return;
        }
        result = check_item(item, warnings);
        if let Err(TemplateError::MissingField { .. } | TemplateError::InvalidPath { .. }) = &result
        {
            // Attribute the component in the lint trail before failing.
            warnings.push(
                Warning::error(WarningCode::TemplateLint, "invalid content item")
                    .with_component(component.id.clone())
                    .with_slot(item.id.clone()),
            );
        }
    });
    result
}

fn check_item(item: &ContentItem, warnings: &mut Vec<Warning>) -> Result<(), TemplateError> {
    match item.slot {
        SlotKind::Ai => {
            let path = require(item, item.output_path.as_deref(), "outputPath")?;
            parse_path(item, path)?;
            for dep in &item.ai_deps {
                if SlotPath::parse(dep.strip_prefix("factPack.").unwrap_or(dep)).is_err() {
                    warnings.push(
                        Warning::warning(
                            WarningCode::TemplateLint,
                            format!("unparseable dependency path: {dep}"),
                        )
                        .with_slot(item.id.clone()),
                    );
                }
            }
        }
        SlotKind::Lookup => {
            let lookup = require(item, item.lookup.as_deref(), "lookup")?;
            parse_path(item, lookup)?;
            let target = require(item, item.target_path.as_deref(), "targetPath")?;
            parse_path(item, target)?;
        }
        SlotKind::Static => {
            let target = require(item, item.target_path.as_deref(), "targetPath")?;
            parse_path(item, target)?;
            if item.text.is_none() && item.value.is_none() {
                return Err(TemplateError::MissingField {
                    item: item.id.clone(),
                    field: "text or value".to_string(),
                    slot: item.slot.to_string(),
                });
            }
        }
        SlotKind::Computed => {
            let target = require(item, item.target_path.as_deref(), "targetPath")?;
            parse_path(item, target)?;
            let formula = require(item, item.formula.as_deref(), "formula")?;
            crate::formula::parse(formula).map_err(|e| TemplateError::InvalidFormula {
                item: item.id.clone(),
                message: e.to_string(),
            })?;
        }
        SlotKind::Verbatim => {
            let target = require(item, item.target_path.as_deref(), "targetPath")?;
            parse_path(item, target)?;
            let raw = require(item, item.verbatim_ref.as_deref(), "verbatimRef")?;
            VerbatimRef::parse(raw).map_err(|message| TemplateError::InvalidRef {
                item: item.id.clone(),
                message,
            })?;
        }
    }
    Ok(())
}

fn require<'a>(
    item: &ContentItem,
    value: Option<&'a str>,
    field: &str,
) -> Result<&'a str, TemplateError> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| {
        TemplateError::MissingField {
            item: item.id.clone(),
            field: field.to_string(),
            slot: item.slot.to_string(),
        }
    })
}

fn parse_path(item: &ContentItem, path: &str) -> Result<SlotPath, TemplateError> {
    SlotPath::parse_terminal_wildcard(path).map_err(|source| TemplateError::InvalidPath {
        item: item.id.clone(),
        source,
    })
}

fn lint_components(template: &NoteTemplate, warnings: &mut Vec<Warning>) {
    fn walk(components: &[super::Component], warnings: &mut Vec<Warning>) {
        for component in components {
            if component.kind == ComponentKind::Table
                && component
                    .props
                    .as_ref()
                    .is_none_or(|p| p.columns.is_none())
            {
                warnings.push(
                    Warning::warning(WarningCode::TemplateLint, "table without columns")
                        .with_component(component.id.clone()),
                );
            }
            if component.content.is_empty() && component.children.is_empty() {
                warnings.push(
                    Warning::info(WarningCode::TemplateLint, "empty component")
                        .with_component(component.id.clone()),
                );
            }
            walk(&component.children, warnings);
        }
    }
    walk(&template.layout, warnings);
}
