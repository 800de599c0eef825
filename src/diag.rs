//! Structured pipeline diagnostics.
//!
//! Every stage reports non-fatal findings as [`Warning`] values instead of
//! failing. The orchestrator aggregates them per stage into
//! [`PipelineWarnings`] and applies guard policies to decide whether a stage
//! halts the run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of a pipeline diagnostic.
///
/// Ordered so that guard policies can compare against a threshold:
/// `Info < Warning < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational finding, never actionable on its own.
    Info,
    /// Something is off but the pipeline can proceed.
    Warning,
    /// A real defect; strict guards treat this as fatal.
    Error,
}

/// Machine-readable code identifying the kind of diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    /// A lookup or verbatim source document is absent, or no resolver
    /// matched the slot kind.
    MissingSource,
    /// A computed formula failed to evaluate.
    FormulaError,
    /// A verbatim reference or locator could not be used.
    InvalidRef,
    /// A value could not be written at its target path.
    TypeMismatch,
    /// An expected slot neither produced a value nor a warning.
    UnresolvedSlot,
    /// Template-shape finding from the template lint stage.
    TemplateLint,
    /// Field-guide entry count does not match the `ai` item count.
    Coverage,
    /// A field-guide path does not resolve inside the AI input schema.
    InvalidGuidePath,
    /// A field-guide constraint disagrees with the derived schema node.
    ConstraintMismatch,
    /// A declared dependency path is absent from the sliced context.
    MissingDependency,
    /// An `ai` item declares no dependencies at all.
    MissingAiDeps,
    /// Prompt messages are not ordered `[system, user, ..]`.
    MessageRoles,
    /// The user message lacks the mandatory response-contract sentence.
    MissingContract,
    /// A completed LLM response carried no extractable text.
    MissingOutput,
    /// A soft `x-*` constraint (words/sentences) was violated.
    SoftConstraint,
    /// The payload merger overwrote or coerced a deterministic value.
    MergeConflict,
}

/// A structured non-fatal diagnostic produced by a pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    /// How serious the finding is.
    pub severity: Severity,
    /// Machine-readable code.
    pub code: WarningCode,
    /// Human-readable message.
    pub message: String,
    /// Component that produced the finding, when attributable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    /// Content item that produced the finding, when attributable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<String>,
    /// Dotted path the finding refers to, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Extra structured detail for downstream tooling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Warning {
    /// Creates a warning with the given severity, code, and message.
    #[must_use]
    pub fn new(severity: Severity, code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            component_id: None,
            slot_id: None,
            path: None,
            details: None,
        }
    }

    /// Shorthand for a `Warning`-severity diagnostic.
    #[must_use]
    pub fn warning(code: WarningCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    /// Shorthand for an `Error`-severity diagnostic.
    #[must_use]
    pub fn error(code: WarningCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    /// Shorthand for an `Info`-severity diagnostic.
    #[must_use]
    pub fn info(code: WarningCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, message)
    }

    /// Attaches the originating component id.
    #[must_use]
    pub fn with_component(mut self, id: impl Into<String>) -> Self {
        self.component_id = Some(id.into());
        self
    }

    /// Attaches the originating content-item id.
    #[must_use]
    pub fn with_slot(mut self, id: impl Into<String>) -> Self {
        self.slot_id = Some(id.into());
        self
    }

    /// Attaches the dotted path the finding refers to.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// The stage a diagnostic or failure is attributed to.
///
/// Serialized with the kebab-case labels surfaced in `PipelineError.step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStep {
    /// Template shape and lint checks.
    TemplateValidation,
    /// AIS/NAS/RPS derivation.
    SchemaDerivation,
    /// Deterministic slot resolution.
    Resolution,
    /// Prompt composition lint.
    PromptLint,
    /// The LLM call itself.
    AiGeneration,
    /// Parsing and schema-validating the LLM response.
    AiValidation,
    /// Deep-merging AI output over the deterministic snapshot.
    Merge,
    /// Rendering the merged payload.
    Render,
}

impl PipelineStep {
    /// Returns the kebab-case label used in error reporting.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::TemplateValidation => "template-validation",
            Self::SchemaDerivation => "schema-derivation",
            Self::Resolution => "resolution",
            Self::PromptLint => "prompt-lint",
            Self::AiGeneration => "ai-generation",
            Self::AiValidation => "ai-validation",
            Self::Merge => "merge",
            Self::Render => "render",
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Warnings accumulated across the whole pipeline, grouped by stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineWarnings {
    /// Warnings keyed by the stage that produced them.
    #[serde(flatten)]
    pub stages: BTreeMap<PipelineStep, Vec<Warning>>,
}

impl PipelineWarnings {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends warnings to a stage. Empty batches are dropped.
    pub fn extend(&mut self, step: PipelineStep, warnings: impl IntoIterator<Item = Warning>) {
        let mut batch: Vec<Warning> = warnings.into_iter().collect();
        if !batch.is_empty() {
            self.stages.entry(step).or_default().append(&mut batch);
        }
    }

    /// Returns the warnings recorded for a stage.
    #[must_use]
    pub fn for_step(&self, step: PipelineStep) -> &[Warning] {
        self.stages.get(&step).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` when no stage recorded any warning.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.values().all(Vec::is_empty)
    }

    /// Total number of warnings across all stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.values().map(Vec::len).sum()
    }

    /// Iterates over every warning with its stage.
    pub fn iter(&self) -> impl Iterator<Item = (PipelineStep, &Warning)> {
        self.stages
            .iter()
            .flat_map(|(step, ws)| ws.iter().map(move |w| (*step, w)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn test_warning_builder() {
        let w = Warning::error(WarningCode::MissingSource, "no resolver")
            .with_component("c1")
            .with_slot("s1")
            .with_path("header.name");
        assert_eq!(w.severity, Severity::Error);
        assert_eq!(w.component_id.as_deref(), Some("c1"));
        assert_eq!(w.slot_id.as_deref(), Some("s1"));
        assert_eq!(w.path.as_deref(), Some("header.name"));
    }

    #[test]
    fn test_warning_code_serialization() {
        let json = serde_json::to_string(&WarningCode::MissingSource).unwrap();
        assert_eq!(json, "\"missing_source\"");
        let json = serde_json::to_string(&WarningCode::UnresolvedSlot).unwrap();
        assert_eq!(json, "\"unresolved_slot\"");
    }

    #[test]
    fn test_step_labels() {
        assert_eq!(PipelineStep::TemplateValidation.label(), "template-validation");
        assert_eq!(PipelineStep::AiValidation.label(), "ai-validation");
        assert_eq!(PipelineStep::PromptLint.to_string(), "prompt-lint");
    }

    #[test]
    fn test_pipeline_warnings_grouping() {
        let mut all = PipelineWarnings::new();
        assert!(all.is_empty());

        all.extend(
            PipelineStep::Resolution,
            vec![Warning::warning(WarningCode::MissingSource, "gone")],
        );
        all.extend(PipelineStep::Resolution, vec![]);
        all.extend(
            PipelineStep::Merge,
            vec![Warning::error(WarningCode::MergeConflict, "clash")],
        );

        assert_eq!(all.len(), 2);
        assert_eq!(all.for_step(PipelineStep::Resolution).len(), 1);
        assert_eq!(all.for_step(PipelineStep::Merge).len(), 1);
        assert!(all.for_step(PipelineStep::Render).is_empty());
        assert_eq!(all.iter().count(), 2);
    }
}
