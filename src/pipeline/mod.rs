//! Pipeline orchestration types.
//!
//! The orchestrator sequences the whole compile: template validation,
//! schema derivation, deterministic resolution, prompt composition, LLM
//! generation (or mock generation), payload merge, and rendering. Guards
//! decide per stage whether accumulated warnings halt the run.

mod orchestrator;

pub use orchestrator::Pipeline;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diag::{PipelineWarnings, Severity, Warning};
use crate::llm::{GenerationOptions, Usage};
use crate::render::CssBundle;
use crate::template::NoteTemplate;

/// Everything one pipeline run consumes.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    /// The note template.
    pub template: NoteTemplate,
    /// The raw source record.
    pub source_data: Value,
    /// Optional design tokens for the CSS compiler.
    pub tokens: Option<Value>,
    /// Optional side fact pack for prompt composition.
    pub fact_pack: Option<Value>,
    /// Run options.
    pub options: PipelineOptions,
}

impl PipelineInput {
    /// Creates an input with default options and no tokens or fact pack.
    #[must_use]
    pub fn new(template: NoteTemplate, source_data: Value) -> Self {
        Self {
            template,
            source_data,
            tokens: None,
            fact_pack: None,
            options: PipelineOptions::default(),
        }
    }
}

/// Per-run options.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Validate intermediate payloads (mock output included).
    pub validate_steps: bool,
    /// Attach the snapshot and merged payload to the output.
    pub provenance: bool,
    /// Explicit API key for the `openai`-feature client.
    pub openai_key: Option<String>,
    /// LLM generation options.
    pub generation: GenerationOptions,
    /// Verbose lifecycle logging.
    pub verbose: bool,
    /// Per-stage guard policies.
    pub guards: Guards,
    /// Caller-supplied request id; generated when absent.
    pub request_id: Option<String>,
    /// Attach the prompt bundle id to the output.
    pub capture_prompt_metadata: bool,
    /// Skip the LLM and fabricate a schema-conformant payload.
    pub mock_generation: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            validate_steps: true,
            provenance: false,
            openai_key: None,
            generation: GenerationOptions::default(),
            verbose: false,
            guards: Guards::default(),
            request_id: None,
            capture_prompt_metadata: true,
            mock_generation: false,
        }
    }
}

/// Guard policy for one warning-producing stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardConfig {
    /// Halt when the stage produced any warning at all.
    #[serde(default)]
    pub fail_on_warning: bool,
    /// Halt when any warning reaches this severity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_on_severity: Option<Severity>,
}

impl GuardConfig {
    /// A guard that halts on any warning.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            fail_on_warning: true,
            fail_on_severity: None,
        }
    }

    /// A guard that halts at or above a severity.
    #[must_use]
    pub const fn at_severity(severity: Severity) -> Self {
        Self {
            fail_on_warning: false,
            fail_on_severity: Some(severity),
        }
    }

    /// Returns `true` when the stage's warnings trip this guard.
    #[must_use]
    pub fn triggers(&self, warnings: &[Warning]) -> bool {
        if self.fail_on_warning && !warnings.is_empty() {
            return true;
        }
        self.fail_on_severity
            .is_some_and(|threshold| warnings.iter().any(|w| w.severity >= threshold))
    }
}

/// Guard policies per warning-producing stage.
///
/// The default runs non-strict except for prompt lint, where blocking
/// findings (coverage gaps, broken paths) would only waste an LLM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Guards {
    /// Template lint stage.
    pub template_lint: Option<GuardConfig>,
    /// Deterministic resolution stage.
    pub resolution: Option<GuardConfig>,
    /// Prompt lint stage.
    pub prompt_lint: Option<GuardConfig>,
    /// AI output validation stage.
    pub validation: Option<GuardConfig>,
    /// Payload merge stage.
    pub merge: Option<GuardConfig>,
}

impl Default for Guards {
    fn default() -> Self {
        Self {
            template_lint: None,
            resolution: None,
            prompt_lint: Some(GuardConfig::at_severity(Severity::Error)),
            validation: None,
            merge: None,
        }
    }
}

impl Guards {
    /// Guards that pass every warning through unexamined.
    #[must_use]
    pub const fn permissive() -> Self {
        Self {
            template_lint: None,
            resolution: None,
            prompt_lint: None,
            validation: None,
            merge: None,
        }
    }

    /// Guards that halt every stage on any warning.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            template_lint: Some(GuardConfig::strict()),
            resolution: Some(GuardConfig::strict()),
            prompt_lint: Some(GuardConfig::strict()),
            validation: Some(GuardConfig::strict()),
            merge: Some(GuardConfig::strict()),
        }
    }
}

/// Orchestrator state machine. Every state can transition to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    /// Initial state.
    Start,
    /// Template validated and linted.
    TemplateValidated,
    /// AIS, NAS, and RPS derived.
    SchemasDerived,
    /// Deterministic snapshot assembled.
    NasResolved,
    /// Prompt bundle composed and linted.
    PromptComposed,
    /// Generation request issued.
    AiRequested,
    /// Generation response validated.
    AiResponded,
    /// AI payload merged over the snapshot.
    Merged,
    /// Document rendered.
    Rendered,
    /// Terminal success.
    Complete,
    /// Terminal failure.
    Failed,
}

/// One entry of the per-stage timing log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    /// Stage label.
    pub stage: String,
    /// Wall-clock duration of the stage.
    pub elapsed: Duration,
}

/// The three derived schemas, as JSON Schema values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSet {
    /// AI input schema.
    pub ais: Value,
    /// Non-AI snapshot schema.
    pub nas: Value,
    /// Render payload schema.
    pub rps: Value,
}

/// Everything one pipeline run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    /// The rendered document markup.
    pub html: String,
    /// Screen and print stylesheets.
    pub css: CssBundle,
    /// The validated AI payload.
    pub ai_output: Value,
    /// The derived schemas.
    pub schemas: SchemaSet,
    /// Token accounting (zero for mock runs).
    pub usage: Usage,
    /// Model that served the request.
    pub model: String,
    /// Provider response id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    /// Prompt bundle id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
    /// Set when mock generation replaced the LLM call.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ai_response_mocked: bool,
    /// Stage-grouped warnings; omitted when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<PipelineWarnings>,
    /// The merged render payload (with `provenance`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// The deterministic snapshot (with `provenance`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nas_snapshot: Option<Value>,
    /// Request id of the run.
    pub request_id: String,
    /// Per-stage timing log.
    pub timings: Vec<StageTiming>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::WarningCode;

    #[test]
    fn test_guard_fail_on_warning() {
        let guard = GuardConfig::strict();
        assert!(!guard.triggers(&[]));
        assert!(guard.triggers(&[Warning::info(WarningCode::TemplateLint, "any")]));
    }

    #[test]
    fn test_guard_fail_on_severity() {
        let guard = GuardConfig::at_severity(Severity::Error);
        assert!(!guard.triggers(&[Warning::warning(WarningCode::MissingSource, "soft")]));
        assert!(guard.triggers(&[
            Warning::warning(WarningCode::MissingSource, "soft"),
            Warning::error(WarningCode::MissingSource, "hard"),
        ]));
    }

    #[test]
    fn test_default_guards_protect_prompt_lint_only() {
        let guards = Guards::default();
        assert!(guards.template_lint.is_none());
        assert!(guards.resolution.is_none());
        assert_eq!(
            guards.prompt_lint,
            Some(GuardConfig::at_severity(Severity::Error))
        );
    }

    #[test]
    fn test_guards_serde_shape() {
        let guards: Guards = serde_json::from_value(serde_json::json!({
            "resolution": {"failOnWarning": true},
            "merge": {"failOnSeverity": "error"}
        }))
        .unwrap();
        assert_eq!(guards.resolution, Some(GuardConfig::strict()));
        assert_eq!(
            guards.merge,
            Some(GuardConfig::at_severity(Severity::Error))
        );
    }
}
