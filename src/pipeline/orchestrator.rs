//! The pipeline orchestrator.
//!
//! Sequences validate → derive → resolve → compose → generate → validate →
//! merge → render, applying guard policies between stages and accumulating
//! grouped warnings. Stage transitions and timings are logged per request.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info};
use ulid::Ulid;

use super::{
    GuardConfig, PipelineInput, PipelineOutput, PipelineState, SchemaSet, StageTiming,
};
use crate::diag::{PipelineStep, PipelineWarnings, Warning};
use crate::error::{Error, LlmError, PipelineError};
use crate::llm::{LlmAdapter, LlmClient, Usage, mock_payload};
use crate::merge::merge_payloads;
use crate::prompt::{build_field_guide, compose_prompt};
use crate::render::{HtmlRenderer, Renderer};
use crate::resolve::NasBuilder;
use crate::schema::{
    CachedValidator, SchemaValidator, check_soft_constraints, derive_ai_schema, derive_nas_schema,
    merge_render_schema,
};
use crate::template::validate_template;

/// The pipeline orchestrator (C14).
///
/// Holds the injected capabilities: the LLM client (absent for mock-only
/// pipelines), the schema validator, and the renderer.
pub struct Pipeline {
    client: Option<Arc<dyn LlmClient>>,
    validator: Arc<dyn SchemaValidator>,
    renderer: Arc<dyn Renderer>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Creates a pipeline without an LLM client; runs must use mock
    /// generation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: None,
            validator: Arc::new(CachedValidator::new()),
            renderer: Arc::new(HtmlRenderer),
        }
    }

    /// Creates a pipeline around an injected LLM client.
    #[must_use]
    pub fn with_client(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client: Some(client),
            ..Self::new()
        }
    }

    /// Creates a pipeline around the `openai`-feature HTTP client,
    /// resolving the key from the argument or the environment.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MissingApiKey`] when no key can be resolved.
    #[cfg(feature = "openai")]
    pub fn with_openai(api_key: Option<String>) -> Result<Self, Error> {
        let client = crate::llm::OpenAiClient::new(api_key)?;
        Ok(Self::with_client(Arc::new(client)))
    }

    /// Replaces the schema validator.
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Replaces the renderer.
    #[must_use]
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Runs the full pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::PipelineError`] (wrapped in [`Error`]) with
    /// the failing stage's `step` label, either because the stage failed
    /// outright or because its guard promoted warnings to a failure.
    pub async fn run(&self, input: PipelineInput) -> Result<PipelineOutput, Error> {
        self.run_with_cancel(input, None).await
    }

    /// Runs the full pipeline with a cancellation signal honoured by the
    /// LLM adapter.
    ///
    /// # Errors
    ///
    /// See [`Self::run`].
    #[allow(clippy::too_many_lines)]
    pub async fn run_with_cancel(
        &self,
        input: PipelineInput,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<PipelineOutput, Error> {
        let PipelineInput {
            template,
            source_data,
            tokens,
            fact_pack,
            options,
        } = input;
        let request_id = options
            .request_id
            .clone()
            .unwrap_or_else(|| Ulid::new().to_string());
        info!(request_id = %request_id, template = %template.id, "pipeline start");

        let mut run = Run::new(request_id.clone());

        // Template validation.
        let stage = Instant::now();
        let template_warnings = validate_template(&template)
            .map_err(|e| run.fail(PipelineStep::TemplateValidation, e.to_string()))?;
        run.guard(
            options.guards.template_lint,
            PipelineStep::TemplateValidation,
            &template_warnings,
        )?;
        run.warnings
            .extend(PipelineStep::TemplateValidation, template_warnings);
        run.advance(PipelineState::TemplateValidated, "template-validation", stage);

        // Schema derivation.
        let stage = Instant::now();
        let ais = derive_ai_schema(&template)
            .map_err(|e| run.fail(PipelineStep::SchemaDerivation, e.to_string()))?;
        let nas_schema = derive_nas_schema(&template)
            .map_err(|e| run.fail(PipelineStep::SchemaDerivation, e.to_string()))?;
        let rps = merge_render_schema(&ais, &nas_schema)
            .map_err(|e| run.fail(PipelineStep::SchemaDerivation, e.to_string()))?;
        let ais_value = ais.to_json_schema();
        let schemas = SchemaSet {
            ais: ais_value.clone(),
            nas: nas_schema.to_json_schema(),
            rps: rps.to_json_schema(),
        };
        run.advance(PipelineState::SchemasDerived, "schema-derivation", stage);

        // Deterministic resolution.
        let stage = Instant::now();
        let resolution = NasBuilder::new().build(&template, &source_data);
        run.guard(
            options.guards.resolution,
            PipelineStep::Resolution,
            &resolution.warnings,
        )?;
        run.warnings
            .extend(PipelineStep::Resolution, resolution.warnings.clone());
        run.advance(PipelineState::NasResolved, "resolution", stage);

        // Prompt composition and lint.
        let stage = Instant::now();
        let field_guide = build_field_guide(&template);
        let bundle_id = format!("pb_{request_id}");
        let (bundle, lint) = compose_prompt(
            &template,
            &ais,
            field_guide,
            &resolution.nas_data,
            fact_pack.as_ref(),
            bundle_id,
        );
        let lint_findings = lint.all();
        run.guard(
            options.guards.prompt_lint,
            PipelineStep::PromptLint,
            &lint_findings,
        )?;
        run.warnings.extend(PipelineStep::PromptLint, lint_findings);
        run.advance(PipelineState::PromptComposed, "prompt-composition", stage);

        // Generation, real or mock.
        let stage = Instant::now();
        run.transition(PipelineState::AiRequested);
        let (ai_output, usage, model, response_id, generation_warnings) =
            if options.mock_generation {
                let output = mock_payload(&ais_value);
                let mut warnings = Vec::new();
                if options.validate_steps {
                    self.validator
                        .validate(&ais_value, &output)
                        .map_err(|errors| {
                            run.fail(PipelineStep::AiValidation, errors.join("; "))
                        })?;
                    warnings.extend(check_soft_constraints(&ais_value, &output));
                }
                (output, Usage::default(), "mock".to_string(), None, warnings)
            } else {
                let client = self.client.clone().ok_or_else(|| {
                    run.fail(
                        PipelineStep::AiGeneration,
                        "no LLM client configured; inject one or enable mock generation",
                    )
                })?;
                let adapter =
                    LlmAdapter::new(client, Arc::clone(&self.validator), options.generation.clone());
                let generation = adapter
                    .generate(&bundle, cancel)
                    .await
                    .map_err(|e| run.fail(step_for_llm_error(&e), e.to_string()))?;
                (
                    generation.output,
                    generation.usage,
                    generation.model,
                    generation.response_id,
                    generation.warnings,
                )
            };
        run.guard(
            options.guards.validation,
            PipelineStep::AiValidation,
            &generation_warnings,
        )?;
        run.warnings
            .extend(PipelineStep::AiValidation, generation_warnings);
        run.advance(PipelineState::AiResponded, "ai-generation", stage);

        // Merge.
        let stage = Instant::now();
        let outcome = merge_payloads(&ai_output, &resolution.nas_data);
        let conflict_warnings: Vec<Warning> = outcome
            .conflicts
            .into_iter()
            .map(crate::merge::MergeConflict::into_warning)
            .collect();
        run.guard(options.guards.merge, PipelineStep::Merge, &conflict_warnings)?;
        run.warnings.extend(PipelineStep::Merge, conflict_warnings);
        run.advance(PipelineState::Merged, "merge", stage);

        // Render.
        let stage = Instant::now();
        let document = self
            .renderer
            .render(&template, &outcome.merged, tokens.as_ref())
            .map_err(|e| run.fail(PipelineStep::Render, e.to_string()))?;
        run.advance(PipelineState::Rendered, "render", stage);

        run.transition(PipelineState::Complete);
        info!(request_id = %request_id, warnings = run.warnings.len(), "pipeline complete");

        Ok(PipelineOutput {
            html: document.html,
            css: document.css,
            ai_output,
            schemas,
            usage,
            model,
            response_id,
            prompt_id: options.capture_prompt_metadata.then_some(bundle.id),
            ai_response_mocked: options.mock_generation,
            warnings: (!run.warnings.is_empty()).then_some(run.warnings),
            payload: options.provenance.then(|| outcome.merged.clone()),
            nas_snapshot: options.provenance.then(|| resolution.nas_data.clone()),
            request_id,
            timings: run.timings,
        })
    }
}

/// Chooses the error step for an LLM failure: response-shape problems are
/// validation failures, everything else belongs to generation.
const fn step_for_llm_error(error: &LlmError) -> PipelineStep {
    match error {
        LlmError::MalformedJson { .. } | LlmError::SchemaViolation { .. } => {
            PipelineStep::AiValidation
        }
        _ => PipelineStep::AiGeneration,
    }
}

/// Orchestrator-owned per-run state: the state machine, the timing log,
/// and the accumulating warnings.
struct Run {
    request_id: String,
    state: PipelineState,
    warnings: PipelineWarnings,
    timings: Vec<StageTiming>,
}

impl Run {
    fn new(request_id: String) -> Self {
        Self {
            request_id,
            state: PipelineState::Start,
            warnings: PipelineWarnings::new(),
            timings: Vec::new(),
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(
            request_id = %self.request_id,
            from = ?self.state,
            to = ?next,
            "state transition"
        );
        self.state = next;
    }

    fn advance(&mut self, next: PipelineState, label: &str, started: Instant) {
        self.transition(next);
        let elapsed = started.elapsed();
        debug!(request_id = %self.request_id, stage = label, elapsed_ms = elapsed.as_millis(), "stage complete");
        self.timings.push(StageTiming {
            stage: label.to_string(),
            elapsed,
        });
    }

    fn fail(&mut self, step: PipelineStep, message: impl Into<String>) -> Error {
        self.transition(PipelineState::Failed);
        Error::Pipeline(PipelineError::new(step, message))
    }

    fn guard(
        &mut self,
        config: Option<GuardConfig>,
        step: PipelineStep,
        warnings: &[Warning],
    ) -> Result<(), Error> {
        if config.is_some_and(|g| g.triggers(warnings)) {
            self.transition(PipelineState::Failed);
            return Err(Error::Pipeline(PipelineError::with_warnings(
                step,
                "guard promoted stage warnings to a failure",
                warnings.to_vec(),
            )));
        }
        Ok(())
    }
}
