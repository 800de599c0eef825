//! LLM adapter: policy around the injected client.
//!
//! The adapter builds the wire request from a prompt bundle, enforces the
//! strict JSON-Schema response contract, translates non-completed statuses,
//! retries transient transport failures with exponential backoff, retries a
//! completed-but-empty response exactly once, honours cancellation, and
//! validates the parsed payload against the AI input schema.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::client::LlmClient;
use super::wire::{
    LlmRequest, LlmResponse, RequestContent, RequestMessage, ResponseFormat, TextOptions,
};
use crate::diag::{Warning, WarningCode};
use crate::error::LlmError;
use crate::prompt::PromptBundle;
use crate::schema::{SchemaValidator, check_soft_constraints};

/// Model family that rejects a sampling temperature.
const NO_TEMPERATURE_PREFIX: &str = "gpt-5";

/// Generation options surfaced through the pipeline input.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature; dropped for models that reject it.
    pub temperature: Option<f64>,
    /// Output token budget.
    pub max_tokens: u32,
    /// Transport retry budget (beyond the first attempt).
    pub retries: u32,
    /// First backoff delay; doubled each retry.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_max: Duration,
    /// Per-attempt timeout; a timeout counts as a retryable transport
    /// failure.
    pub timeout: Option<Duration>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gpt-5-mini".to_string(),
            temperature: None,
            max_tokens: 4096,
            retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            timeout: Some(Duration::from_secs(120)),
        }
    }
}

/// Token usage in the pipeline's accounting shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Prompt-side tokens.
    pub prompt_tokens: u64,
    /// Completion-side tokens.
    pub completion_tokens: u64,
    /// Total tokens.
    pub total_tokens: u64,
}

/// A validated generation result.
#[derive(Debug, Clone)]
pub struct Generation {
    /// The parsed, schema-conformant AI payload.
    pub output: Value,
    /// Token accounting.
    pub usage: Usage,
    /// Model that served the request.
    pub model: String,
    /// Provider response id.
    pub response_id: Option<String>,
    /// Prompt bundle id the generation answered.
    pub prompt_id: Option<String>,
    /// Soft-constraint and empty-retry diagnostics.
    pub warnings: Vec<Warning>,
    /// Total calls made, including the empty-output retry.
    pub attempts: u32,
}

/// Policy wrapper around an injected [`LlmClient`].
pub struct LlmAdapter {
    client: Arc<dyn LlmClient>,
    validator: Arc<dyn SchemaValidator>,
    options: GenerationOptions,
}

impl LlmAdapter {
    /// Creates an adapter over a client and validator.
    #[must_use]
    pub fn new(
        client: Arc<dyn LlmClient>,
        validator: Arc<dyn SchemaValidator>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            client,
            validator,
            options,
        }
    }

    /// Builds the wire request for a bundle.
    #[must_use]
    pub fn build_request(&self, bundle: &PromptBundle) -> LlmRequest {
        let temperature = if self.options.model.starts_with(NO_TEMPERATURE_PREFIX) {
            None
        } else {
            self.options.temperature
        };
        LlmRequest {
            model: self.options.model.clone(),
            input: bundle
                .messages
                .iter()
                .map(|m| RequestMessage {
                    role: match m.role {
                        crate::prompt::Role::System => "system".to_string(),
                        crate::prompt::Role::User => "user".to_string(),
                    },
                    content: vec![RequestContent::input_text(m.content.clone())],
                })
                .collect(),
            text: TextOptions {
                format: ResponseFormat::strict_schema(
                    schema_name(&bundle.template_id),
                    bundle.json_schema.clone(),
                ),
            },
            max_output_tokens: self.options.max_tokens,
            temperature,
        }
    }

    /// Runs one generation with the full retry and validation policy.
    ///
    /// # Errors
    ///
    /// See [`LlmError`]: transport failures after the retry budget,
    /// truncation, content filtering, refusal, a second empty output,
    /// malformed JSON, or a schema violation. A raised cancellation signal
    /// aborts without retrying.
    pub async fn generate(
        &self,
        bundle: &PromptBundle,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<Generation, LlmError> {
        let request = self.build_request(bundle);
        let mut warnings: Vec<Warning> = Vec::new();
        let mut transport_retries = 0u32;
        let mut empty_retried = false;
        let mut attempts = 0u32;

        loop {
            if is_cancelled(cancel.as_ref()) {
                return Err(LlmError::Cancelled);
            }
            attempts += 1;

            let response = match self.call_once(&request, cancel.clone()).await {
                Ok(response) => response,
                Err(e) if e.is_retryable() && transport_retries < self.options.retries => {
                    let delay = backoff_delay(
                        self.options.backoff_base,
                        self.options.backoff_max,
                        transport_retries,
                    );
                    transport_retries += 1;
                    warn!(
                        attempt = transport_retries,
                        max = self.options.retries,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "transient LLM transport failure; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            check_status(&response)?;
            if let Some(refusal) = response.refusal() {
                return Err(LlmError::Refusal {
                    message: refusal.to_string(),
                });
            }

            let Some(text) = response.extract_text() else {
                if empty_retried {
                    return Err(LlmError::EmptyOutput { attempts });
                }
                empty_retried = true;
                debug!("completed response carried no output; retrying once");
                warnings.push(Warning::warning(
                    WarningCode::MissingOutput,
                    "completed response carried no extractable output; retried once",
                ));
                continue;
            };

            let output: Value = serde_json::from_str(&text).map_err(|e| {
                LlmError::MalformedJson {
                    message: e.to_string(),
                }
            })?;
            if let Err(errors) = self.validator.validate(&bundle.json_schema, &output) {
                return Err(LlmError::SchemaViolation { errors });
            }
            warnings.extend(check_soft_constraints(&bundle.json_schema, &output));

            let usage = response.usage.map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.total_tokens,
            });
            return Ok(Generation {
                output,
                usage: usage.unwrap_or_default(),
                model: response.model.unwrap_or_else(|| request.model.clone()),
                response_id: response.id,
                prompt_id: Some(bundle.id.clone()),
                warnings,
                attempts,
            });
        }
    }

    async fn call_once(
        &self,
        request: &LlmRequest,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<LlmResponse, LlmError> {
        let call = async {
            match self.options.timeout {
                Some(limit) => tokio::time::timeout(limit, self.client.create(request))
                    .await
                    .map_err(|_| LlmError::Transport {
                        status: None,
                        message: format!("request timed out after {}s", limit.as_secs()),
                        retryable: true,
                    })?,
                None => self.client.create(request).await,
            }
        };

        match cancel {
            Some(mut rx) => {
                tokio::select! {
                    biased;
                    () = cancelled(&mut rx) => Err(LlmError::Cancelled),
                    result = call => result,
                }
            }
            None => call.await,
        }
    }
}

fn schema_name(template_id: &str) -> String {
    let sanitized: String = template_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    format!("note_{sanitized}")
}

fn check_status(response: &LlmResponse) -> Result<(), LlmError> {
    if let Some(error) = &response.error {
        return Err(LlmError::Transport {
            status: None,
            message: error.message.clone(),
            retryable: false,
        });
    }
    match response.status.as_deref() {
        None | Some("completed") => Ok(()),
        Some("incomplete") => {
            let reason = response
                .incomplete_details
                .as_ref()
                .and_then(|d| d.reason.as_deref())
                .unwrap_or("unknown");
            match reason {
                "max_output_tokens" => Err(LlmError::Truncated),
                "content_filter" => Err(LlmError::ContentFilter),
                other => Err(LlmError::Transport {
                    status: None,
                    message: format!("incomplete response: {other}"),
                    retryable: false,
                }),
            }
        }
        Some(other) => Err(LlmError::Transport {
            status: None,
            message: format!("unexpected response status: {other}"),
            retryable: false,
        }),
    }
}

fn backoff_delay(base: Duration, max: Duration, retry_index: u32) -> Duration {
    let factor = 1u32.checked_shl(retry_index.min(16)).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

fn is_cancelled(cancel: Option<&watch::Receiver<bool>>) -> bool {
    cancel.is_some_and(|rx| *rx.borrow())
}

/// Resolves when the cancellation signal is raised; pends forever when the
/// sender is gone (a dropped orchestrator never cancels an in-flight call).
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    match rx.wait_for(|cancelled| *cancelled).await {
        Ok(_) => (),
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockClient;
    use crate::prompt::{Message, PromptBundle, PromptContext, RESPONSE_CONTRACT, Role};
    use crate::schema::CachedValidator;
    use serde_json::json;

    fn bundle() -> PromptBundle {
        PromptBundle {
            id: "bundle-1".to_string(),
            template_id: "tmpl".to_string(),
            template_version: "1.0.0".to_string(),
            messages: vec![
                Message {
                    role: Role::System,
                    content: "sys".to_string(),
                },
                Message {
                    role: Role::User,
                    content: format!("fill the note\n\n{RESPONSE_CONTRACT}"),
                },
            ],
            json_schema: json!({
                "type": "object",
                "properties": {
                    "assessment": {
                        "type": "object",
                        "properties": {"summary": {"type": "string", "x-maxWords": 3}},
                        "additionalProperties": false
                    }
                },
                "additionalProperties": false
            }),
            field_guide: vec![],
            context: PromptContext {
                nas_slices: json!({}),
                fact_pack: None,
            },
        }
    }

    fn adapter(client: MockClient, options: GenerationOptions) -> LlmAdapter {
        LlmAdapter::new(
            Arc::new(client),
            Arc::new(CachedValidator::new()),
            options,
        )
    }

    fn fast_options() -> GenerationOptions {
        GenerationOptions {
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(5),
            ..GenerationOptions::default()
        }
    }

    #[tokio::test]
    async fn test_successful_generation() {
        let client = MockClient::new();
        client.push_response(LlmResponse::completed(
            "{\"assessment\":{\"summary\":\"ok\"}}",
        ));
        let out = adapter(client, fast_options())
            .generate(&bundle(), None)
            .await
            .unwrap();
        assert_eq!(out.output, json!({"assessment": {"summary": "ok"}}));
        assert_eq!(out.attempts, 1);
        assert!(out.warnings.is_empty());
        assert_eq!(out.prompt_id.as_deref(), Some("bundle-1"));
    }

    #[tokio::test]
    async fn test_empty_output_retries_exactly_once() {
        let client = MockClient::new();
        client.push_response(LlmResponse::completed(""));
        client.push_response(LlmResponse::completed(
            "{\"assessment\":{\"summary\":\"ok\"}}",
        ));
        let out = adapter(client, fast_options())
            .generate(&bundle(), None)
            .await
            .unwrap();
        assert_eq!(out.attempts, 2);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].code, WarningCode::MissingOutput);
    }

    #[tokio::test]
    async fn test_double_empty_output_fails() {
        let client = MockClient::new();
        client.push_response(LlmResponse::completed(""));
        client.push_response(LlmResponse::completed(""));
        let err = adapter(client, fast_options())
            .generate(&bundle(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyOutput { attempts: 2 }));
    }

    #[tokio::test]
    async fn test_transport_retries_with_backoff() {
        let client = MockClient::new();
        client.push_error(LlmError::Transport {
            status: Some(429),
            message: "rate limited".to_string(),
            retryable: true,
        });
        client.push_error(LlmError::Transport {
            status: Some(503),
            message: "unavailable".to_string(),
            retryable: true,
        });
        client.push_response(LlmResponse::completed(
            "{\"assessment\":{\"summary\":\"ok\"}}",
        ));
        let out = adapter(client, fast_options())
            .generate(&bundle(), None)
            .await
            .unwrap();
        assert_eq!(out.attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let client = MockClient::new();
        for _ in 0..3 {
            client.push_error(LlmError::Transport {
                status: Some(500),
                message: "boom".to_string(),
                retryable: true,
            });
        }
        let options = GenerationOptions {
            retries: 2,
            ..fast_options()
        };
        let err = adapter(client, options)
            .generate(&bundle(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Transport { retryable: true, .. }));
    }

    #[tokio::test]
    async fn test_non_retryable_surfaces_immediately() {
        let client = MockClient::new();
        client.push_error(LlmError::Transport {
            status: Some(400),
            message: "bad request".to_string(),
            retryable: false,
        });
        client.push_response(LlmResponse::completed("{}"));
        let err = adapter(client, fast_options())
            .generate(&bundle(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Transport { status: Some(400), .. }));
    }

    #[tokio::test]
    async fn test_truncation_and_filter_errors() {
        let truncated: LlmResponse = serde_json::from_value(json!({
            "status": "incomplete",
            "incomplete_details": {"reason": "max_output_tokens"}
        }))
        .unwrap();
        let client = MockClient::new();
        client.push_response(truncated);
        let err = adapter(client, fast_options())
            .generate(&bundle(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Truncated));

        let filtered: LlmResponse = serde_json::from_value(json!({
            "status": "incomplete",
            "incomplete_details": {"reason": "content_filter"}
        }))
        .unwrap();
        let client = MockClient::new();
        client.push_response(filtered);
        let err = adapter(client, fast_options())
            .generate(&bundle(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ContentFilter));
    }

    #[tokio::test]
    async fn test_refusal_surfaced() {
        let refusing: LlmResponse = serde_json::from_value(json!({
            "status": "completed",
            "output": [{"type": "message", "content": [
                {"type": "refusal", "refusal": "no clinical advice"}
            ]}]
        }))
        .unwrap();
        let client = MockClient::new();
        client.push_response(refusing);
        let err = adapter(client, fast_options())
            .generate(&bundle(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Refusal { message } if message.contains("no clinical")));
    }

    #[tokio::test]
    async fn test_malformed_json_fails() {
        let client = MockClient::new();
        client.push_response(LlmResponse::completed("not json"));
        let err = adapter(client, fast_options())
            .generate(&bundle(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MalformedJson { .. }));
    }

    #[tokio::test]
    async fn test_schema_violation_fails() {
        let client = MockClient::new();
        client.push_response(LlmResponse::completed("{\"assessment\":{\"summary\":3}}"));
        let err = adapter(client, fast_options())
            .generate(&bundle(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::SchemaViolation { .. }));
    }

    #[tokio::test]
    async fn test_soft_constraint_violation_is_warning() {
        let client = MockClient::new();
        client.push_response(LlmResponse::completed(
            "{\"assessment\":{\"summary\":\"one two three four five\"}}",
        ));
        let out = adapter(client, fast_options())
            .generate(&bundle(), None)
            .await
            .unwrap();
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].code, WarningCode::SoftConstraint);
    }

    #[tokio::test]
    async fn test_cancellation_pre_empts_call() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).ok();
        let client = MockClient::new();
        client.push_response(LlmResponse::completed("{}"));
        let err = adapter(client, fast_options())
            .generate(&bundle(), Some(rx))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Cancelled));
    }

    #[test]
    fn test_temperature_dropped_for_gpt5_family() {
        let client = MockClient::new();
        let options = GenerationOptions {
            model: "gpt-5-mini".to_string(),
            temperature: Some(0.3),
            ..GenerationOptions::default()
        };
        let request = adapter(client, options).build_request(&bundle());
        assert!(request.temperature.is_none());

        let client = MockClient::new();
        let options = GenerationOptions {
            model: "gpt-4.1".to_string(),
            temperature: Some(0.3),
            ..GenerationOptions::default()
        };
        let request = adapter(client, options).build_request(&bundle());
        assert_eq!(request.temperature, Some(0.3));
    }

    #[test]
    fn test_backoff_doubles_and_clamps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(350);
        assert_eq!(backoff_delay(base, max, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, max, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, max, 2), Duration::from_millis(350));
        assert_eq!(backoff_delay(base, max, 30), Duration::from_millis(350));
    }

    #[test]
    fn test_schema_name_sanitized() {
        assert_eq!(schema_name("tmpl.v2/beta"), "note_tmpl_v2_beta");
    }
}
