//! Scripted mock client and deterministic mock generation.
//!
//! [`MockClient`] replays queued responses for adapter tests. For offline
//! pipeline runs, [`mock_payload`] fabricates a schema-conformant payload
//! directly from the AI input schema, so the whole pipeline can execute
//! without an LLM.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::client::LlmClient;
use super::wire::{LlmRequest, LlmResponse};
use crate::error::LlmError;

/// A client that replays queued responses and records requests.
#[derive(Default)]
pub struct MockClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockClient {
    /// Creates an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push_response(&self, response: LlmResponse) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(response));
        }
    }

    /// Queues a transport error.
    pub fn push_error(&self, error: LlmError) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(error));
        }
    }

    /// Number of requests the mock has served.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// The recorded requests, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockClient {
    async fn create(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        next.unwrap_or_else(|| {
            Err(LlmError::Transport {
                status: None,
                message: "mock client has no queued responses".to_string(),
                retryable: false,
            })
        })
    }
}

/// Placeholder text used for unconstrained string leaves.
const PLACEHOLDER: &str = "Mock generated text.";

/// Fabricates a deterministic payload conforming to a derived JSON Schema.
///
/// Objects produce every property, arrays produce one element, enums take
/// their first member, and strings respect `minLength`.
#[must_use]
pub fn mock_payload(schema: &Value) -> Value {
    if let Some(first) = schema
        .get("enum")
        .and_then(Value::as_array)
        .and_then(|values| values.first())
    {
        return first.clone();
    }
    match schema.get("type").and_then(Value::as_str) {
        Some("object") => {
            let mut out = serde_json::Map::new();
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (key, child) in properties {
                    out.insert(key.clone(), mock_payload(child));
                }
            }
            Value::Object(out)
        }
        Some("array") => match schema.get("items") {
            Some(items) => json!([mock_payload(items)]),
            None => json!([]),
        },
        Some("number") | Some("integer") => json!(0),
        Some("boolean") => json!(true),
        _ => {
            let min_length = schema
                .get("minLength")
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(0);
            let mut text = PLACEHOLDER.to_string();
            while text.chars().count() < min_length {
                text.push_str(" More mock text.");
            }
            Value::String(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_payload_covers_schema() {
        let schema = json!({
            "type": "object",
            "properties": {
                "assessment": {
                    "type": "object",
                    "properties": {
                        "summary": {"type": "string", "minLength": 40},
                        "severity": {"type": "string", "enum": ["mild", "moderate", "severe"]},
                        "score": {"type": "number"},
                        "flagged": {"type": "boolean"},
                        "tasks": {"type": "array", "items": {"type": "string"}}
                    }
                }
            }
        });
        let payload = mock_payload(&schema);
        let assessment = &payload["assessment"];
        assert!(assessment["summary"].as_str().unwrap().chars().count() >= 40);
        assert_eq!(assessment["severity"], "mild");
        assert_eq!(assessment["score"], 0);
        assert_eq!(assessment["flagged"], true);
        assert_eq!(assessment["tasks"], json!(["Mock generated text."]));
    }

    #[test]
    fn test_mock_payload_is_deterministic() {
        let schema = json!({"type": "object", "properties": {"a": {"type": "string"}}});
        assert_eq!(mock_payload(&schema), mock_payload(&schema));
    }

    #[test]
    fn test_mock_payload_validates_against_schema() {
        use crate::schema::{CachedValidator, SchemaValidator};
        let schema = json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string", "minLength": 5},
                "labels": {"type": "array", "items": {"type": "string", "enum": ["a", "b"]}}
            },
            "required": ["summary"],
            "additionalProperties": false
        });
        let payload = mock_payload(&schema);
        assert!(CachedValidator::new().validate(&schema, &payload).is_ok());
    }

    #[tokio::test]
    async fn test_mock_client_replays_in_order() {
        let client = MockClient::new();
        client.push_response(LlmResponse::completed("one"));
        client.push_error(LlmError::Truncated);

        let request = LlmRequest {
            model: "m".to_string(),
            input: vec![],
            text: crate::llm::TextOptions {
                format: crate::llm::ResponseFormat::strict_schema("s", json!({})),
            },
            max_output_tokens: 1,
            temperature: None,
        };
        let first = client.create(&request).await.unwrap();
        assert_eq!(first.output_text.as_deref(), Some("one"));
        assert!(matches!(client.create(&request).await, Err(LlmError::Truncated)));
        assert!(client.create(&request).await.is_err());
        assert_eq!(client.calls(), 3);
    }
}
