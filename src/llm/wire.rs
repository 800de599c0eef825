//! Responses-API wire types.
//!
//! Outgoing requests carry the prompt messages and a strict JSON-Schema
//! response format; incoming responses are tolerated in every shape the
//! contract allows (`output_text`, typed `output[]` items, or nested
//! content parts).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outgoing generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Model identifier.
    pub model: String,
    /// Prompt messages.
    pub input: Vec<RequestMessage>,
    /// Response format options.
    pub text: TextOptions,
    /// Output token budget.
    pub max_output_tokens: u32,
    /// Sampling temperature; omitted for model families that reject it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// One prompt message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    /// `system` or `user`.
    pub role: String,
    /// Typed content parts.
    pub content: Vec<RequestContent>,
}

/// A content part of a request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContent {
    /// Always `input_text`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The text body.
    pub text: String,
}

impl RequestContent {
    /// Creates an `input_text` part.
    #[must_use]
    pub fn input_text(text: impl Into<String>) -> Self {
        Self {
            kind: "input_text".to_string(),
            text: text.into(),
        }
    }
}

/// Response format options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOptions {
    /// The structured format contract.
    pub format: ResponseFormat,
}

/// Strict JSON-Schema response format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    /// Always `json_schema`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Schema name shown to the provider.
    pub name: String,
    /// Strict mode is always requested.
    pub strict: bool,
    /// The AI input schema.
    pub schema: Value,
}

impl ResponseFormat {
    /// Creates a strict `json_schema` format.
    #[must_use]
    pub fn strict_schema(name: impl Into<String>, schema: Value) -> Self {
        Self {
            kind: "json_schema".to_string(),
            name: name.into(),
            strict: true,
            schema,
        }
    }
}

/// Incoming response, tolerant of partial shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmResponse {
    /// Provider response id.
    pub id: Option<String>,
    /// Model that actually served the request.
    pub model: Option<String>,
    /// `completed`, `incomplete`, or a provider-specific status.
    pub status: Option<String>,
    /// Why an `incomplete` response stopped.
    pub incomplete_details: Option<IncompleteDetails>,
    /// Convenience top-level text, when the provider sends it.
    pub output_text: Option<String>,
    /// Typed output items.
    pub output: Vec<OutputItem>,
    /// Token accounting.
    pub usage: Option<UsageInfo>,
    /// Provider-reported error.
    pub error: Option<ResponseError>,
}

/// Reason detail for `incomplete` responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncompleteDetails {
    /// e.g. `max_output_tokens`, `content_filter`.
    pub reason: Option<String>,
}

/// One item of the `output[]` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputItem {
    /// Item type, e.g. `output_text` or `message`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Direct text, for `output_text` items.
    pub text: Option<String>,
    /// Nested content parts, for `message` items.
    pub content: Vec<OutputContent>,
}

/// A content part of an output item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputContent {
    /// Part type: `output_text`, `text`, `json*`, or `refusal`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Text body.
    pub text: Option<String>,
    /// Refusal text, for `refusal` parts.
    pub refusal: Option<String>,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageInfo {
    /// Prompt-side tokens.
    #[serde(alias = "prompt_tokens")]
    pub input_tokens: u64,
    /// Completion-side tokens.
    #[serde(alias = "completion_tokens")]
    pub output_tokens: u64,
    /// Total tokens.
    pub total_tokens: u64,
}

/// Provider-reported error body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseError {
    /// Error message.
    pub message: String,
    /// Provider error code.
    pub code: Option<String>,
}

impl LlmResponse {
    /// Extracts the response text, accepting every contract shape:
    /// top-level `output_text`, `output[]` items typed `output_text`, or
    /// nested content parts of type `output_text`, `text`, or `json*`.
    /// Matching parts are concatenated in order. Returns `None` when no
    /// non-empty text exists.
    #[must_use]
    pub fn extract_text(&self) -> Option<String> {
        if let Some(text) = &self.output_text {
            if !text.is_empty() {
                return Some(text.clone());
            }
        }
        let mut collected = String::new();
        for item in &self.output {
            if item.kind.as_deref() == Some("output_text") {
                if let Some(text) = &item.text {
                    collected.push_str(text);
                }
            }
            for part in &item.content {
                let accepted = part.kind == "output_text"
                    || part.kind == "text"
                    || part.kind.starts_with("json");
                if accepted {
                    if let Some(text) = &part.text {
                        collected.push_str(text);
                    }
                }
            }
        }
        (!collected.is_empty()).then_some(collected)
    }

    /// Returns the refusal text when any content part is a refusal.
    #[must_use]
    pub fn refusal(&self) -> Option<&str> {
        self.output
            .iter()
            .flat_map(|item| &item.content)
            .find(|part| part.kind == "refusal")
            .and_then(|part| part.refusal.as_deref().or(part.text.as_deref()))
    }

    /// Shorthand for a completed response carrying top-level text.
    #[must_use]
    pub fn completed(text: impl Into<String>) -> Self {
        Self {
            status: Some("completed".to_string()),
            output_text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization_shape() {
        let request = LlmRequest {
            model: "gpt-5-mini".to_string(),
            input: vec![RequestMessage {
                role: "system".to_string(),
                content: vec![RequestContent::input_text("be brief")],
            }],
            text: TextOptions {
                format: ResponseFormat::strict_schema("note", json!({"type": "object"})),
            },
            max_output_tokens: 1024,
            temperature: None,
        };
        let v = serde_json::to_value(&request).unwrap();
        assert_eq!(v["input"][0]["content"][0]["type"], "input_text");
        assert_eq!(v["text"]["format"]["type"], "json_schema");
        assert_eq!(v["text"]["format"]["strict"], true);
        assert!(v.get("temperature").is_none());
    }

    #[test]
    fn test_extract_top_level_output_text() {
        let r = LlmResponse::completed("{\"a\":1}");
        assert_eq!(r.extract_text().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_extract_from_typed_output_items() {
        let r: LlmResponse = serde_json::from_value(json!({
            "status": "completed",
            "output": [{"type": "output_text", "text": "{\"a\":1}"}]
        }))
        .unwrap();
        assert_eq!(r.extract_text().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_extract_from_nested_content_parts() {
        let r: LlmResponse = serde_json::from_value(json!({
            "status": "completed",
            "output": [{"type": "message", "content": [
                {"type": "json_object", "text": "{\"a\":"},
                {"type": "output_text", "text": "1}"}
            ]}]
        }))
        .unwrap();
        assert_eq!(r.extract_text().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_empty_output_extracts_none() {
        let r = LlmResponse::completed("");
        assert_eq!(r.extract_text(), None);
        let r = LlmResponse::default();
        assert_eq!(r.extract_text(), None);
    }

    #[test]
    fn test_refusal_surfaced() {
        let r: LlmResponse = serde_json::from_value(json!({
            "status": "completed",
            "output": [{"type": "message", "content": [
                {"type": "refusal", "refusal": "cannot comply"}
            ]}]
        }))
        .unwrap();
        assert_eq!(r.refusal(), Some("cannot comply"));
    }

    #[test]
    fn test_usage_aliases() {
        let u: UsageInfo = serde_json::from_value(json!({
            "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15
        }))
        .unwrap();
        assert_eq!(u.input_tokens, 10);
        assert_eq!(u.output_tokens, 5);
    }
}
