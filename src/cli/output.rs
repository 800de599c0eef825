//! CLI output formatting.

use crate::error::Error;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format flag; unknown values fall back to text.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Formats an error for the chosen output format.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json => {
            let body = match error {
                Error::Pipeline(e) => serde_json::json!({
                    "error": e.message,
                    "step": e.step.label(),
                    "warnings": e.warnings,
                }),
                other => serde_json::json!({"error": other.to_string()}),
            };
            serde_json::to_string_pretty(&body).unwrap_or_else(|_| error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::PipelineStep;
    use crate::error::PipelineError;

    #[test]
    fn test_format_parse() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("anything"), OutputFormat::Text);
    }

    #[test]
    fn test_pipeline_error_json_carries_step() {
        let err = Error::Pipeline(PipelineError::new(PipelineStep::Merge, "boom"));
        let out = format_error(&err, OutputFormat::Json);
        assert!(out.contains("\"step\": \"merge\""));
        assert!(out.contains("boom"));
    }

    #[test]
    fn test_text_error_format() {
        let err = Error::Config {
            message: "bad flag".to_string(),
        };
        assert_eq!(
            format_error(&err, OutputFormat::Text),
            "configuration error: bad flag"
        );
    }
}
