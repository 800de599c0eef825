//! Post-processing formats for computed values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FormulaError;

/// How a computed result is rendered before it is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormatKind {
    /// Lossless stringification.
    #[default]
    Plain,
    /// Signed delta: `"+3"`, `"-6"`, `"+0"`.
    DeltaScore,
    /// Multiply by 100 and suffix `%`.
    Percent,
}

/// Applies a format to a computed value, producing a string value.
///
/// # Errors
///
/// `deltaScore` and `percent` require numeric input and return a
/// [`FormulaError::TypeError`] otherwise.
pub fn apply_format(value: &Value, format: FormatKind) -> Result<Value, FormulaError> {
    let formatted = match format {
        FormatKind::Plain => stringify(value),
        FormatKind::DeltaScore => {
            let n = numeric(value, "deltaScore")?;
            if n >= 0.0 {
                format!("+{}", format_number(n))
            } else {
                format_number(n)
            }
        }
        FormatKind::Percent => {
            let n = numeric(value, "percent")?;
            format!("{}%", format_number(n * 100.0))
        }
    };
    Ok(Value::String(formatted))
}

fn numeric(value: &Value, op: &str) -> Result<f64, FormulaError> {
    value.as_f64().ok_or_else(|| FormulaError::TypeError {
        op: op.to_string(),
        left: crate::merge::json_type_name(value).to_string(),
        right: "number".to_string(),
    })
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n
            .as_f64()
            .map_or_else(|| n.to_string(), format_number),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Integral values print without a fractional part; everything else uses
/// the shortest round-trip representation.
#[allow(clippy::cast_possible_truncation)]
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(json!(-6.0), "-6")]
    #[test_case(json!(3.0), "+3")]
    #[test_case(json!(0.0), "+0")]
    #[test_case(json!(2.5), "+2.5")]
    fn test_delta_score(value: Value, expected: &str) {
        assert_eq!(
            apply_format(&value, FormatKind::DeltaScore).unwrap(),
            json!(expected)
        );
    }

    #[test_case(json!(0.5), "50%")]
    #[test_case(json!(0.125), "12.5%")]
    #[test_case(json!(1.0), "100%")]
    fn test_percent(value: Value, expected: &str) {
        assert_eq!(
            apply_format(&value, FormatKind::Percent).unwrap(),
            json!(expected)
        );
    }

    #[test]
    fn test_plain() {
        assert_eq!(apply_format(&json!("x"), FormatKind::Plain).unwrap(), json!("x"));
        assert_eq!(apply_format(&json!(7), FormatKind::Plain).unwrap(), json!("7"));
        assert_eq!(
            apply_format(&json!(1.25), FormatKind::Plain).unwrap(),
            json!("1.25")
        );
        assert_eq!(
            apply_format(&json!(true), FormatKind::Plain).unwrap(),
            json!("true")
        );
    }

    #[test]
    fn test_non_numeric_rejected() {
        assert!(apply_format(&json!("x"), FormatKind::DeltaScore).is_err());
        assert!(apply_format(&json!({}), FormatKind::Percent).is_err());
    }

    #[test]
    fn test_format_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&FormatKind::DeltaScore).unwrap(),
            "\"deltaScore\""
        );
        assert_eq!(serde_json::to_string(&FormatKind::Plain).unwrap(), "\"plain\"");
    }
}
