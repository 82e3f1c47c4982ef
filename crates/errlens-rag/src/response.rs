// Model output validation
// Turns a raw completion into the analysis field set or explains why it can't

use serde_json::{Map, Value};
use thiserror::Error;

use crate::result::Severity;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("response is not valid JSON: {0}")]
    NotJson(String),

    #[error("response is not a JSON object")]
    NotObject,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Validated model answer, before scoring
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAnalysis {
    /// the model may restate the error; absent means "use the unit's message"
    pub error_message: Option<String>,
    pub explanation: String,
    pub possible_causes: Vec<String>,
    pub severity: Severity,
    pub recommendations: Vec<String>,
    /// self-reported confidence, clamped to [0, 1]
    pub confidence: f32,
}

/// Parse and validate a raw completion.
///
/// Markdown fences and chatter around the JSON object are tolerated. Unknown
/// severities are coerced, a bare string where a list is expected becomes a
/// one-element list, and confidence is clamped.
pub fn parse_model_output(raw: &str) -> Result<ModelAnalysis, SchemaError> {
    let value = extract_json(raw)?;
    let obj = value.as_object().ok_or(SchemaError::NotObject)?;

    let explanation = required_text(obj, "explanation")?;
    let possible_causes = string_list(obj, "possible_causes")?;
    let recommendations = string_list(obj, "recommendations")?;

    let severity = match obj.get("severity") {
        Some(Value::String(s)) => Severity::coerce(s),
        Some(Value::Number(n)) => Severity::from_rank(n.as_f64().unwrap_or(2.0)),
        Some(Value::Null) | None => return Err(SchemaError::MissingField("severity")),
        Some(other) => {
            return Err(SchemaError::InvalidField {
                field: "severity",
                reason: format!("expected a string, got {}", type_name(other)),
            })
        }
    };

    let confidence_value = obj
        .get("confidence_score")
        .or_else(|| obj.get("confidence"))
        .ok_or(SchemaError::MissingField("confidence_score"))?;
    let confidence = match confidence_value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|c| c.is_finite())
    .ok_or_else(|| SchemaError::InvalidField {
        field: "confidence_score",
        reason: format!("expected a number, got {}", confidence_value),
    })?;

    let error_message = obj
        .get("error_message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(ModelAnalysis {
        error_message,
        explanation,
        possible_causes,
        severity,
        recommendations,
        confidence: confidence.clamp(0.0, 1.0) as f32,
    })
}

fn extract_json(raw: &str) -> Result<Value, SchemaError> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            // fall back to the outermost {...} span
            let start = cleaned.find('{');
            let end = cleaned.rfind('}');
            match (start, end) {
                (Some(start), Some(end)) if start < end => {
                    serde_json::from_str(&cleaned[start..=end])
                        .map_err(|e| SchemaError::NotJson(e.to_string()))
                }
                _ => Err(SchemaError::NotJson(first_err.to_string())),
            }
        }
    }
}

fn required_text(obj: &Map<String, Value>, field: &'static str) -> Result<String, SchemaError> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) => Err(SchemaError::InvalidField {
            field,
            reason: "empty string".to_string(),
        }),
        Some(Value::Null) | None => Err(SchemaError::MissingField(field)),
        Some(other) => Err(SchemaError::InvalidField {
            field,
            reason: format!("expected a string, got {}", type_name(other)),
        }),
    }
}

fn string_list(obj: &Map<String, Value>, field: &'static str) -> Result<Vec<String>, SchemaError> {
    match obj.get(field) {
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect()),
        Some(Value::String(s)) => Ok(if s.trim().is_empty() {
            Vec::new()
        } else {
            vec![s.trim().to_string()]
        }),
        Some(Value::Null) | None => Err(SchemaError::MissingField(field)),
        Some(other) => Err(SchemaError::InvalidField {
            field,
            reason: format!("expected a list of strings, got {}", type_name(other)),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
