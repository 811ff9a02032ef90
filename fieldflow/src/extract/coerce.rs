//! Coercion of raw text spans into typed field values.

use regex::Regex;
use std::sync::OnceLock;

use crate::errors::ValidationError;
use crate::signature::{Field, FieldKind};
use crate::values::FieldValue;

use super::datetime::{parse_llm_date, parse_llm_datetime};

fn absent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(null|undefined)\s*$").unwrap_or_else(|_| unreachable!()))
}

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"```([A-Za-z]*)\n((?s).*?)\n```").unwrap_or_else(|_| unreachable!())
    })
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-*+]|\d+\.)\s+(.*)$").unwrap_or_else(|_| unreachable!()))
}

/// Strips a single fenced block (```lang ... ```), returning its body.
/// Input without a fence is returned unchanged.
#[must_use]
pub fn extract_block(input: &str) -> &str {
    match fenced_block_re().captures(input) {
        Some(captures) => captures.get(2).map_or(input, |m| m.as_str()),
        None => input,
    }
}

/// Parses a markdown bullet or numbered list into its item texts.
pub(crate) fn parse_markdown_list(input: &str) -> Result<Vec<String>, String> {
    let mut items = Vec::new();
    for line in input.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match bullet_re().captures(line) {
            Some(captures) => {
                let item = captures.get(1).map_or("", |m| m.as_str());
                items.push(item.trim().to_string());
            }
            None => return Err("Expected an array".to_string()),
        }
    }
    if items.is_empty() {
        return Err("Expected an array".to_string());
    }
    Ok(items)
}

/// Validates and coerces a trimmed span into the field's declared type.
///
/// Returns `Ok(None)` when the span coerces to "absent" (empty, `null`, or
/// `undefined` on an optional field, or an empty string after coercion).
pub fn validate_and_parse(field: &Field, raw: &str) -> Result<Option<FieldValue>, ValidationError> {
    if raw.is_empty() || absent_re().is_match(raw) {
        if field.is_optional {
            return Ok(None);
        }
        return Err(
            ValidationError::for_field(field, "Required field is missing").with_raw_value(raw)
        );
    }

    if field.ty.kind == FieldKind::Json {
        let text = extract_block(raw);
        return match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => Ok(Some(FieldValue::Json(value))),
            Err(e) => Err(ValidationError::for_field(field, format!("Invalid JSON: {e}"))
                .with_raw_value(raw)),
        };
    }

    if field.ty.is_array {
        let elements = parse_array_elements(raw)
            .map_err(|e| ValidationError::for_field(field, format!("Invalid Array: {e}")).with_raw_value(raw))?;
        let mut coerced = Vec::with_capacity(elements.len());
        for element in elements {
            let value = convert_element(field, &element)
                .map_err(|e| ValidationError::for_field(field, e).with_raw_value(raw))?;
            coerced.push(value);
        }
        return Ok(Some(FieldValue::Array(coerced)));
    }

    let value = convert_scalar(field, raw, false)
        .map_err(|e| ValidationError::for_field(field, e).with_raw_value(raw))?;

    // A value that coerced to the empty string counts as absent.
    match value {
        Some(FieldValue::String(s)) if s.is_empty() => Ok(None),
        other => Ok(other),
    }
}

/// Structural array parse with markdown bullet-list fallback.
fn parse_array_elements(raw: &str) -> Result<Vec<serde_json::Value>, String> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => Ok(items),
        Ok(_) => Err("Expected an array".to_string()),
        Err(_) => {
            let items = parse_markdown_list(raw)?;
            Ok(items.into_iter().map(serde_json::Value::String).collect())
        }
    }
}

/// Coerces one parsed array element to the field's scalar kind.
fn convert_element(field: &Field, element: &serde_json::Value) -> Result<FieldValue, String> {
    match element {
        serde_json::Value::String(s) => convert_scalar(field, s.trim(), true)?
            .ok_or_else(|| "Required field is missing".to_string()),
        serde_json::Value::Number(n) => match field.ty.kind {
            FieldKind::Number => n
                .as_f64()
                .map(FieldValue::Number)
                .ok_or_else(|| "Invalid number".to_string()),
            FieldKind::String => Ok(FieldValue::String(n.to_string())),
            FieldKind::Json => Ok(FieldValue::Json(element.clone())),
            _ => Err(format!("Invalid {}", field.ty.kind)),
        },
        serde_json::Value::Bool(b) => match field.ty.kind {
            FieldKind::Boolean => Ok(FieldValue::Bool(*b)),
            FieldKind::String => Ok(FieldValue::String(b.to_string())),
            FieldKind::Json => Ok(FieldValue::Json(element.clone())),
            _ => Err(format!("Invalid {}", field.ty.kind)),
        },
        other => match field.ty.kind {
            FieldKind::Json => Ok(FieldValue::Json(other.clone())),
            _ => Err(format!("Invalid {}", field.ty.kind)),
        },
    }
}

/// Converts a scalar span. `required` forces required semantics for array
/// elements regardless of the field's own optionality.
fn convert_scalar(field: &Field, raw: &str, required: bool) -> Result<Option<FieldValue>, String> {
    let lenient = field.is_optional && !required;
    match field.ty.kind {
        FieldKind::Code => Ok(Some(FieldValue::String(extract_block(raw).to_string()))),
        FieldKind::String | FieldKind::Url | FieldKind::File | FieldKind::Image | FieldKind::Audio => {
            Ok(Some(FieldValue::String(raw.to_string())))
        }
        FieldKind::Number => match raw.parse::<f64>() {
            Ok(n) => Ok(Some(FieldValue::Number(n))),
            Err(_) if lenient => Ok(None),
            Err(_) => Err("Invalid number".to_string()),
        },
        FieldKind::Boolean => match raw.to_lowercase().as_str() {
            "true" => Ok(Some(FieldValue::Bool(true))),
            "false" => Ok(Some(FieldValue::Bool(false))),
            _ if lenient => Ok(None),
            _ => Err("Invalid boolean".to_string()),
        },
        FieldKind::Date => match parse_llm_date(raw) {
            Ok(date) => Ok(Some(FieldValue::Date(date))),
            Err(_) if lenient => Ok(None),
            Err(e) => Err(e),
        },
        FieldKind::DateTime => match parse_llm_datetime(raw) {
            Ok(datetime) => Ok(Some(FieldValue::DateTime(datetime))),
            Err(_) if lenient => Ok(None),
            Err(e) => Err(e),
        },
        FieldKind::Class => {
            let options = field.ty.options.as_deref().unwrap_or_default();
            if options.iter().any(|o| o == raw) {
                Ok(Some(FieldValue::String(raw.to_string())))
            } else if field.is_optional {
                Ok(None)
            } else {
                Err(format!(
                    "Invalid class '{raw}', expected one of the following: {}",
                    options.join(", ")
                ))
            }
        }
        FieldKind::Json => Ok(Some(FieldValue::String(raw.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::FieldSpec;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn field(spec: FieldSpec) -> Field {
        spec.into_field("sampleField")
    }

    #[test]
    fn test_string_passes_through() {
        let f = field(FieldSpec::string());
        assert_eq!(
            validate_and_parse(&f, "hello").unwrap(),
            Some(FieldValue::String("hello".to_string()))
        );
    }

    #[test]
    fn test_number_and_boolean() {
        let f = field(FieldSpec::number());
        assert_eq!(validate_and_parse(&f, "42").unwrap(), Some(FieldValue::Number(42.0)));
        assert!(validate_and_parse(&f, "forty-two").is_err());

        let f = field(FieldSpec::boolean());
        assert_eq!(validate_and_parse(&f, "TRUE").unwrap(), Some(FieldValue::Bool(true)));
        assert!(validate_and_parse(&f, "yes").is_err());
    }

    #[test]
    fn test_optional_lenient_coercion() {
        let f = field(FieldSpec::number().optional());
        assert_eq!(validate_and_parse(&f, "not a number").unwrap(), None);
    }

    #[test]
    fn test_absent_spans() {
        let optional = field(FieldSpec::string().optional());
        assert_eq!(validate_and_parse(&optional, "").unwrap(), None);
        assert_eq!(validate_and_parse(&optional, "null").unwrap(), None);
        assert_eq!(validate_and_parse(&optional, "UNDEFINED").unwrap(), None);

        let required = field(FieldSpec::string());
        let err = validate_and_parse(&required, "null").unwrap_err();
        assert!(err.message.contains("Required field is missing"));
        assert_eq!(err.fields[0].name, "sampleField");
    }

    #[test]
    fn test_class_options() {
        let f = field(FieldSpec::class(["positive", "negative"]));
        assert_eq!(
            validate_and_parse(&f, "positive").unwrap(),
            Some(FieldValue::String("positive".to_string()))
        );

        let err = validate_and_parse(&f, "neutral").unwrap_err();
        assert!(err.message.contains("positive, negative"));

        // Case matters.
        assert!(validate_and_parse(&f, "Positive").is_err());
    }

    #[test]
    fn test_json_with_and_without_fence() {
        let f = field(FieldSpec::json());
        let value = validate_and_parse(&f, "{\"k\": 1}").unwrap().unwrap();
        assert_eq!(value, FieldValue::Json(serde_json::json!({"k": 1})));

        let fenced = "```json\n{\"k\": 2}\n```";
        let value = validate_and_parse(&f, fenced).unwrap().unwrap();
        assert_eq!(value, FieldValue::Json(serde_json::json!({"k": 2})));

        let err = validate_and_parse(&f, "{broken").unwrap_err();
        assert!(err.message.starts_with("Invalid JSON"));
    }

    #[test]
    fn test_code_fence_stripping() {
        let f = field(FieldSpec::code());
        let fenced = "```rust\nfn main() {}\n```";
        assert_eq!(
            validate_and_parse(&f, fenced).unwrap(),
            Some(FieldValue::String("fn main() {}".to_string()))
        );
        assert_eq!(
            validate_and_parse(&f, "fn main() {}").unwrap(),
            Some(FieldValue::String("fn main() {}".to_string()))
        );
    }

    #[test]
    fn test_json_array() {
        let f = field(FieldSpec::number().array());
        let value = validate_and_parse(&f, "[1, 2, 3]").unwrap().unwrap();
        assert_eq!(
            value,
            FieldValue::Array(vec![
                FieldValue::Number(1.0),
                FieldValue::Number(2.0),
                FieldValue::Number(3.0)
            ])
        );
    }

    #[test]
    fn test_markdown_list_fallback() {
        let f = field(FieldSpec::string().array());
        let value = validate_and_parse(&f, "- alpha\n- beta\n1. gamma").unwrap().unwrap();
        assert_eq!(
            value,
            FieldValue::Array(vec![
                FieldValue::String("alpha".to_string()),
                FieldValue::String("beta".to_string()),
                FieldValue::String("gamma".to_string())
            ])
        );
    }

    #[test]
    fn test_array_failures_name_the_field() {
        let f = field(FieldSpec::string().array());
        let err = validate_and_parse(&f, "just prose, not a list").unwrap_err();
        assert!(err.message.starts_with("Invalid Array"));
        assert_eq!(err.fields[0].name, "sampleField");

        let f = field(FieldSpec::number().array());
        let err = validate_and_parse(&f, "[1, \"two\"]").unwrap_err();
        assert!(err.message.contains("Invalid number"));
    }

    #[test]
    fn test_date_coercion() {
        let f = field(FieldSpec::date());
        assert_eq!(
            validate_and_parse(&f, "2024-01-15").unwrap(),
            Some(FieldValue::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()))
        );
        assert!(validate_and_parse(&f, "someday").is_err());
    }

    #[test]
    fn test_extract_block_requires_full_fence() {
        assert_eq!(extract_block("```py\nx = 1\n```"), "x = 1");
        assert_eq!(extract_block("no fence here"), "no fence here");
        // An unterminated fence is left alone.
        assert_eq!(extract_block("```py\nx = 1"), "```py\nx = 1");
    }
}
