//! Typed values produced by extraction and consumed by prompt rendering.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// A single field value.
///
/// Output fields are populated by the extractor according to their declared
/// type; input fields are supplied by the caller. Media variants carry their
/// payload as base64 text, matching the chat wire representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Plain text, also used for `code` fields.
    String(String),
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Bool(bool),
    /// Structurally parsed JSON value.
    Json(serde_json::Value),
    /// Calendar date.
    Date(NaiveDate),
    /// Timestamp, normalized to UTC.
    DateTime(DateTime<Utc>),
    /// Array of element values.
    Array(Vec<FieldValue>),
    /// Image or file payload (base64 data plus MIME type).
    #[serde(rename_all = "camelCase")]
    Media {
        /// MIME type of the payload.
        mime_type: String,
        /// Base64-encoded payload.
        data: String,
    },
    /// Audio payload.
    Audio {
        /// Audio container format, e.g. `wav`.
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        /// Base64-encoded payload.
        data: String,
    },
}

impl FieldValue {
    /// Builds a media value from raw bytes, base64-encoding the payload.
    #[must_use]
    pub fn image(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::Media {
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    /// Builds an audio value from raw bytes, base64-encoding the payload.
    #[must_use]
    pub fn audio(format: Option<String>, bytes: &[u8]) -> Self {
        Self::Audio {
            format,
            data: STANDARD.encode(bytes),
        }
    }

    /// Returns the string content, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric content, if this is a number value.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a boolean value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the elements, if this is an array value.
    #[must_use]
    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(items: Vec<FieldValue>) -> Self {
        Self::Array(items)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Mapping from field name to its value.
pub type ValueMap = HashMap<String, FieldValue>;

/// Serializes a value map to a JSON object, for trace records and logging.
#[must_use]
pub fn value_map_to_json(values: &ValueMap) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = values
        .iter()
        .map(|(k, v)| {
            let json = serde_json::to_value(v).unwrap_or(serde_json::Value::Null);
            (k.clone(), json)
        })
        .collect();
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_image_value_is_base64_encoded() {
        let value = FieldValue::image("image/png", b"abc");
        match value {
            FieldValue::Media { mime_type, data } => {
                assert_eq!(mime_type, "image/png");
                assert_eq!(data, STANDARD.encode(b"abc"));
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_untagged_serialization() {
        let value = FieldValue::Number(42.0);
        assert_eq!(serde_json::json!(42.0), serde_json::to_value(&value).unwrap());

        let value = FieldValue::Array(vec!["a".into(), "b".into()]);
        assert_eq!(serde_json::json!(["a", "b"]), serde_json::to_value(&value).unwrap());
    }

    #[test]
    fn test_value_map_to_json() {
        let mut values = ValueMap::new();
        values.insert("answer".to_string(), FieldValue::String("Paris".to_string()));
        values.insert("score".to_string(), FieldValue::Number(0.5));

        let json = value_map_to_json(&values);
        assert_eq!(json["answer"], "Paris");
        assert_eq!(json["score"], 0.5);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(FieldValue::from("x").as_str(), Some("x"));
        assert_eq!(FieldValue::from(1.5).as_f64(), Some(1.5));
        assert_eq!(FieldValue::from(true).as_bool(), Some(true));
        assert!(FieldValue::from(1.5).as_str().is_none());
    }
}
