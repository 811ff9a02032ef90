//! Error types for extraction, assertions, and generation.
//!
//! The taxonomy follows the recovery policy: [`ValidationError`] and
//! [`AssertionError`] are recoverable inside a generation (they become
//! corrective conversation turns), everything else surfaces to the caller
//! through [`GenerateError`].

use serde::Serialize;
use thiserror::Error;

use crate::signature::Field;
use crate::values::ValueMap;

/// Lightweight reference to a schema field, carried inside errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldRef {
    /// Field name as declared in the signature.
    pub name: String,
    /// Human-readable title used as the wire prefix.
    pub title: String,
    /// Declared type, rendered (`string`, `number[]`, ...).
    pub type_name: String,
    /// Field description, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&Field> for FieldRef {
    fn from(field: &Field) -> Self {
        Self {
            name: field.name.clone(),
            title: field.title.clone(),
            type_name: field.ty.to_string(),
            description: field.description.clone(),
        }
    }
}

/// One corrective instruction rendered back into the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixingInstruction {
    /// The field the instruction concerns, if it concerns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldRef>,
    /// What went wrong and what to produce instead.
    pub message: String,
}

impl std::fmt::Display for FixingInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "`{}` ({}): {}", field.name, field.title, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Extraction or type-coercion failure.
///
/// Always names the offending field(s); recoverable — the controller turns
/// it into fixing instructions and retries.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// What failed.
    pub message: String,
    /// The fields the failure concerns.
    pub fields: Vec<FieldRef>,
    /// The raw text span that failed to coerce, if any.
    pub raw_value: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.fields.is_empty() {
            write!(f, "{}", self.message)
        } else {
            let names: Vec<&str> = self.fields.iter().map(|fr| fr.name.as_str()).collect();
            write!(f, "{}: {}", self.message, names.join(", "))
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    /// Creates a validation error for a single field.
    #[must_use]
    pub fn for_field(field: &Field, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: vec![FieldRef::from(field)],
            raw_value: None,
        }
    }

    /// Creates a validation error naming several fields.
    #[must_use]
    pub fn for_fields(fields: Vec<FieldRef>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields,
            raw_value: None,
        }
    }

    /// Attaches the raw text span that failed to coerce.
    #[must_use]
    pub fn with_raw_value(mut self, value: impl Into<String>) -> Self {
        self.raw_value = Some(value.into());
        self
    }

    /// Renders this error into per-field corrective instructions.
    #[must_use]
    pub fn fixing_instructions(&self) -> Vec<FixingInstruction> {
        if self.fields.is_empty() {
            return vec![FixingInstruction {
                field: None,
                message: self.message.clone(),
            }];
        }
        self.fields
            .iter()
            .map(|field| {
                let mut message = format!(
                    "{}. Provide `{}:` with a {} value",
                    self.message, field.title, field.type_name
                );
                if let Some(desc) = &field.description {
                    message.push_str(&format!(" ({desc})"));
                }
                message.push('.');
                FixingInstruction {
                    field: Some(field.clone()),
                    message,
                }
            })
            .collect()
    }
}

/// Caller-supplied predicate failure over partial or final values.
#[derive(Debug, Clone)]
pub struct AssertionError {
    /// Why the predicate rejected the values, if a message was supplied.
    pub message: Option<String>,
    /// Optional assertions fall back to their captured values once retries
    /// are exhausted instead of failing the generation.
    pub optional: bool,
    /// The values captured when the assertion failed.
    pub values: ValueMap,
}

impl std::fmt::Display for AssertionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "assertion failed: {message}"),
            None => write!(f, "assertion failed"),
        }
    }
}

impl std::error::Error for AssertionError {}

impl AssertionError {
    /// Creates a new assertion error.
    #[must_use]
    pub fn new(message: Option<String>, optional: bool, values: ValueMap) -> Self {
        Self {
            message,
            optional,
            values,
        }
    }

    /// Renders this error into a corrective instruction.
    #[must_use]
    pub fn fixing_instructions(&self) -> Vec<FixingInstruction> {
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| "the response did not satisfy a required constraint".to_string());
        vec![FixingInstruction {
            field: None,
            message,
        }]
    }
}

/// Signature construction or mutation failure.
#[derive(Debug, Clone)]
pub struct SignatureError {
    /// What is wrong with the signature.
    pub message: String,
    /// The field involved, if the failure concerns one.
    pub field: Option<String>,
    /// How to fix it.
    pub suggestion: Option<String>,
}

impl std::fmt::Display for SignatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "invalid signature field '{field}': {}", self.message)?,
            None => write!(f, "invalid signature: {}", self.message)?,
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for SignatureError {}

impl SignatureError {
    /// Creates a new signature error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
            suggestion: None,
        }
    }

    /// Creates a signature error for a specific field.
    #[must_use]
    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: Some(field.into()),
            suggestion: None,
        }
    }

    /// Attaches a fix suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Terminal errors surfaced by a generation.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The signature itself is invalid.
    #[error("{0}")]
    Signature(#[from] SignatureError),

    /// A validation failure that could not be handled locally
    /// (e.g. invalid caller inputs at prompt-render time).
    #[error("{0}")]
    Validation(ValidationError),

    /// An assertion failure that could not be handled locally.
    #[error("{0}")]
    Assertion(AssertionError),

    /// The model stopped because it ran out of tokens.
    #[error("max tokens reached before completion")]
    Truncated,

    /// The conversation memory holds no prompt to send.
    #[error("no chat prompt found")]
    EmptyPrompt,

    /// The model requested tool calls but no tools are registered.
    #[error("tool calls requested but no tools are defined")]
    ToolsNotDefined,

    /// The chat transport failed.
    #[error("chat service error: {0}")]
    Service(String),

    /// The retry budget ran out without resolving the last failure.
    #[error("unable to fix validation error after {retries} retries: {last_error}")]
    RetriesExhausted {
        /// Retry budget that was exhausted.
        retries: usize,
        /// The last recoverable failure, rendered.
        last_error: String,
    },

    /// The step budget ran out.
    #[error("max steps reached: {0}")]
    MaxStepsReached(usize),
}

/// Failure of a single generation attempt, split by how the controller
/// reacts to it.
///
/// Recoverable variants carry everything needed to render a corrective turn;
/// [`AttemptError::Fatal`] aborts both loops. Dispatching on this enum keeps
/// the controller's error handling exhaustive instead of relying on runtime
/// type tests.
#[derive(Debug)]
pub enum AttemptError {
    /// Extraction or coercion failed; retry with fixing instructions.
    Validation(ValidationError),
    /// A caller predicate failed; retry with fixing instructions.
    Assertion(AssertionError),
    /// Not retryable; abort the generation.
    Fatal(GenerateError),
}

impl AttemptError {
    /// Corrective instructions for recoverable failures; `None` when fatal.
    #[must_use]
    pub fn fixing_instructions(&self) -> Option<Vec<FixingInstruction>> {
        match self {
            Self::Validation(e) => Some(e.fixing_instructions()),
            Self::Assertion(e) => Some(e.fixing_instructions()),
            Self::Fatal(_) => None,
        }
    }

    /// The failure, rendered for budget-exhaustion reports.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::Assertion(e) => e.to_string(),
            Self::Fatal(e) => e.to_string(),
        }
    }
}

impl From<ValidationError> for AttemptError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<AssertionError> for AttemptError {
    fn from(e: AssertionError) -> Self {
        Self::Assertion(e)
    }
}

impl From<GenerateError> for AttemptError {
    fn from(e: GenerateError) -> Self {
        Self::Fatal(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::FieldSpec;

    fn sample_field() -> Field {
        FieldSpec::number().describe("the answer").into_field("answerValue")
    }

    #[test]
    fn test_validation_error_names_fields() {
        let field = sample_field();
        let err = ValidationError::for_field(&field, "Invalid number");
        assert_eq!(err.to_string(), "Invalid number: answerValue");
    }

    #[test]
    fn test_fixing_instructions_mention_title_and_type() {
        let field = sample_field();
        let err = ValidationError::for_field(&field, "Invalid number");
        let instructions = err.fixing_instructions();
        assert_eq!(instructions.len(), 1);
        assert!(instructions[0].message.contains("Answer Value:"));
        assert!(instructions[0].message.contains("number"));
    }

    #[test]
    fn test_assertion_error_display() {
        let err = AssertionError::new(Some("too short".to_string()), false, ValueMap::new());
        assert_eq!(err.to_string(), "assertion failed: too short");
    }

    #[test]
    fn test_signature_error_suggestion() {
        let err = SignatureError::for_field("x", "name is too short")
            .with_suggestion("use at least two characters");
        assert!(err.to_string().contains("name is too short"));
        assert!(err.to_string().contains("use at least two characters"));
    }

    #[test]
    fn test_attempt_error_split() {
        let field = sample_field();
        let recoverable = AttemptError::from(ValidationError::for_field(&field, "bad"));
        assert!(recoverable.fixing_instructions().is_some());

        let fatal = AttemptError::from(GenerateError::Truncated);
        assert!(fatal.fixing_instructions().is_none());
    }
}
