//! Caller-supplied assertions over partial and final values.

use std::sync::Arc;

use crate::errors::AssertionError;
use crate::signature::Signature;
use crate::values::ValueMap;

use crate::extract::ExtractionState;

type AssertFn = dyn Fn(&ValueMap) -> Option<bool> + Send + Sync;
type StreamingAssertFn = dyn Fn(&str) -> Option<bool> + Send + Sync;

/// A predicate over the values extracted so far.
///
/// Returning `None` means "not applicable yet" (e.g. the checked field has
/// no value); `Some(false)` fails the attempt and drives a corrective
/// retry.
#[derive(Clone)]
pub struct Assertion {
    check: Arc<AssertFn>,
    message: Option<String>,
    optional: bool,
}

impl Assertion {
    /// Creates an assertion from a predicate.
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&ValueMap) -> Option<bool> + Send + Sync + 'static,
    {
        Self {
            check: Arc::new(check),
            message: None,
            optional: false,
        }
    }

    /// Attaches the message rendered into corrective instructions.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Marks the assertion optional: once retries are exhausted its
    /// captured values are returned instead of failing.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn run(&self, values: &ValueMap) -> Result<(), AssertionError> {
        match (self.check)(values) {
            Some(false) => Err(AssertionError::new(
                self.message.clone(),
                self.optional,
                values.clone(),
            )),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Assertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assertion")
            .field("message", &self.message)
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}

/// A predicate over one field's partial text while it streams.
///
/// Runs only while the named field is the one currently receiving content,
/// so a violation aborts the attempt mid-stream rather than at the end.
#[derive(Clone)]
pub struct StreamingAssertion {
    field: String,
    check: Arc<StreamingAssertFn>,
    message: Option<String>,
    optional: bool,
}

impl StreamingAssertion {
    /// Creates a streaming assertion for a field.
    pub fn new<F>(field: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str) -> Option<bool> + Send + Sync + 'static,
    {
        Self {
            field: field.into(),
            check: Arc::new(check),
            message: None,
            optional: false,
        }
    }

    /// Attaches the message rendered into corrective instructions.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Marks the assertion optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

impl std::fmt::Debug for StreamingAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingAssertion")
            .field("field", &self.field)
            .field("message", &self.message)
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}

/// Runs every assertion against the values extracted so far.
pub fn check_assertions(assertions: &[Assertion], values: &ValueMap) -> Result<(), AssertionError> {
    for assertion in assertions {
        assertion.run(values)?;
    }
    Ok(())
}

/// Runs streaming assertions against the currently open field's partial
/// text.
pub fn check_streaming_assertions(
    assertions: &[StreamingAssertion],
    signature: &Signature,
    state: &ExtractionState,
    content: &str,
    values: &ValueMap,
) -> Result<(), AssertionError> {
    if assertions.is_empty() {
        return Ok(());
    }
    let Some(open_index) = state.open_field().index() else {
        return Ok(());
    };
    let open_field = &signature.output_fields()[open_index];
    let partial = content[state.cursor()..].trim_start();

    for assertion in assertions {
        if assertion.field != open_field.name {
            continue;
        }
        if let Some(false) = (assertion.check)(partial) {
            return Err(AssertionError::new(
                assertion.message.clone(),
                assertion.optional,
                values.clone(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{streaming_extract_values, ExtractOptions};
    use crate::values::FieldValue;

    #[test]
    fn test_assertion_skip_and_fail() {
        let assertion = Assertion::new(|values| {
            values.get("answerText").map(|v| v.as_str() != Some("bad"))
        })
        .with_message("answer must not be 'bad'");

        // Not applicable yet.
        assert!(check_assertions(&[assertion.clone()], &ValueMap::new()).is_ok());

        let mut values = ValueMap::new();
        values.insert("answerText".into(), FieldValue::String("bad".into()));
        let err = check_assertions(&[assertion], &values).unwrap_err();
        assert!(err.to_string().contains("must not be 'bad'"));
        assert_eq!(err.values["answerText"], FieldValue::String("bad".into()));
    }

    #[test]
    fn test_streaming_assertion_sees_open_field_partial() {
        let signature = Signature::parse("questionText -> answerText").unwrap();
        let mut values = ValueMap::new();
        let mut state = ExtractionState::new();
        let content = "Answer Text: the forbidden word";
        streaming_extract_values(
            &signature,
            &mut values,
            &mut state,
            content,
            ExtractOptions::default(),
        )
        .unwrap();

        let assertion = StreamingAssertion::new("answerText", |partial| {
            Some(!partial.contains("forbidden"))
        })
        .with_message("must not mention the forbidden word");

        let err = check_streaming_assertions(&[assertion], &signature, &state, content, &values)
            .unwrap_err();
        assert!(!err.optional);
        assert!(err.to_string().contains("forbidden"));
    }

    #[test]
    fn test_streaming_assertion_ignores_other_fields() {
        let signature = Signature::parse("questionText -> answerText, noteText:string").unwrap();
        let mut values = ValueMap::new();
        let mut state = ExtractionState::new();
        let content = "Answer Text: fine";
        streaming_extract_values(
            &signature,
            &mut values,
            &mut state,
            content,
            ExtractOptions::default(),
        )
        .unwrap();

        let assertion = StreamingAssertion::new("noteText", |_| Some(false));
        assert!(
            check_streaming_assertions(&[assertion], &signature, &state, content, &values).is_ok()
        );
    }
}
