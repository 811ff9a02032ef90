//! The incremental field-extraction state machine.
//!
//! [`streaming_extract_values`] consumes progressively longer prefixes of
//! the accumulated response text and assigns spans to output fields in
//! declared order, without re-scanning previously finalized spans.
//! [`streaming_extract_final_value`] closes out the attempt once the text is
//! complete. [`extract_values`] wraps both for buffered responses.

use tracing::trace;

use crate::errors::{FieldRef, ValidationError};
use crate::signature::{Field, Signature};
use crate::values::ValueMap;

use super::coerce::validate_and_parse;
use super::matcher::{scan_for_prefix, PrefixScan};
use super::state::{CapturedSpan, ExtractionState, OpenField};

/// Options controlling an extraction pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Strict mode requires every required field to be introduced by an
    /// explicit prefix and disables the assumed-field fallback.
    pub strict: bool,
}

/// The wire prefix introducing a field's content. Every prefix after the
/// first is preceded by a newline.
fn field_prefix(field: &Field, is_first: bool) -> String {
    if is_first {
        format!("{}:", field.title)
    } else {
        format!("\n{}:", field.title)
    }
}

fn expected_field_error(field: &Field) -> ValidationError {
    ValidationError::for_field(field, "Expected (Required) field not found")
}

/// Advances the extraction state over the text accumulated so far.
///
/// Safe to call repeatedly with the same state and ever-longer `content`;
/// a pass that needs more input returns without mutating the state.
pub fn streaming_extract_values(
    signature: &Signature,
    values: &mut ValueMap,
    state: &mut ExtractionState,
    content: &str,
    options: ExtractOptions,
) -> Result<(), ValidationError> {
    let fields = signature.output_fields();
    let mut expected: Option<&Field> = None;

    for (index, field) in fields.iter().enumerate() {
        let open_here = state.open.index() == Some(index);
        let assumed_here = open_here && state.open.is_assumed();

        // The explicitly open field keeps accumulating; only an assumed one
        // is revisited (it may need reconciling).
        if open_here && !assumed_here {
            continue;
        }
        if values.contains_key(&field.name) && !assumed_here {
            continue;
        }

        let is_first = state.extracted.is_empty();
        let prefix = field_prefix(field, is_first);
        let mut prefix_len = prefix.len();
        let mut assume = false;

        let found_at = match scan_for_prefix(content, &prefix, state.cursor) {
            PrefixScan::Found(at) => at,
            PrefixScan::Partial | PrefixScan::WhitespaceOnly => return Ok(()),
            PrefixScan::FenceOnly => {
                state.in_fence = true;
                return Ok(());
            }
            PrefixScan::NotFound => {
                // Single-output-field responses may stream without any
                // prefix at all (non-strict only).
                if !options.strict && fields.len() == 1 && state.open.is_none() {
                    assume = true;
                    expected = Some(field);
                    prefix_len = 0;
                    state.cursor
                } else if state.open.is_none() && state.extracted.is_empty() {
                    if options.strict && !field.is_optional {
                        return Err(expected_field_error(field));
                    }
                    if options.strict {
                        expected = if field.is_optional { None } else { Some(field) };
                        continue;
                    }
                    // Before handing un-prefixed content to the first
                    // field, make sure no field's prefix appears anywhere
                    // ahead in the unconsumed buffer.
                    let any_prefix_ahead = fields[index..].iter().any(|future| {
                        let future_prefix = field_prefix(future, state.extracted.is_empty());
                        matches!(
                            scan_for_prefix(content, &future_prefix, state.cursor),
                            PrefixScan::Found(_)
                        )
                    });
                    if any_prefix_ahead {
                        expected = if field.is_optional { None } else { Some(field) };
                        continue;
                    }
                    trace!(field = %field.name, "assuming un-prefixed content belongs to first field");
                    assume = true;
                    expected = Some(field);
                    prefix_len = 0;
                    state.cursor
                } else {
                    expected = if field.is_optional { None } else { Some(field) };
                    continue;
                }
            }
        };

        // A prefix was found (or assumed). If an earlier required field was
        // expected first, the response is out of order.
        if let Some(expected_field) = expected {
            if expected_field.name != field.name {
                return Err(expected_field_error(expected_field));
            }
        }

        // Reconcile a tentatively assumed field now that an explicit prefix
        // exists: assign it the accumulated text, whether the match is the
        // same field (the prefixed span will overwrite below) or another.
        if let OpenField::Assumed { index: open_index } = state.open {
            let open_field = &fields[open_index];
            let span = content[state.cursor..found_at].trim();
            if !span.is_empty() {
                if let Some(value) = validate_and_parse(open_field, span)? {
                    values.insert(open_field.name.clone(), value);
                }
            }
            state.streamed.insert(open_field.name.clone(), 0);
            state.open = OpenField::None;
        }

        // Close out the explicitly open field with the span up to the new
        // prefix.
        if let OpenField::Explicit { index: open_index } = state.open {
            let open_field = &fields[open_index];
            let span = content[state.cursor..found_at].trim();
            if let Some(value) = validate_and_parse(open_field, span)? {
                values.insert(open_field.name.clone(), value);
            }
            state.captured.push(CapturedSpan {
                index: open_index,
                start: state.cursor,
                end: found_at,
            });
            state.open = OpenField::None;
        }

        // Open the newly found field just past its prefix.
        state.cursor = found_at + prefix_len;
        state.open = if assume {
            OpenField::Assumed { index }
        } else {
            OpenField::Explicit { index }
        };
        if !state.extracted.contains(&index) {
            state.extracted.push(index);
        }
        state.streamed.entry(field.name.clone()).or_insert(0);
    }

    Ok(())
}

/// Closes out extraction at the end of an attempt.
///
/// Assigns the remaining text to the open field, enforces strict-mode
/// prefix requirements, rescans the full text for optional fields the
/// incremental pass skipped, and verifies every required output field has a
/// value.
pub fn streaming_extract_final_value(
    signature: &Signature,
    values: &mut ValueMap,
    state: &mut ExtractionState,
    content: &str,
    strict: bool,
) -> Result<(), ValidationError> {
    let fields = signature.output_fields();

    if let Some(open_index) = state.open.index() {
        let field = &fields[open_index];
        let span = content[state.cursor..].trim();
        if let Some(value) = validate_and_parse(field, span)? {
            values.insert(field.name.clone(), value);
        }
    }

    // Strict mode: content with no field prefix at all is an error, blamed
    // on the first required field.
    if strict && state.open.is_none() && state.extracted.is_empty() && !content.trim().is_empty() {
        if let Some(first_required) = fields.iter().find(|f| !f.is_optional) {
            return Err(ValidationError::for_field(
                first_required,
                "Expected field not found",
            ));
        }
        // Only optional fields exist: un-prefixed content is ignored.
    }

    parse_optional_fields_from_full_content(signature, values, content);

    check_missing_required_fields(signature, values)
}

/// Recovers optional fields whose prefix appears anywhere in the full text
/// but which never became the current field during the incremental scan.
fn parse_optional_fields_from_full_content(
    signature: &Signature,
    values: &mut ValueMap,
    content: &str,
) {
    let fields = signature.output_fields();

    for field in fields {
        if !field.is_optional || values.contains_key(&field.name) {
            continue;
        }

        let prefix = format!("{}:", field.title);
        let Some(found) = content.find(&prefix) else {
            continue;
        };

        let start = found + prefix.len();
        let mut end = content.len();
        for other in fields {
            if other.name == field.name {
                continue;
            }
            let other_prefix = format!("{}:", other.title);
            if let Some(other_found) = content[start..].find(&other_prefix) {
                end = end.min(start + other_found);
            }
        }

        let span = content[start..end].trim();
        if span.is_empty() {
            continue;
        }
        // A fallback pass; coercion failures on optional fields are not
        // errors here.
        if let Ok(Some(value)) = validate_and_parse(field, span) {
            values.insert(field.name.clone(), value);
        }
    }
}

/// Verifies every non-optional output field has a value, aggregating all
/// missing fields into one error.
pub fn check_missing_required_fields(
    signature: &Signature,
    values: &ValueMap,
) -> Result<(), ValidationError> {
    let missing: Vec<FieldRef> = signature
        .output_fields()
        .iter()
        .filter(|field| !field.is_optional && !values.contains_key(&field.name))
        .map(FieldRef::from)
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    let message = if missing.len() == 1 {
        "Required field not found"
    } else {
        "Required fields not found"
    };
    Err(ValidationError::for_fields(missing, message))
}

/// One-pass extraction over a complete response text.
///
/// Internal fields are extracted (and validated) but removed from `values`
/// before returning.
pub fn extract_values(
    signature: &Signature,
    values: &mut ValueMap,
    content: &str,
    strict: bool,
) -> Result<(), ValidationError> {
    let mut state = ExtractionState::new();
    streaming_extract_values(signature, values, &mut state, content, ExtractOptions { strict })?;
    streaming_extract_final_value(signature, values, &mut state, content, strict)?;

    for field in signature.output_fields() {
        if field.is_internal {
            values.remove(&field.name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::FieldValue;
    use pretty_assertions::assert_eq;

    fn sig(dsl: &str) -> Signature {
        Signature::parse(dsl).unwrap()
    }

    #[test]
    fn test_all_fields_in_order() {
        let signature = sig("questionText -> nameText:string, ageValue:number");
        let mut values = ValueMap::new();
        extract_values(&signature, &mut values, "Name Text: Bob\nAge Value: 42", false).unwrap();

        assert_eq!(values.len(), 2);
        assert_eq!(values["nameText"], FieldValue::String("Bob".to_string()));
        assert_eq!(values["ageValue"], FieldValue::Number(42.0));
    }

    #[test]
    fn test_single_field_without_prefix_assumed() {
        let signature = sig("questionText -> answerText");
        let mut values = ValueMap::new();
        extract_values(&signature, &mut values, "Paris", false).unwrap();
        assert_eq!(values["answerText"], FieldValue::String("Paris".to_string()));
    }

    #[test]
    fn test_single_field_without_prefix_strict_fails() {
        let signature = sig("questionText -> answerText");
        let mut values = ValueMap::new();
        let err = extract_values(&signature, &mut values, "Paris", true).unwrap_err();
        assert_eq!(err.fields[0].name, "answerText");
    }

    #[test]
    fn test_missing_required_field_named_exactly() {
        let signature = sig("questionText -> nameText:string, ageValue:number");
        let mut values = ValueMap::new();
        let err = extract_values(&signature, &mut values, "Name Text: Bob", false).unwrap_err();
        assert_eq!(err.fields.len(), 1);
        assert_eq!(err.fields[0].name, "ageValue");
        assert!(err.message.contains("Required field not found"));
    }

    #[test]
    fn test_missing_required_fields_aggregated() {
        let signature = sig("questionText -> aaText:string, bbValue:number, ccText:string");
        let mut values = ValueMap::new();
        let err = extract_values(&signature, &mut values, "Aa Text: hi", false).unwrap_err();
        let names: Vec<&str> = err.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["bbValue", "ccText"]);
        assert!(err.message.contains("Required fields not found"));
    }

    #[test]
    fn test_omitted_optional_field_is_not_an_error() {
        let signature = sig("questionText -> nameText:string, nickText?:string");
        let mut values = ValueMap::new();
        extract_values(&signature, &mut values, "Name Text: Bob", false).unwrap();
        assert_eq!(values.len(), 1);
        assert!(!values.contains_key("nickText"));
    }

    #[test]
    fn test_required_field_out_of_order_reports_expected() {
        let signature = sig("questionText -> nameText:string, ageValue:number");
        let mut values = ValueMap::new();
        let err = extract_values(&signature, &mut values, "Age Value: 42", false).unwrap_err();
        assert_eq!(err.fields[0].name, "nameText");
        assert!(err.message.contains("Expected (Required) field not found"));
    }

    #[test]
    fn test_incremental_needs_more_input() {
        let signature = sig("questionText -> nameText:string, ageValue:number");
        let mut values = ValueMap::new();
        let mut state = ExtractionState::new();
        let options = ExtractOptions::default();

        // Mid-prefix: no state change, no value.
        streaming_extract_values(&signature, &mut values, &mut state, "Name Te", options).unwrap();
        assert!(values.is_empty());
        assert!(state.open_field().is_none());

        streaming_extract_values(&signature, &mut values, &mut state, "Name Text: Bob\nAge Va", options)
            .unwrap();
        // Name closed out once the next prefix partial-matches? Not yet —
        // the second prefix is still partial, so name stays open.
        assert!(values.is_empty());
        assert_eq!(state.open_field().index(), Some(0));

        let full = "Name Text: Bob\nAge Value: 42";
        streaming_extract_values(&signature, &mut values, &mut state, full, options).unwrap();
        assert_eq!(values["nameText"], FieldValue::String("Bob".to_string()));
        assert_eq!(state.open_field().index(), Some(1));

        streaming_extract_final_value(&signature, &mut values, &mut state, full, false).unwrap();
        assert_eq!(values["ageValue"], FieldValue::Number(42.0));
    }

    #[test]
    fn test_streaming_matches_buffered_for_any_chunking() {
        let signature = sig("questionText -> nameText:string, ageValue:number, tagsList:string[]");
        let full = "Name Text: Bob\nAge Value: 42\nTags List: [\"x\", \"y\"]";

        let mut buffered = ValueMap::new();
        extract_values(&signature, &mut buffered, full, false).unwrap();

        for chunk_size in [1, 2, 3, 5, 7, full.len()] {
            let mut values = ValueMap::new();
            let mut state = ExtractionState::new();
            let mut content = String::new();
            for chunk in full.as_bytes().chunks(chunk_size) {
                content.push_str(std::str::from_utf8(chunk).unwrap());
                streaming_extract_values(
                    &signature,
                    &mut values,
                    &mut state,
                    &content,
                    ExtractOptions::default(),
                )
                .unwrap();
            }
            streaming_extract_final_value(&signature, &mut values, &mut state, &content, false).unwrap();
            assert_eq!(values, buffered, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn test_assumed_field_reconciled_with_same_field() {
        let signature = sig("questionText -> answerText");
        let mut values = ValueMap::new();
        let mut state = ExtractionState::new();
        let options = ExtractOptions::default();

        streaming_extract_values(&signature, &mut values, &mut state, "thinking...", options).unwrap();
        assert!(state.open_field().is_assumed());

        // An explicit prefix arrives later; the prefixed span wins.
        let full = "thinking...\nAnswer Text: Paris";
        streaming_extract_values(&signature, &mut values, &mut state, full, options).unwrap();
        assert!(!state.open_field().is_assumed());
        streaming_extract_final_value(&signature, &mut values, &mut state, full, false).unwrap();
        assert_eq!(values["answerText"], FieldValue::String("Paris".to_string()));
    }

    #[test]
    fn test_assumed_field_lookahead_scans_remaining_buffer() {
        // No output prefix anywhere ahead: the whole text goes to the first
        // field, even with several declared outputs.
        let signature = sig("questionText -> summaryText:string, noteText?:string");
        let mut values = ValueMap::new();
        extract_values(&signature, &mut values, "just prose with no prefixes", false).unwrap();
        assert_eq!(
            values["summaryText"],
            FieldValue::String("just prose with no prefixes".to_string())
        );
    }

    #[test]
    fn test_optional_field_recovered_by_full_rescan() {
        // The optional field's prefix appears before the required one ever
        // matches, so the incremental scan never opens it; the finalization
        // rescan recovers it.
        let signature = sig("questionText -> nameText:string, nickText?:string");
        let mut values = ValueMap::new();
        let content = "Nick Text: Bobby\nName Text: Bob";
        extract_values(&signature, &mut values, content, false).unwrap();
        assert_eq!(values["nameText"], FieldValue::String("Bob".to_string()));
        assert_eq!(values["nickText"], FieldValue::String("Bobby".to_string()));
    }

    #[test]
    fn test_internal_fields_removed_from_output() {
        let signature = sig("questionText -> scratchPad!:string, answerText:string");
        let mut values = ValueMap::new();
        extract_values(
            &signature,
            &mut values,
            "Scratch Pad: working...\nAnswer Text: done",
            false,
        )
        .unwrap();
        assert!(!values.contains_key("scratchPad"));
        assert_eq!(values["answerText"], FieldValue::String("done".to_string()));
    }

    #[test]
    fn test_internal_required_field_still_required() {
        let signature = sig("questionText -> scratchPad!:string, answerText:string");
        let mut values = ValueMap::new();
        let err =
            extract_values(&signature, &mut values, "Answer Text: done", false).unwrap_err();
        assert_eq!(err.fields[0].name, "scratchPad");
    }

    #[test]
    fn test_fence_opener_defers_and_sets_flag() {
        let signature = sig("questionText -> codeText:code");
        let mut values = ValueMap::new();
        let mut state = ExtractionState::new();

        streaming_extract_values(&signature, &mut values, &mut state, "```", ExtractOptions::default())
            .unwrap();
        assert!(state.in_fence());
        assert!(state.open_field().is_none());
    }

    #[test]
    fn test_class_value_validated_on_close() {
        let signature = sig("reviewText -> sentimentLabel:class \"positive, negative\"");
        let mut values = ValueMap::new();
        let err = extract_values(&signature, &mut values, "Sentiment Label: neutral", false)
            .unwrap_err();
        assert!(err.message.contains("positive, negative"));
        assert_eq!(err.fields[0].name, "sentimentLabel");
    }

    #[test]
    fn test_strict_mode_requires_prefixes_but_accepts_them() {
        let signature = sig("questionText -> answerText");
        let mut values = ValueMap::new();
        extract_values(&signature, &mut values, "Answer Text: Paris", true).unwrap();
        assert_eq!(values["answerText"], FieldValue::String("Paris".to_string()));
    }
}
