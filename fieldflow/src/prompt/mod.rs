//! Prompt rendering: the initial task turn and corrective turns.
//!
//! The rendered format mirrors the wire contract the extractor parses:
//! every output field is introduced by its title and a colon, in schema
//! order.

use std::sync::Arc;

use crate::errors::{FixingInstruction, ValidationError};
use crate::signature::{Field, FieldKind, Signature};
use crate::values::{FieldValue, ValueMap};

use crate::chat::{Turn, UserPart};

/// Renders task prompts and corrective turns for one signature.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    signature: Arc<Signature>,
}

impl PromptTemplate {
    /// Creates a template for the signature.
    #[must_use]
    pub fn new(signature: Arc<Signature>) -> Self {
        Self { signature }
    }

    /// Renders the initial task turn from the caller's input values, with
    /// optional worked examples and demos.
    ///
    /// Fails when a required input field is missing.
    pub fn render(
        &self,
        inputs: &ValueMap,
        examples: &[ValueMap],
        demos: &[ValueMap],
    ) -> Result<Turn, ValidationError> {
        for field in self.signature.input_fields() {
            if !field.is_optional && !inputs.contains_key(&field.name) {
                return Err(ValidationError::for_field(field, "Required input field is missing"));
            }
        }

        let mut parts: Vec<UserPart> = Vec::new();
        let mut text = String::new();

        match self.signature.description() {
            Some(description) => text.push_str(description),
            None => {
                let inputs_list = titles(self.signature.input_fields());
                let outputs_list = titles(self.signature.output_fields());
                text.push_str(&format!(
                    "Given the fields {inputs_list}, produce the fields {outputs_list}."
                ));
            }
        }

        text.push_str("\n\nRespond using this exact format:\n");
        for field in self.signature.output_fields() {
            text.push_str(&format!("{}: {}\n", field.title, field_hint(field)));
        }

        for (label, blocks) in [("Examples", examples), ("Demos", demos)] {
            if blocks.is_empty() {
                continue;
            }
            text.push_str(&format!("\n{label}:\n"));
            for block in blocks {
                text.push_str(&self.render_example(block));
                text.push('\n');
            }
        }

        text.push('\n');
        for field in self.signature.input_fields() {
            let Some(value) = inputs.get(&field.name) else {
                continue;
            };
            match value {
                FieldValue::Media { mime_type, data } => {
                    text.push_str(&format!("{}:\n", field.title));
                    parts.push(UserPart::Text {
                        text: std::mem::take(&mut text),
                    });
                    parts.push(UserPart::Image {
                        mime_type: mime_type.clone(),
                        data: data.clone(),
                    });
                }
                FieldValue::Audio { format, data } => {
                    text.push_str(&format!("{}:\n", field.title));
                    parts.push(UserPart::Text {
                        text: std::mem::take(&mut text),
                    });
                    parts.push(UserPart::Audio {
                        format: format.clone(),
                        data: data.clone(),
                    });
                }
                other => {
                    text.push_str(&format!("{}: {}\n", field.title, render_value(other)));
                }
            }
        }

        if !text.is_empty() {
            parts.push(UserPart::Text { text });
        }

        Ok(Turn::User { content: parts })
    }

    /// Renders validation/assertion fixing instructions into a corrective
    /// user turn.
    #[must_use]
    pub fn render_corrections(&self, instructions: &[FixingInstruction]) -> Turn {
        let mut text =
            String::from("The previous response had errors that must be fixed:\n");
        for instruction in instructions {
            text.push_str(&format!("- {instruction}\n"));
        }
        text.push_str("Respond again using the exact field format.");
        Turn::user_text(text)
    }

    fn render_example(&self, values: &ValueMap) -> String {
        let mut out = String::new();
        let fields = self
            .signature
            .input_fields()
            .iter()
            .chain(self.signature.output_fields());
        for field in fields {
            if let Some(value) = values.get(&field.name) {
                out.push_str(&format!("{}: {}\n", field.title, render_value(value)));
            }
        }
        out
    }
}

fn titles(fields: &[Field]) -> String {
    let list: Vec<String> = fields.iter().map(|f| format!("`{}`", f.title)).collect();
    list.join(", ")
}

/// Per-field format hint shown in the prompt's format section.
fn field_hint(field: &Field) -> String {
    let mut hint = match field.ty.kind {
        FieldKind::Class => {
            let options = field.ty.options.as_deref().unwrap_or_default();
            format!("one of: {}", options.join(", "))
        }
        kind if field.ty.is_array => format!("a JSON array of {kind} values"),
        kind => format!("a {kind} value"),
    };
    if let Some(description) = &field.description {
        hint.push_str(&format!(" ({description})"));
    }
    if field.is_optional {
        hint.push_str(" (optional)");
    }
    hint
}

fn render_value(value: &FieldValue) -> String {
    match value {
        FieldValue::String(s) => s.clone(),
        FieldValue::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Json(json) => serde_json::to_string(json).unwrap_or_default(),
        FieldValue::Date(date) => date.format("%Y-%m-%d").to_string(),
        FieldValue::DateTime(datetime) => datetime.to_rfc3339(),
        FieldValue::Array(_) => serde_json::to_string(value).unwrap_or_default(),
        FieldValue::Media { .. } | FieldValue::Audio { .. } => "(attached)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn template(dsl: &str) -> PromptTemplate {
        PromptTemplate::new(Arc::new(Signature::parse(dsl).unwrap()))
    }

    #[test]
    fn test_render_includes_format_and_inputs() {
        let template = template("questionText -> answerText:string, scoreValue:number");
        let mut inputs = ValueMap::new();
        inputs.insert("questionText".into(), "What is 2+2?".into());

        let turn = template.render(&inputs, &[], &[]).unwrap();
        let text = turn.text().unwrap();
        assert!(text.contains("Answer Text:"));
        assert!(text.contains("Score Value: a number value"));
        assert!(text.contains("Question Text: What is 2+2?"));
    }

    #[test]
    fn test_render_requires_required_inputs() {
        let template = template("questionText -> answerText");
        let err = template.render(&ValueMap::new(), &[], &[]).unwrap_err();
        assert_eq!(err.fields[0].name, "questionText");
    }

    #[test]
    fn test_render_optional_input_may_be_absent() {
        let template = template("questionText, hintText?:string -> answerText");
        let mut inputs = ValueMap::new();
        inputs.insert("questionText".into(), "q".into());
        assert!(template.render(&inputs, &[], &[]).is_ok());
    }

    #[test]
    fn test_render_class_options_in_hint() {
        let template = template("reviewText -> sentimentLabel:class \"positive, negative\"");
        let mut inputs = ValueMap::new();
        inputs.insert("reviewText".into(), "fine".into());
        let turn = template.render(&inputs, &[], &[]).unwrap();
        assert!(turn.text().unwrap().contains("one of: positive, negative"));
    }

    #[test]
    fn test_media_inputs_become_parts() {
        let template = template("photoInput:image, questionText -> answerText");
        let mut inputs = ValueMap::new();
        inputs.insert("photoInput".into(), FieldValue::image("image/png", b"raw"));
        inputs.insert("questionText".into(), "what is this?".into());

        let turn = template.render(&inputs, &[], &[]).unwrap();
        let Turn::User { content } = &turn else {
            panic!("expected user turn");
        };
        assert!(content
            .iter()
            .any(|part| matches!(part, UserPart::Image { mime_type, .. } if mime_type == "image/png")));
        // Text continues after the media part.
        assert!(content.len() >= 2);
    }

    #[test]
    fn test_render_examples_block() {
        let template = template("questionText -> answerText");
        let mut inputs = ValueMap::new();
        inputs.insert("questionText".into(), "capital of France?".into());
        let mut example = ValueMap::new();
        example.insert("questionText".into(), "capital of Italy?".into());
        example.insert("answerText".into(), "Rome".into());

        let turn = template.render(&inputs, std::slice::from_ref(&example), &[]).unwrap();
        let text = turn.text().unwrap();
        assert!(text.contains("Examples:"));
        assert!(text.contains("Answer Text: Rome"));
    }

    #[test]
    fn test_render_corrections() {
        let template = template("questionText -> answerText");
        let instructions = vec![FixingInstruction {
            field: None,
            message: "Answer Text must not be empty".into(),
        }];
        let turn = template.render_corrections(&instructions);
        let text = turn.text().unwrap();
        assert!(text.contains("must be fixed"));
        assert!(text.contains("Answer Text must not be empty"));
    }
}
