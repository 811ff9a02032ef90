//! Parser for the textual signature DSL.
//!
//! The grammar round-trips with [`Signature`](super::Signature)'s `Display`
//! rendering:
//!
//! ```text
//! "optional task description" inputName:string, otherInput?:number ->
//!     outputName:class "one, two", detailText?:string "extra detail"
//! ```
//!
//! Modifiers: `?` marks a field optional, `!` marks it internal. Types
//! default to `string` and may carry `[]` for arrays; `class` types take a
//! quoted, comma- or pipe-separated option list.

use crate::errors::SignatureError;

use super::field::{derive_title, Field, FieldKind, FieldType};

/// A parsed signature, before semantic validation.
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    /// Leading quoted description, if present.
    pub description: Option<String>,
    /// Fields left of `->`.
    pub inputs: Vec<Field>,
    /// Fields right of `->`.
    pub outputs: Vec<Field>,
}

/// Parses a signature DSL string into its field lists.
pub fn parse_signature(input: &str) -> Result<ParsedSignature, SignatureError> {
    let mut scanner = Scanner::new(input);
    scanner.skip_whitespace();

    let description = if scanner.peek() == Some('"') {
        Some(scanner.read_quoted()?)
    } else {
        None
    };

    let inputs = parse_field_list(&mut scanner, "->")?;
    if !scanner.eat_str("->") {
        return Err(SignatureError::new("missing \"->\" between inputs and outputs")
            .with_suggestion("example: \"userInput:string -> responseText:string\""));
    }
    let outputs = parse_field_list(&mut scanner, "")?;

    scanner.skip_whitespace();
    if !scanner.at_end() {
        return Err(SignatureError::new(format!(
            "unexpected trailing input at offset {}",
            scanner.pos
        )));
    }

    if inputs.is_empty() {
        return Err(SignatureError::new("signature must have at least one input field")
            .with_suggestion("example: \"userInput:string -> ...\""));
    }
    if outputs.is_empty() {
        return Err(SignatureError::new("signature must have at least one output field")
            .with_suggestion("example: \"... -> responseText:string\""));
    }

    Ok(ParsedSignature {
        description,
        inputs,
        outputs,
    })
}

fn parse_field_list(scanner: &mut Scanner<'_>, stop: &str) -> Result<Vec<Field>, SignatureError> {
    let mut fields = Vec::new();
    loop {
        scanner.skip_whitespace();
        if scanner.at_end() || (!stop.is_empty() && scanner.looking_at(stop)) {
            break;
        }
        fields.push(parse_field(scanner)?);
        scanner.skip_whitespace();
        if !scanner.eat(',') {
            break;
        }
    }
    Ok(fields)
}

fn parse_field(scanner: &mut Scanner<'_>) -> Result<Field, SignatureError> {
    scanner.skip_whitespace();
    let name = scanner.read_ident();
    if name.is_empty() {
        return Err(SignatureError::new(format!(
            "expected a field name at offset {}",
            scanner.pos
        )));
    }

    let mut is_optional = false;
    let mut is_internal = false;
    loop {
        if scanner.eat('?') {
            is_optional = true;
        } else if scanner.eat('!') {
            is_internal = true;
        } else {
            break;
        }
    }

    let mut ty = FieldType::scalar(FieldKind::String);
    if scanner.eat(':') {
        let type_name = scanner.read_ident();
        let kind = FieldKind::parse(&type_name).ok_or_else(|| {
            SignatureError::for_field(&name, format!("unknown type \"{type_name}\"")).with_suggestion(
                "available types: string, number, boolean, json, image, audio, file, url, date, datetime, class, code",
            )
        })?;
        let is_array = scanner.eat_str("[]");
        let options = if kind == FieldKind::Class {
            scanner.skip_whitespace();
            if scanner.peek() != Some('"') {
                return Err(SignatureError::for_field(&name, "class type requires options")
                    .with_suggestion("example: class \"positive, negative\""));
            }
            let raw = scanner.read_quoted()?;
            let separator = if raw.contains('|') { '|' } else { ',' };
            Some(
                raw.split(separator)
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect::<Vec<_>>(),
            )
        } else {
            None
        };
        ty = FieldType {
            kind,
            is_array,
            options,
        };
    }

    let description = if ty.kind != FieldKind::Class {
        scanner.skip_whitespace();
        if scanner.peek() == Some('"') {
            Some(scanner.read_quoted()?)
        } else {
            None
        }
    } else {
        None
    };

    Ok(Field {
        title: derive_title(&name),
        name,
        description,
        ty,
        is_optional,
        is_internal,
    })
}

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn looking_at(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.looking_at(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn read_ident(&mut self) -> String {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|(_, c)| !c.is_ascii_alphanumeric() && *c != '_')
            .map_or(rest.len(), |(i, _)| i);
        let ident = &rest[..end];
        self.pos += end;
        ident.to_string()
    }

    fn read_quoted(&mut self) -> Result<String, SignatureError> {
        if !self.eat('"') {
            return Err(SignatureError::new(format!(
                "expected a quoted string at offset {}",
                self.pos
            )));
        }
        let rest = self.rest();
        let Some(end) = rest.find('"') else {
            return Err(SignatureError::new("unterminated quoted string"));
        };
        let content = rest[..end].to_string();
        self.pos += end + 1;
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_minimal() {
        let parsed = parse_signature("userQuestion -> answerText").unwrap();
        assert_eq!(parsed.inputs.len(), 1);
        assert_eq!(parsed.outputs.len(), 1);
        assert_eq!(parsed.inputs[0].name, "userQuestion");
        assert_eq!(parsed.inputs[0].ty.kind, FieldKind::String);
        assert_eq!(parsed.outputs[0].title, "Answer Text");
    }

    #[test]
    fn test_parse_types_and_modifiers() {
        let parsed =
            parse_signature("questionText:string -> answerValue:number, noteText?:string, scratch_pad!:string")
                .unwrap();
        assert_eq!(parsed.outputs[0].ty.kind, FieldKind::Number);
        assert!(parsed.outputs[1].is_optional);
        assert!(parsed.outputs[2].is_internal);
        assert_eq!(parsed.outputs[2].title, "Scratch pad");
    }

    #[test]
    fn test_parse_class_options() {
        let parsed = parse_signature("reviewText -> sentimentLabel:class \"positive, negative\"").unwrap();
        let options = parsed.outputs[0].ty.options.clone().unwrap();
        assert_eq!(options, vec!["positive", "negative"]);

        let parsed = parse_signature("reviewText -> sentimentLabel:class \"a | b | c\"").unwrap();
        let options = parsed.outputs[0].ty.options.clone().unwrap();
        assert_eq!(options, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_arrays_descriptions_and_signature_description() {
        let parsed = parse_signature(
            "\"extract named entities\" documentText:string \"the document\" -> entityNames:string[] \"one per entity\"",
        )
        .unwrap();
        assert_eq!(parsed.description.as_deref(), Some("extract named entities"));
        assert_eq!(parsed.inputs[0].description.as_deref(), Some("the document"));
        assert!(parsed.outputs[0].ty.is_array);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_signature("onlyInputs:string").is_err());
        assert!(parse_signature("-> answerText").is_err());
        assert!(parse_signature("aa:bogus -> bb").is_err());
        assert!(parse_signature("aa -> bb:class").is_err());
        assert!(parse_signature("aa -> bb \"unterminated").is_err());
    }
}
