//! Field declarations and their validation rules.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::errors::SignatureError;

fn camel_case_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-zA-Z0-9]*$").unwrap_or_else(|_| unreachable!()))
}

fn snake_case_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]+(_[a-z0-9]+)*$").unwrap_or_else(|_| unreachable!()))
}

fn title_boundary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Z]|[0-9]+)").unwrap_or_else(|_| unreachable!()))
}

/// The declared type of a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Plain text.
    String,
    /// Numeric value.
    Number,
    /// `true` / `false`.
    Boolean,
    /// Structurally parsed JSON.
    Json,
    /// Calendar date.
    Date,
    /// Timestamp.
    DateTime,
    /// One of a declared set of options. Output fields only.
    Class,
    /// Source code, possibly fenced. Never an array.
    Code,
    /// Image payload. Input fields only, never an array.
    Image,
    /// Audio payload. Input fields only, never an array.
    Audio,
    /// File payload. Input fields only.
    File,
    /// URL. Input fields only.
    Url,
}

impl FieldKind {
    /// The DSL name of this kind.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Json => "json",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Class => "class",
            Self::Code => "code",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::File => "file",
            Self::Url => "url",
        }
    }

    /// Parses a DSL type name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "json" => Some(Self::Json),
            "date" => Some(Self::Date),
            "datetime" => Some(Self::DateTime),
            "class" => Some(Self::Class),
            "code" => Some(Self::Code),
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            "file" => Some(Self::File),
            "url" => Some(Self::Url),
            _ => None,
        }
    }

    /// Whether this kind is only valid on input fields.
    #[must_use]
    pub fn is_input_only(self) -> bool {
        matches!(self, Self::Image | Self::Audio | Self::File | Self::Url)
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A field's full type: kind, arrayness, and class options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldType {
    /// The scalar kind.
    pub kind: FieldKind,
    /// Whether the field holds a list of values.
    pub is_array: bool,
    /// Allowed values, present only for `class` fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl FieldType {
    /// A scalar type of the given kind.
    #[must_use]
    pub fn scalar(kind: FieldKind) -> Self {
        Self {
            kind,
            is_array: false,
            options: None,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if self.is_array {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

/// Which side of the signature a field sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldContext {
    /// Caller-supplied field.
    Input,
    /// Model-produced field.
    Output,
}

impl FieldContext {
    fn label(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// A single named, typed field within a signature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    /// Unique identifier, camelCase or snake_case.
    pub name: String,
    /// Human-readable title; the wire prefix is `"{title}:"`.
    pub title: String,
    /// Description rendered into prompts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared type.
    #[serde(rename = "type")]
    pub ty: FieldType,
    /// Whether the field may be absent without error.
    pub is_optional: bool,
    /// Internal fields are extracted but removed from final output.
    pub is_internal: bool,
}

impl Field {
    /// Creates a field with a title derived from its name.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        let name = name.into();
        let title = derive_title(&name);
        Self {
            name,
            title,
            description: None,
            ty,
            is_optional: false,
            is_internal: false,
        }
    }
}

/// Fluent field descriptor, turned into a [`Field`] when attached to a name.
///
/// ```
/// use fieldflow::signature::FieldSpec;
///
/// let field = FieldSpec::class(["positive", "negative"])
///     .optional()
///     .into_field("sentimentLabel");
/// assert_eq!(field.title, "Sentiment Label");
/// ```
#[derive(Debug, Clone)]
pub struct FieldSpec {
    kind: FieldKind,
    is_array: bool,
    options: Option<Vec<String>>,
    description: Option<String>,
    is_optional: bool,
    is_internal: bool,
}

impl FieldSpec {
    fn of(kind: FieldKind) -> Self {
        Self {
            kind,
            is_array: false,
            options: None,
            description: None,
            is_optional: false,
            is_internal: false,
        }
    }

    /// Plain text field.
    #[must_use]
    pub fn string() -> Self {
        Self::of(FieldKind::String)
    }

    /// Numeric field.
    #[must_use]
    pub fn number() -> Self {
        Self::of(FieldKind::Number)
    }

    /// Boolean field.
    #[must_use]
    pub fn boolean() -> Self {
        Self::of(FieldKind::Boolean)
    }

    /// Structured JSON field.
    #[must_use]
    pub fn json() -> Self {
        Self::of(FieldKind::Json)
    }

    /// Calendar date field.
    #[must_use]
    pub fn date() -> Self {
        Self::of(FieldKind::Date)
    }

    /// Timestamp field.
    #[must_use]
    pub fn datetime() -> Self {
        Self::of(FieldKind::DateTime)
    }

    /// Source code field.
    #[must_use]
    pub fn code() -> Self {
        Self::of(FieldKind::Code)
    }

    /// Classification field with its allowed options.
    #[must_use]
    pub fn class<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = Self::of(FieldKind::Class);
        spec.options = Some(options.into_iter().map(Into::into).collect());
        spec
    }

    /// Image input field.
    #[must_use]
    pub fn image() -> Self {
        Self::of(FieldKind::Image)
    }

    /// Audio input field.
    #[must_use]
    pub fn audio() -> Self {
        Self::of(FieldKind::Audio)
    }

    /// File input field.
    #[must_use]
    pub fn file() -> Self {
        Self::of(FieldKind::File)
    }

    /// URL input field.
    #[must_use]
    pub fn url() -> Self {
        Self::of(FieldKind::Url)
    }

    /// Marks the field as an array of its kind.
    #[must_use]
    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    /// Marks the field as optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    /// Marks the field as internal (extracted, then stripped from output).
    #[must_use]
    pub fn internal(mut self) -> Self {
        self.is_internal = true;
        self
    }

    /// Attaches a description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builds the [`Field`] for the given name.
    #[must_use]
    pub fn into_field(self, name: impl Into<String>) -> Field {
        let mut field = Field::new(
            name,
            FieldType {
                kind: self.kind,
                is_array: self.is_array,
                options: self.options,
            },
        );
        field.description = self.description;
        field.is_optional = self.is_optional;
        field.is_internal = self.is_internal;
        field
    }
}

/// Derives a human-readable title from a camelCase or snake_case name.
#[must_use]
pub fn derive_title(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let spaced = title_boundary_re().replace_all(&spaced, " $1");
    let trimmed = spaced.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Validates a single field against the invariants for its context.
pub fn validate_field(field: &Field, context: FieldContext) -> Result<(), SignatureError> {
    if field.name.is_empty() {
        return Err(SignatureError::new("field name cannot be blank")
            .with_suggestion("every field must have a descriptive name"));
    }

    if !camel_case_re().is_match(&field.name) && !snake_case_re().is_match(&field.name) {
        return Err(SignatureError::for_field(
            &field.name,
            "must be camelCase or snake_case",
        )
        .with_suggestion("use e.g. \"userInput\" or \"user_input\""));
    }

    if field.name.len() < 2 {
        return Err(SignatureError::for_field(&field.name, "name is too short")
            .with_suggestion("field names must be at least 2 characters long"));
    }

    if field.name.len() > 50 {
        return Err(SignatureError::for_field(&field.name, "name is too long")
            .with_suggestion("field names should be 50 characters or less"));
    }

    validate_field_type(field, context)
}

fn validate_field_type(field: &Field, context: FieldContext) -> Result<(), SignatureError> {
    let ty = &field.ty;

    if ty.kind.is_input_only() && context == FieldContext::Output {
        return Err(SignatureError::for_field(
            &field.name,
            format!("{} type is not supported in output fields", ty.kind),
        )
        .with_suggestion(format!("{} types can only be used in input fields", ty.kind)));
    }

    if ty.is_array && matches!(ty.kind, FieldKind::Image | FieldKind::Audio) {
        return Err(SignatureError::for_field(
            &field.name,
            format!("arrays of {} are not supported", ty.kind),
        ));
    }

    if ty.kind == FieldKind::Class {
        if context == FieldContext::Input {
            return Err(SignatureError::for_field(
                &field.name,
                "class type is not supported in input fields",
            )
            .with_suggestion("use \"string\" for input classifications"));
        }

        let options = ty.options.as_deref().unwrap_or_default();
        if options.is_empty() {
            return Err(SignatureError::for_field(&field.name, "class type requires options")
                .with_suggestion("example: class \"positive, negative, neutral\""));
        }

        for option in options {
            let trimmed = option.trim();
            if trimmed.is_empty() {
                return Err(SignatureError::for_field(&field.name, "empty class option found"));
            }
            if trimmed.contains(',') || trimmed.contains('|') {
                return Err(SignatureError::for_field(
                    &field.name,
                    format!("invalid class option \"{trimmed}\""),
                )
                .with_suggestion("class options cannot contain commas or pipes"));
            }
        }

        let mut seen: Vec<String> = options.iter().map(|o| o.trim().to_lowercase()).collect();
        seen.sort();
        seen.dedup();
        if seen.len() != options.len() {
            return Err(SignatureError::for_field(&field.name, "duplicate class options found")
                .with_suggestion("each class option must be unique, ignoring case"));
        }
    }

    if ty.kind == FieldKind::Code && ty.is_array {
        return Err(SignatureError::for_field(&field.name, "arrays of code are not supported")
            .with_suggestion("use a single code field or an array of strings"));
    }

    if field.is_internal && context == FieldContext::Input {
        return Err(SignatureError::for_field(
            &field.name,
            "internal marker (!) is not allowed on input fields",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_derive_title() {
        assert_eq!(derive_title("userInput"), "User Input");
        assert_eq!(derive_title("user_input"), "User input");
        assert_eq!(derive_title("answer"), "Answer");
        assert_eq!(derive_title("topK10"), "Top K 10");
    }

    #[test]
    fn test_name_case_validation() {
        let ok = FieldSpec::string().into_field("userInput");
        assert!(validate_field(&ok, FieldContext::Input).is_ok());

        let bad = FieldSpec::string().into_field("UserInput");
        assert!(validate_field(&bad, FieldContext::Input).is_err());

        let short = FieldSpec::string().into_field("a");
        assert!(validate_field(&short, FieldContext::Input).is_err());
    }

    #[test]
    fn test_class_requires_options_and_output_context() {
        let empty = FieldSpec::class(Vec::<String>::new()).into_field("category");
        assert!(validate_field(&empty, FieldContext::Output).is_err());

        let ok = FieldSpec::class(["aa", "bb"]).into_field("category");
        assert!(validate_field(&ok, FieldContext::Output).is_ok());
        assert!(validate_field(&ok, FieldContext::Input).is_err());
    }

    #[test]
    fn test_class_option_constraints() {
        let comma = FieldSpec::class(["a,b"]).into_field("category");
        assert!(validate_field(&comma, FieldContext::Output).is_err());

        let dup = FieldSpec::class(["Yes", "yes"]).into_field("category");
        assert!(validate_field(&dup, FieldContext::Output).is_err());
    }

    #[test]
    fn test_media_rules() {
        let image = FieldSpec::image().into_field("photoInput");
        assert!(validate_field(&image, FieldContext::Input).is_ok());
        assert!(validate_field(&image, FieldContext::Output).is_err());

        let images = FieldSpec::image().array().into_field("photoInput");
        assert!(validate_field(&images, FieldContext::Input).is_err());
    }

    #[test]
    fn test_code_array_and_internal_rules() {
        let codes = FieldSpec::code().array().into_field("sourceCode");
        assert!(validate_field(&codes, FieldContext::Output).is_err());

        let internal_input = FieldSpec::string().internal().into_field("scratchPad");
        assert!(validate_field(&internal_input, FieldContext::Input).is_err());
        assert!(validate_field(&internal_input, FieldContext::Output).is_ok());
    }
}
