//! Immutable signatures: ordered, typed input/output field declarations.

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::errors::SignatureError;

use super::field::{validate_field, Field, FieldContext, FieldKind, FieldSpec};
use super::parser::parse_signature;

/// An ordered, named, typed input/output declaration for one generation
/// task.
///
/// Signatures are immutable; the `append_*`/`prepend_*` methods deep-copy
/// into a new, revalidated, rehashed instance. Two signatures with the same
/// [`hash`](Signature::hash) are interchangeable for caching.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    description: Option<String>,
    inputs: Vec<Field>,
    outputs: Vec<Field>,
    hash: String,
    rendered: String,
}

impl Signature {
    /// Parses a signature from its DSL form.
    ///
    /// ```
    /// use fieldflow::signature::Signature;
    ///
    /// let sig = Signature::parse("questionText -> answerText:string").unwrap();
    /// assert_eq!(sig.output_fields()[0].title, "Answer Text");
    /// ```
    pub fn parse(dsl: &str) -> Result<Self, SignatureError> {
        let parsed = parse_signature(dsl)?;
        Self::from_parts(parsed.description, parsed.inputs, parsed.outputs)
    }

    /// Builds a signature from explicit field lists, validating every
    /// invariant.
    pub fn from_parts(
        description: Option<String>,
        inputs: Vec<Field>,
        outputs: Vec<Field>,
    ) -> Result<Self, SignatureError> {
        for field in &inputs {
            validate_field(field, FieldContext::Input)?;
        }
        for field in &outputs {
            validate_field(field, FieldContext::Output)?;
        }
        validate_consistency(&inputs, &outputs)?;

        let hash = compute_hash(description.as_deref(), &inputs, &outputs);
        let rendered = render_signature(description.as_deref(), &inputs, &outputs);

        Ok(Self {
            description,
            inputs,
            outputs,
            hash,
            rendered,
        })
    }

    /// Starts a fluent builder.
    #[must_use]
    pub fn builder() -> SignatureBuilder {
        SignatureBuilder::new()
    }

    /// The task description, if one was declared.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Ordered input fields.
    #[must_use]
    pub fn input_fields(&self) -> &[Field] {
        &self.inputs
    }

    /// Ordered output fields.
    #[must_use]
    pub fn output_fields(&self) -> &[Field] {
        &self.outputs
    }

    /// Structural identity hash over description and field lists.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Returns a copy with the description replaced.
    pub fn with_description(&self, description: impl Into<String>) -> Result<Self, SignatureError> {
        Self::from_parts(
            Some(description.into()),
            self.inputs.clone(),
            self.outputs.clone(),
        )
    }

    /// Returns a copy with an input field appended.
    pub fn append_input_field(
        &self,
        name: impl Into<String>,
        spec: FieldSpec,
    ) -> Result<Self, SignatureError> {
        let mut inputs = self.inputs.clone();
        inputs.push(spec.into_field(name));
        Self::from_parts(self.description.clone(), inputs, self.outputs.clone())
    }

    /// Returns a copy with an input field prepended.
    pub fn prepend_input_field(
        &self,
        name: impl Into<String>,
        spec: FieldSpec,
    ) -> Result<Self, SignatureError> {
        let mut inputs = self.inputs.clone();
        inputs.insert(0, spec.into_field(name));
        Self::from_parts(self.description.clone(), inputs, self.outputs.clone())
    }

    /// Returns a copy with an output field appended.
    pub fn append_output_field(
        &self,
        name: impl Into<String>,
        spec: FieldSpec,
    ) -> Result<Self, SignatureError> {
        let mut outputs = self.outputs.clone();
        outputs.push(spec.into_field(name));
        Self::from_parts(self.description.clone(), self.inputs.clone(), outputs)
    }

    /// Returns a copy with an output field prepended.
    pub fn prepend_output_field(
        &self,
        name: impl Into<String>,
        spec: FieldSpec,
    ) -> Result<Self, SignatureError> {
        let mut outputs = self.outputs.clone();
        outputs.insert(0, spec.into_field(name));
        Self::from_parts(self.description.clone(), self.inputs.clone(), outputs)
    }

    /// JSON-schema view of the input side, for tool interop.
    #[must_use]
    pub fn to_json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for field in &self.inputs {
            let type_name = field.ty.kind.name();
            let property = if field.ty.is_array {
                json!({
                    "description": field.description,
                    "type": "array",
                    "items": { "type": type_name, "description": field.description },
                })
            } else {
                json!({
                    "description": field.description,
                    "type": type_name,
                })
            };
            properties.insert(field.name.clone(), property);
            if !field.is_optional {
                required.push(json!(field.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// Fluent builder producing a validated [`Signature`].
///
/// ```
/// use fieldflow::signature::{FieldSpec, Signature};
///
/// let sig = Signature::builder()
///     .description("classify review sentiment")
///     .input("reviewText", FieldSpec::string())
///     .output("sentimentLabel", FieldSpec::class(["positive", "negative"]))
///     .build()
///     .unwrap();
/// assert_eq!(sig.output_fields().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SignatureBuilder {
    description: Option<String>,
    inputs: Vec<Field>,
    outputs: Vec<Field>,
}

impl SignatureBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the task description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends an input field.
    #[must_use]
    pub fn input(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.inputs.push(spec.into_field(name));
        self
    }

    /// Appends an output field.
    #[must_use]
    pub fn output(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.outputs.push(spec.into_field(name));
        self
    }

    /// Validates and builds the signature.
    pub fn build(self) -> Result<Signature, SignatureError> {
        Signature::from_parts(self.description, self.inputs, self.outputs)
    }
}

fn validate_consistency(inputs: &[Field], outputs: &[Field]) -> Result<(), SignatureError> {
    let mut seen = std::collections::HashSet::new();
    for field in inputs {
        if !seen.insert(field.name.as_str()) {
            return Err(SignatureError::for_field(&field.name, "duplicate input field name")
                .with_suggestion("each field name must be unique within the signature"));
        }
    }
    let mut seen_outputs = std::collections::HashSet::new();
    for field in outputs {
        if !seen_outputs.insert(field.name.as_str()) {
            return Err(SignatureError::for_field(&field.name, "duplicate output field name")
                .with_suggestion("each field name must be unique within the signature"));
        }
        if seen.contains(field.name.as_str()) {
            return Err(SignatureError::for_field(
                &field.name,
                "appears in both inputs and outputs",
            )
            .with_suggestion("use different names for input and output fields"));
        }
    }

    if inputs.is_empty() {
        return Err(SignatureError::new("signature must have at least one input field"));
    }
    if outputs.is_empty() {
        return Err(SignatureError::new("signature must have at least one output field"));
    }
    Ok(())
}

fn compute_hash(description: Option<&str>, inputs: &[Field], outputs: &[Field]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(description.unwrap_or_default().as_bytes());
    hasher.update(serde_json::to_string(inputs).unwrap_or_default().as_bytes());
    hasher.update(serde_json::to_string(outputs).unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

fn render_field(field: &Field) -> String {
    let mut out = field.name.clone();
    if field.is_optional {
        out.push('?');
    }
    if field.is_internal {
        out.push('!');
    }
    out.push(':');
    out.push_str(&field.ty.to_string());
    if field.ty.kind == FieldKind::Class {
        if let Some(options) = &field.ty.options {
            out.push_str(&format!(" \"{}\"", options.join(" | ")));
        }
    } else if let Some(description) = &field.description {
        out.push_str(&format!(" \"{description}\""));
    }
    out
}

fn render_signature(description: Option<&str>, inputs: &[Field], outputs: &[Field]) -> String {
    let description_part = description.map(|d| format!("\"{d}\" ")).unwrap_or_default();
    let inputs_part: Vec<String> = inputs.iter().map(render_field).collect();
    let outputs_part: Vec<String> = outputs.iter().map(render_field).collect();
    format!(
        "{description_part}{} -> {}",
        inputs_part.join(", "),
        outputs_part.join(", ")
    )
}
