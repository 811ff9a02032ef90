//! # Fieldflow
//!
//! Streaming typed-field extraction and self-correcting generation for
//! language-model output.
//!
//! Fieldflow turns free-form, incrementally arriving model text into a set
//! of named, typed values, and keeps retrying a generation until extraction
//! and caller assertions succeed or a bounded budget runs out:
//!
//! - **Signatures**: ordered, typed input/output field declarations,
//!   parsed from a DSL or built fluently
//! - **Extraction**: a resumable parser assigning text spans to fields by
//!   title prefix, with per-type coercion and validation
//! - **Deltas**: partial-value events for incremental consumption
//! - **Generation**: a bounded step/retry loop that renders corrective
//!   instructions back into the conversation on failure
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fieldflow::prelude::*;
//!
//! let generator = Generator::parse("questionText -> answerText:string")?;
//! let mut inputs = ValueMap::new();
//! inputs.insert("questionText".into(), "What is the capital of France?".into());
//!
//! let values = generator.forward(&service, inputs, &ForwardOptions::new()).await?;
//! assert!(values.contains_key("answerText"));
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod chat;
pub mod errors;
pub mod extract;
pub mod gen;
pub mod observability;
pub mod prompt;
pub mod signature;
pub mod testing;
pub mod tools;
pub mod values;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::chat::{
        ChatFeed, ChatRequest, ChatResponse, ChatService, FinishReason, FunctionCall, InMemory,
        Memory, ModelConfig, Turn, UserPart,
    };
    pub use crate::errors::{
        AssertionError, AttemptError, FixingInstruction, GenerateError, SignatureError,
        ValidationError,
    };
    pub use crate::extract::{
        extract_values, DeltaStream, ExtractOptions, ExtractionState, GenDelta, PrefixScan,
    };
    pub use crate::gen::{Assertion, ForwardOptions, GenOptions, Generator, StreamingAssertion};
    pub use crate::prompt::PromptTemplate;
    pub use crate::signature::{Field, FieldKind, FieldSpec, FieldType, Signature, SignatureBuilder};
    pub use crate::tools::{ToolDefinition, ToolHandler, ToolRegistry};
    pub use crate::values::{FieldValue, ValueMap};
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn library_surface_links() {
        let signature = Signature::parse("questionText -> answerText").unwrap();
        let generator = Generator::new(signature);
        assert_eq!(generator.signature().output_fields().len(), 1);
    }
}
