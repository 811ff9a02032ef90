//! Signatures: ordered, named, typed input/output field declarations.
//!
//! A [`Signature`] is declared once per task and shared read-only across
//! every generation attempt. Construction goes through the DSL parser
//! ([`Signature::parse`]), the fluent [`SignatureBuilder`], or explicit
//! field lists; all paths validate the same invariants and produce a
//! structural identity hash.

mod field;
mod parser;
mod sig;

pub use field::{derive_title, validate_field, Field, FieldContext, FieldKind, FieldSpec, FieldType};
pub use parser::{parse_signature, ParsedSignature};
pub use sig::{Signature, SignatureBuilder};
