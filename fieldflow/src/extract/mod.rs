//! Incremental extraction of typed field values from model output text.
//!
//! The extractor is a resumable parser: it consumes progressively longer
//! prefixes of an untrusted text stream, assigns `[start, end)` spans to
//! output fields in schema order by matching `"Title:"` prefixes, and
//! coerces each span to its declared type. The delta module turns
//! extraction progress into partial-value events.

mod coerce;
mod datetime;
mod delta;
mod extractor;
mod matcher;
mod state;

pub use coerce::{extract_block, validate_and_parse};
pub use datetime::{parse_llm_date, parse_llm_datetime};
pub use delta::{concat_deltas, stream_values, DeltaStream, GenDelta};
pub use extractor::{
    check_missing_required_fields, extract_values, streaming_extract_final_value,
    streaming_extract_values, ExtractOptions,
};
pub use matcher::{scan_for_prefix, PrefixScan};
pub use state::{CapturedSpan, ExtractionState, OpenField};
