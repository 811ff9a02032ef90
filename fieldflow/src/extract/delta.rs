//! Partial-value events emitted while extraction progresses.

use futures::Stream;
use regex::Regex;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::errors::GenerateError;
use crate::signature::{Field, FieldKind, Signature};
use crate::values::{FieldValue, ValueMap};

use super::state::ExtractionState;

fn trailing_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*```\s*$").unwrap_or_else(|_| unreachable!()))
}

fn leading_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^ *```[a-zA-Z0-9]*\n\s*").unwrap_or_else(|_| unreachable!()))
}

/// One incremental partial-value event.
///
/// `index` identifies the completion for multi-completion responses; the
/// delta maps field names to newly available content — a text suffix for
/// streamed scalar fields, or a whole value emitted exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct GenDelta {
    /// Completion index this event belongs to.
    pub index: usize,
    /// Newly available content per field.
    pub delta: ValueMap,
}

/// Whether a field's content streams mid-value. Only scalar `string` and
/// `code` fields do; everything else is emitted whole once captured.
fn streams_mid_value(field: &Field) -> bool {
    !field.is_internal
        && !field.ty.is_array
        && matches!(field.ty.kind, FieldKind::String | FieldKind::Code)
}

/// Emits the new suffix of a streaming field's span, applying the trimming
/// rules: trailing whitespace always stripped, leading whitespace stripped
/// on the first chunk, code fences stripped at both ends for `code` fields.
fn push_span_delta(
    content: &str,
    field: &Field,
    start: usize,
    end: usize,
    state: &mut ExtractionState,
    index: usize,
    out: &mut Vec<GenDelta>,
) {
    if !streams_mid_value(field) {
        return;
    }

    let pos = state.streamed.get(&field.name).copied().unwrap_or(0);
    let is_first_chunk = pos == 0;
    if start + pos >= end {
        return;
    }

    let fresh = &content[start + pos..end];
    if fresh.is_empty() {
        return;
    }

    let mut emitted = fresh.trim_end().to_string();
    if field.ty.kind == FieldKind::Code {
        emitted = trailing_fence_re().replace(&emitted, "").into_owned();
    }
    let consumed = emitted.len();

    let mut chunk = if is_first_chunk {
        emitted.trim_start().to_string()
    } else {
        emitted
    };
    if field.ty.kind == FieldKind::Code {
        if is_first_chunk {
            let head = chunk.trim_start();
            let unresolved_fence = head.chars().all(|c| c == '`')
                || (head.starts_with("```") && !head.contains('\n'));
            if unresolved_fence {
                // The opening fence (and its language tag) cannot be
                // stripped until its newline arrives.
                return;
            }
        }
        chunk = leading_fence_re().replace(&chunk, "").into_owned();
    }

    if chunk.is_empty() {
        return;
    }

    let mut delta = ValueMap::new();
    delta.insert(field.name.clone(), FieldValue::String(chunk));
    out.push(GenDelta { index, delta });
    state.streamed.insert(field.name.clone(), pos + consumed);
}

/// Converts extraction progress into partial-value events.
///
/// Flushes finalized spans not yet reported (in capture order), then the
/// currently open field's pending suffix, then any materialized whole
/// values not yet emitted. Array values emit only their new elements.
#[must_use]
pub fn stream_values(
    signature: &Signature,
    content: &str,
    values: &ValueMap,
    state: &mut ExtractionState,
    index: usize,
) -> Vec<GenDelta> {
    let fields = signature.output_fields();
    let mut out = Vec::new();

    for span in std::mem::take(&mut state.captured) {
        let field = &fields[span.index];
        push_span_delta(content, field, span.start, span.end, state, index, &mut out);
    }

    let Some(open_index) = state.open.index() else {
        return out;
    };
    let open_field = &fields[open_index];
    if open_field.is_internal {
        return out;
    }

    push_span_delta(content, open_field, state.cursor, content.len(), state, index, &mut out);

    for field in fields {
        let Some(value) = values.get(&field.name) else {
            continue;
        };
        if field.is_internal {
            continue;
        }

        if let FieldValue::Array(items) = value {
            let sent = state.streamed.get(&field.name).copied().unwrap_or(0);
            if sent < items.len() {
                let fresh = items[sent..].to_vec();
                let count = fresh.len();
                let mut delta = ValueMap::new();
                delta.insert(field.name.clone(), FieldValue::Array(fresh));
                out.push(GenDelta { index, delta });
                state.streamed.insert(field.name.clone(), sent + count);
            }
            continue;
        }

        if state.streamed.get(&field.name).copied().unwrap_or(0) == 0 {
            let mut delta = ValueMap::new();
            delta.insert(field.name.clone(), value.clone());
            out.push(GenDelta { index, delta });
            state.streamed.insert(field.name.clone(), 1);
        }
    }

    out
}

/// Lazy, finite, non-restartable sequence of [`GenDelta`] events from a
/// streaming generation.
///
/// The terminal item is either the last delta or the generation's error;
/// the stream then ends.
pub struct DeltaStream {
    receiver: mpsc::UnboundedReceiver<Result<GenDelta, GenerateError>>,
}

impl DeltaStream {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<Result<GenDelta, GenerateError>>) -> Self {
        Self { receiver }
    }
}

impl Stream for DeltaStream {
    type Item = Result<GenDelta, GenerateError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl std::fmt::Debug for DeltaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaStream").finish_non_exhaustive()
    }
}

/// Collects every streamed chunk per field, for tests and buffering
/// consumers.
#[must_use]
pub fn concat_deltas(deltas: &[GenDelta]) -> HashMap<String, String> {
    let mut merged: HashMap<String, String> = HashMap::new();
    for event in deltas {
        for (name, value) in &event.delta {
            if let FieldValue::String(chunk) = value {
                merged.entry(name.clone()).or_default().push_str(chunk);
            }
        }
    }
    merged
}
