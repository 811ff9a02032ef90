//! Prefix scanning over the accumulated response text.

/// Outcome of searching for a field's `"Title:"` prefix in the unconsumed
/// part of the buffer.
///
/// Each variant drives a distinct transition in the extraction state
/// machine; keeping them enumerated (rather than sentinel integers) makes
/// the matcher's contract checkable by the type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixScan {
    /// The prefix starts at this byte offset in the full buffer.
    Found(usize),
    /// The buffer ends in the middle of the prefix; more input is needed.
    Partial,
    /// The unconsumed buffer is pure whitespace; more input is needed.
    WhitespaceOnly,
    /// The unconsumed buffer is only a backtick fence opener; more input is
    /// needed and the extractor should mark itself inside a fenced block.
    FenceOnly,
    /// The prefix does not occur in the unconsumed buffer.
    NotFound,
}

/// Searches for `prefix` in `content`, starting at byte offset `from`.
#[must_use]
pub fn scan_for_prefix(content: &str, prefix: &str, from: usize) -> PrefixScan {
    let from = from.min(content.len());
    let rest = &content[from..];

    if let Some(at) = rest.find(prefix) {
        return PrefixScan::Found(from + at);
    }

    let trimmed = rest.trim();
    if trimmed.is_empty() {
        return PrefixScan::WhitespaceOnly;
    }
    if is_fence_opener(trimmed) {
        return PrefixScan::FenceOnly;
    }
    if ends_mid_prefix(rest, prefix) {
        return PrefixScan::Partial;
    }

    PrefixScan::NotFound
}

/// A fence opener is a run of backticks, or an opening ``` fence followed
/// by a language tag with no newline yet.
fn is_fence_opener(trimmed: &str) -> bool {
    if trimmed.chars().all(|c| c == '`') {
        return true;
    }
    trimmed.starts_with("```")
        && !trimmed.contains('\n')
        && trimmed[3..].chars().all(|c| c.is_ascii_alphanumeric())
}

/// True when the buffer ends with a proper, non-empty prefix of `prefix`.
fn ends_mid_prefix(rest: &str, prefix: &str) -> bool {
    prefix
        .char_indices()
        .skip(1)
        .any(|(end, _)| rest.ends_with(&prefix[..end]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_found_at_offset() {
        assert_eq!(scan_for_prefix("Answer: 42", "Answer:", 0), PrefixScan::Found(0));
        assert_eq!(
            scan_for_prefix("Name: Bob\nAge: 42", "\nAge:", 0),
            PrefixScan::Found(9)
        );
    }

    #[test]
    fn test_found_respects_start_offset() {
        // The prefix before `from` is invisible to the scan.
        assert_eq!(
            scan_for_prefix("Answer: Answer:", "Answer:", 8),
            PrefixScan::Found(8)
        );
        assert_eq!(scan_for_prefix("Answer: 42", "Answer:", 8), PrefixScan::NotFound);
    }

    #[test]
    fn test_partial_match_at_end() {
        assert_eq!(scan_for_prefix("Name: Bob\nAg", "\nAge:", 5), PrefixScan::Partial);
        assert_eq!(scan_for_prefix("Answ", "Answer:", 0), PrefixScan::Partial);
    }

    #[test]
    fn test_whitespace_only() {
        assert_eq!(scan_for_prefix("", "Answer:", 0), PrefixScan::WhitespaceOnly);
        assert_eq!(scan_for_prefix("  \n\t ", "Answer:", 0), PrefixScan::WhitespaceOnly);
        // Only the unconsumed tail counts.
        assert_eq!(scan_for_prefix("Name: x\n  ", "\nAge:", 8), PrefixScan::WhitespaceOnly);
    }

    #[test]
    fn test_fence_opener() {
        assert_eq!(scan_for_prefix("```", "Answer:", 0), PrefixScan::FenceOnly);
        assert_eq!(scan_for_prefix("  ```rust", "Answer:", 0), PrefixScan::FenceOnly);
        assert_eq!(scan_for_prefix("`", "Answer:", 0), PrefixScan::FenceOnly);
        // A fence with content after the newline is no longer just an opener.
        assert_eq!(
            scan_for_prefix("```rust\nfn main() {}", "Answer:", 0),
            PrefixScan::NotFound
        );
    }

    #[test]
    fn test_not_found() {
        assert_eq!(scan_for_prefix("plain text", "Answer:", 0), PrefixScan::NotFound);
    }
}
