//! Tolerant date and datetime parsing for model-produced text.
//!
//! Models rarely emit a single canonical layout, so a handful of common
//! forms are accepted. Failures produce messages that read well when sent
//! back to the model as fixing instructions.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y"];

const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parses a calendar date from model output.
pub fn parse_llm_date(raw: &str) -> Result<NaiveDate, String> {
    let trimmed = raw.trim();
    for layout in DATE_LAYOUTS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, layout) {
            return Ok(date);
        }
    }
    Err(format!(
        "invalid date '{trimmed}', expected a format like '2024-01-15' or 'January 15, 2024'"
    ))
}

/// Parses a timestamp from model output, normalized to UTC.
///
/// Accepts RFC 3339, a handful of naive layouts (assumed UTC), and plain
/// dates (midnight UTC).
pub fn parse_llm_datetime(raw: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for layout in DATETIME_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, layout) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = parse_llm_date(trimmed) {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(format!(
        "invalid datetime '{trimmed}', expected a format like '2024-01-15 10:30:00' or an RFC 3339 timestamp"
    ))
}
