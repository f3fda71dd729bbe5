//! Timestamp canonicalization and display formatting
//!
//! Stored timestamps use the canonical form `YYYY-MM-DDTHH:MM:SSZ`:
//! fractional seconds stripped, timezone folded to UTC. The point of the
//! canonical form is that lexicographic comparison of the stored strings
//! agrees with chronological comparison, so SQL range filters work on
//! plain text columns.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parse a record timestamp into UTC. Accepts RFC 3339 with any offset,
/// with or without fractional seconds, and the bare
/// `YYYY-MM-DD[T ]HH:MM:SS` forms (assumed UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Canonicalize a record timestamp to `YYYY-MM-DDTHH:MM:SSZ`.
/// Returns `None` when the value is not a recognizable timestamp.
pub fn canonicalize_timestamp(value: &str) -> Option<String> {
    parse_timestamp(value).map(|dt| dt.format(CANONICAL_FORMAT).to_string())
}

/// Format a user-supplied `from` bound in canonical form.
/// A date-only value expands to midnight of that day.
pub fn canonicalize_from_bound(value: &str) -> Option<String> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let start = date.and_hms_opt(0, 0, 0)?;
        return Some(start.and_utc().format(CANONICAL_FORMAT).to_string());
    }
    canonicalize_timestamp(value)
}

/// Format a user-supplied `to` bound in canonical form.
/// A date-only value expands to 23:59:59 of that day so the whole day
/// is included.
pub fn canonicalize_to_bound(value: &str) -> Option<String> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let end = date.and_hms_opt(23, 59, 59)?;
        return Some(end.and_utc().format(CANONICAL_FORMAT).to_string());
    }
    canonicalize_timestamp(value)
}

/// Format a timestamp for display: `YYYY-MM-DD HH:MM:SS` in UTC.
/// Unparseable input is returned as-is rather than dropped.
pub fn format_timestamp(value: &str) -> String {
    match parse_timestamp(value) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => value.to_string(),
    }
}

/// Format a first/last timestamp pair for display.
pub fn format_timestamp_range(first: &str, last: &str) -> String {
    if !first.is_empty() && !last.is_empty() {
        if first == last {
            format_timestamp(first)
        } else {
            format!("{} - {}", format_timestamp(first), format_timestamp(last))
        }
    } else if !first.is_empty() {
        format_timestamp(first)
    } else {
        String::new()
    }
}

/// Human-readable duration between the two ends of a message pair:
/// milliseconds below one second, fractional seconds below one minute,
/// minutes and seconds above.
pub fn format_pair_duration(first: &str, last: &str) -> Option<String> {
    let start = parse_timestamp(first)?;
    let end = parse_timestamp(last)?;
    let duration: Duration = end.signed_duration_since(start);
    let millis = duration.num_milliseconds();
    if millis < 0 {
        return None;
    }
    if millis < 1000 {
        Some(format!("took {} ms", millis))
    } else if millis < 60_000 {
        Some(format!("took {:.1}s", millis as f64 / 1000.0))
    } else {
        let total_seconds = millis / 1000;
        Some(format!(
            "took {}m {}s",
            total_seconds / 60,
            total_seconds % 60
        ))
    }
}
