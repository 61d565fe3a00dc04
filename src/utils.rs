//! Datetime and naming helpers
//!
//! Ordway mixes date-only and full timestamp formats, and derives stream ids
//! from its object names, so these conversions are shared by every stream.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Datetime format sent to Ordway filters and written for `date-time` fields
const RFC3339_MICROS: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Parse an ISO-8601 string into a UTC datetime
///
/// Accepts RFC 3339 timestamps, naive timestamps (assumed UTC) and plain dates.
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(Error::InvalidDatetime {
        value: value.to_string(),
    })
}

/// Format a datetime as RFC 3339 with microseconds and a literal `Z`
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(RFC3339_MICROS).to_string()
}

/// Convert `CamelCase`, `kebab-case` or spaced names to `snake_case`
pub fn snake_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    let chars: Vec<char> = value.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' {
            out.push('_');
            continue;
        }

        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

/// Singular form of a snake_case stream id, e.g. `billing_schedules` → `billing_schedule`
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }

    for suffix in ["sses", "shes", "ches", "xes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }

    if word.ends_with("ss") || word.ends_with("us") {
        return word.to_string();
    }

    word.strip_suffix('s').unwrap_or(word).to_string()
}

/// Plural form of a snake_case name, e.g. `customer_note` → `customer_notes`
pub fn pluralize(word: &str) -> String {
    if word.ends_with('s') && !word.ends_with("ss") {
        return word.to_string();
    }

    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }

    if ["ss", "sh", "ch", "x"].iter().any(|s| word.ends_with(s)) {
        return format!("{word}es");
    }

    format!("{word}s")
}
