//! Endpoint path templates
//!
//! Substream endpoints embed fields of the parent record as `{field}`
//! placeholders, e.g. `/customers/{id}/customer_notes`.

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use regex::Regex;
use std::sync::LazyLock;

/// Regex for matching placeholders: {field}
static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}").expect("placeholder regex is valid")
});

/// Substitute every `{field}` placeholder with the record's value for `field`
///
/// A placeholder whose field is missing (or null) in the record is an error.
pub fn render(template: &str, record: &JsonObject) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut last = 0;

    for cap in PLACEHOLDER_REGEX.captures_iter(template) {
        let (Some(full), Some(field)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        let value = match record.get(field.as_str()) {
            Some(JsonValue::Null) | None => {
                return Err(Error::TemplateResolution {
                    template: template.to_string(),
                    field: field.as_str().to_string(),
                })
            }
            Some(value) => value_to_string(value),
        };

        result.push_str(&template[last..full.start()]);
        result.push_str(&value);
        last = full.end();
    }

    result.push_str(&template[last..]);
    Ok(result)
}

fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
