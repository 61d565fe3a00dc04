//! JSON-schema driven type coercion
//!
//! Follows the Singer transformer rules: a field's declared types are tried in
//! order with `null` last, the first successful coercion wins, properties
//! missing from the schema are dropped, and fields deselected or unsupported
//! in the catalog metadata are filtered before coercion. Numbers are parsed as
//! exact decimals.

use crate::catalog::MetadataMap;
use crate::types::{JsonObject, JsonValue};
use crate::utils::{format_datetime, parse_datetime};
use rust_decimal::Decimal;
use serde_json::Number;
use std::collections::BTreeSet;
use std::str::FromStr;

/// Coerces records into the shape declared by a JSON schema
#[derive(Debug, Default)]
pub struct SchemaTransformer {
    /// Paths dropped because the schema does not declare them
    pub removed: BTreeSet<String>,
    /// Paths dropped because of catalog selection metadata
    pub filtered: BTreeSet<String>,
    errors: Vec<String>,
}

impl SchemaTransformer {
    /// Create a new transformer
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter a record by metadata and coerce it against `schema`
    ///
    /// Returns the coercion errors when the record does not fit the schema.
    pub fn transform(
        &mut self,
        mut record: JsonObject,
        schema: &JsonValue,
        metadata: Option<&MetadataMap>,
    ) -> std::result::Result<JsonObject, Vec<String>> {
        self.errors.clear();

        if let Some(metadata) = metadata {
            self.filter_by_metadata(&mut record, metadata, &[]);
        }

        match self.transform_value(JsonValue::Object(record), schema, &[]) {
            Some(JsonValue::Object(transformed)) => Ok(transformed),
            Some(other) => Err(vec![format!("record transformed into non-object {other}")]),
            None => Err(std::mem::take(&mut self.errors)),
        }
    }

    fn filter_by_metadata(
        &mut self,
        record: &mut JsonObject,
        metadata: &MetadataMap,
        parent: &[String],
    ) {
        let fields: Vec<String> = record.keys().cloned().collect();

        for field in fields {
            let mut breadcrumb = parent.to_vec();
            breadcrumb.push("properties".to_string());
            breadcrumb.push(field.clone());

            let inclusion = metadata.get_str(&breadcrumb, "inclusion");
            if inclusion == Some("automatic") {
                continue;
            }

            let selected = metadata.get(&breadcrumb, "selected").and_then(JsonValue::as_bool);
            if selected == Some(false) || inclusion == Some("unsupported") {
                record.remove(&field);
                self.filtered.insert(breadcrumb_path(&breadcrumb));
            } else if let Some(JsonValue::Object(inner)) = record.get_mut(&field) {
                self.filter_by_metadata(inner, metadata, &breadcrumb);
            }
        }
    }

    fn transform_value(
        &mut self,
        data: JsonValue,
        schema: &JsonValue,
        path: &[String],
    ) -> Option<JsonValue> {
        if let Some(options) = schema.get("anyOf").and_then(JsonValue::as_array) {
            for option in options {
                if let Some(value) = self.try_transform(&data, option, path) {
                    return Some(value);
                }
            }
            self.push_error(path, &data, schema);
            return None;
        }

        let Some(declared) = schema.get("type") else {
            return Some(data);
        };

        let mark = self.errors.len();
        for typ in ordered_types(declared) {
            if let Some(value) = self.transform_type(&data, typ, schema, path) {
                self.errors.truncate(mark);
                return Some(value);
            }
        }

        self.push_error(path, &data, schema);
        None
    }

    /// Attempt a transform, discarding errors from a failed alternative
    fn try_transform(
        &mut self,
        data: &JsonValue,
        schema: &JsonValue,
        path: &[String],
    ) -> Option<JsonValue> {
        let mark = self.errors.len();
        let result = self.transform_value(data.clone(), schema, path);
        if result.is_none() {
            self.errors.truncate(mark);
        }
        result
    }

    fn transform_type(
        &mut self,
        data: &JsonValue,
        typ: &str,
        schema: &JsonValue,
        path: &[String],
    ) -> Option<JsonValue> {
        let data = pre_hook(data, typ);

        if typ == "null" {
            return match &data {
                JsonValue::Null => Some(JsonValue::Null),
                JsonValue::String(s) if s.is_empty() => Some(JsonValue::Null),
                _ => None,
            };
        }

        if schema.get("format").and_then(JsonValue::as_str) == Some("date-time") {
            return transform_datetime(&data);
        }

        match typ {
            "object" => self.transform_object(data, schema, path),
            "array" => self.transform_array(data, schema, path),
            "string" => transform_string(&data),
            "integer" => transform_integer(&data),
            "number" => transform_number(&data),
            "boolean" => transform_boolean(&data),
            _ => None,
        }
    }

    fn transform_object(
        &mut self,
        data: JsonValue,
        schema: &JsonValue,
        path: &[String],
    ) -> Option<JsonValue> {
        let JsonValue::Object(record) = data else {
            return None;
        };

        let properties = schema.get("properties").and_then(JsonValue::as_object);
        let Some(properties) = properties.filter(|p| !p.is_empty()) else {
            return Some(JsonValue::Object(record));
        };

        let mut result = JsonObject::new();
        let mut success = true;

        for (key, value) in record {
            let mut sub_path = path.to_vec();
            sub_path.push(key.clone());

            match properties.get(&key) {
                Some(sub_schema) => match self.transform_value(value, sub_schema, &sub_path) {
                    Some(transformed) => {
                        result.insert(key, transformed);
                    }
                    None => success = false,
                },
                None => {
                    self.removed.insert(sub_path.join("."));
                }
            }
        }

        success.then_some(JsonValue::Object(result))
    }

    fn transform_array(
        &mut self,
        data: JsonValue,
        schema: &JsonValue,
        path: &[String],
    ) -> Option<JsonValue> {
        let JsonValue::Array(items) = data else {
            return None;
        };

        let Some(items_schema) = schema.get("items") else {
            return Some(JsonValue::Array(items));
        };

        let mut result = Vec::with_capacity(items.len());
        let mut success = true;

        for (i, item) in items.into_iter().enumerate() {
            let mut sub_path = path.to_vec();
            sub_path.push(i.to_string());

            match self.transform_value(item, items_schema, &sub_path) {
                Some(transformed) => result.push(transformed),
                None => success = false,
            }
        }

        success.then_some(JsonValue::Array(result))
    }

    fn push_error(&mut self, path: &[String], data: &JsonValue, schema: &JsonValue) {
        let location = if path.is_empty() {
            "<record>".to_string()
        } else {
            path.join(".")
        };
        self.errors
            .push(format!("{location}: {data} does not match {schema}"));
    }
}

/// Declared types with `null` moved to the end
fn ordered_types(declared: &JsonValue) -> Vec<&str> {
    let mut types: Vec<&str> = match declared {
        JsonValue::String(typ) => vec![typ.as_str()],
        JsonValue::Array(types) => types.iter().filter_map(JsonValue::as_str).collect(),
        _ => Vec::new(),
    };

    if let Some(pos) = types.iter().position(|t| *t == "null") {
        types.remove(pos);
        types.push("null");
    }

    types
}

/// Ordway sentinels: `"-"` is false for booleans and null for nulls, `""` is a null string
fn pre_hook(data: &JsonValue, typ: &str) -> JsonValue {
    match (typ, data) {
        ("boolean", JsonValue::String(s)) if s == "-" => JsonValue::Bool(false),
        ("string", JsonValue::String(s)) if s.is_empty() => JsonValue::Null,
        ("null", JsonValue::String(s)) if s == "-" => JsonValue::Null,
        _ => data.clone(),
    }
}

fn transform_datetime(data: &JsonValue) -> Option<JsonValue> {
    let value = data.as_str()?;
    let parsed = parse_datetime(value).ok()?;
    Some(JsonValue::String(format_datetime(&parsed)))
}

fn transform_string(data: &JsonValue) -> Option<JsonValue> {
    match data {
        JsonValue::String(_) => Some(data.clone()),
        JsonValue::Number(n) => Some(JsonValue::String(n.to_string())),
        JsonValue::Bool(b) => Some(JsonValue::String(b.to_string())),
        _ => None,
    }
}

fn transform_integer(data: &JsonValue) -> Option<JsonValue> {
    let decimal = parse_decimal(data)?;
    if !decimal.fract().is_zero() {
        return None;
    }
    let integer: i64 = decimal.try_into().ok()?;
    Some(JsonValue::from(integer))
}

fn transform_number(data: &JsonValue) -> Option<JsonValue> {
    exact_number(data).map(JsonValue::Number)
}

fn transform_boolean(data: &JsonValue) -> Option<JsonValue> {
    match data {
        JsonValue::Bool(_) => Some(data.clone()),
        JsonValue::String(s) if s.eq_ignore_ascii_case("true") => Some(JsonValue::Bool(true)),
        JsonValue::String(s) if s.eq_ignore_ascii_case("false") => Some(JsonValue::Bool(false)),
        JsonValue::Number(_) => parse_decimal(data).map(|d| JsonValue::Bool(!d.is_zero())),
        _ => None,
    }
}

/// Parse a JSON number or numeric string as an exact decimal
///
/// Thousands separators in strings are ignored.
pub fn parse_decimal(data: &JsonValue) -> Option<Decimal> {
    let text = numeric_text(data)?;
    let text = text.trim();

    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// JSON number carrying the exact digits of a number or numeric string
///
/// Plain decimal text is kept verbatim, however many digits it has. Other
/// spellings (exponents, a leading `+`) are normalized through [`Decimal`].
pub fn exact_number(data: &JsonValue) -> Option<Number> {
    let text = numeric_text(data)?;
    let text = text.trim();

    if !text.contains(['e', 'E']) {
        if let Ok(number) = serde_json::from_str::<Number>(text) {
            return Some(number);
        }
    }

    match decimal_to_json(parse_decimal(data)?)? {
        JsonValue::Number(number) => Some(number),
        _ => None,
    }
}

fn numeric_text(data: &JsonValue) -> Option<String> {
    match data {
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::String(s) => Some(s.replace(',', "")),
        _ => None,
    }
}

/// Convert a decimal into a JSON number without going through binary floats
pub fn decimal_to_json(decimal: Decimal) -> Option<JsonValue> {
    serde_json::from_str::<Number>(&decimal.to_string())
        .ok()
        .map(JsonValue::Number)
}

fn breadcrumb_path(breadcrumb: &[String]) -> String {
    breadcrumb
        .iter()
        .filter(|part| part.as_str() != "properties")
        .cloned()
        .collect::<Vec<_>>()
        .join(".")
}
