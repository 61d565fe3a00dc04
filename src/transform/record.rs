//! Record transformer
//!
//! Reshapes raw API records (`pre_transform`) and then coerces each resulting
//! record against the stream schema.

use super::schema::SchemaTransformer;
use crate::catalog::MetadataMap;
use crate::error::{Error, Result};
use crate::streams::DataContext;
use crate::types::{JsonObject, JsonValue};
use crate::utils::singularize;
use std::iter;
use tracing::{debug, warn};

/// Output of a pre-transform: one record, or a lazily produced fan-out
pub enum PreTransformed {
    /// The record, reshaped in place
    Single(JsonObject),
    /// Independent records derived from nested collections
    Many(Box<dyn Iterator<Item = JsonObject> + Send>),
}

impl PreTransformed {
    /// Fan-out over a list of records
    pub fn many<I>(records: I) -> Self
    where
        I: IntoIterator<Item = JsonObject>,
        I::IntoIter: Send + 'static,
    {
        Self::Many(Box::new(records.into_iter()))
    }
}

impl IntoIterator for PreTransformed {
    type Item = JsonObject;
    type IntoIter = Box<dyn Iterator<Item = JsonObject> + Send>;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            Self::Single(record) => Box::new(iter::once(record)),
            Self::Many(records) => records,
        }
    }
}

impl std::fmt::Debug for PreTransformed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(record) => f.debug_tuple("Single").field(record).finish(),
            Self::Many(_) => f.write_str("Many(..)"),
        }
    }
}

/// Whole-record reshaping applied before schema coercion
pub trait PreTransform: Send + Sync {
    /// Reshape a raw record into one or more canonical records
    ///
    /// Must be idempotent for records that are already reshaped.
    fn pre_transform(&self, record: JsonObject, context: &DataContext<'_>) -> PreTransformed;
}

/// Inject `company_id` and replace the generic `id` with `<singular stream>_id`
pub fn base_pre_transform(mut record: JsonObject, context: &DataContext<'_>) -> JsonObject {
    record.insert(
        "company_id".to_string(),
        JsonValue::String(context.company_id().to_string()),
    );

    let id_field = format!("{}_id", singularize(context.stream_id));
    if !record.contains_key(&id_field) {
        let id = record.get("id").cloned().unwrap_or(JsonValue::Null);
        record.insert(id_field, id);
    }

    record.remove("id");
    record
}

/// Pre-transform that only applies the base reshaping
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseTransform;

impl PreTransform for BaseTransform {
    fn pre_transform(&self, record: JsonObject, context: &DataContext<'_>) -> PreTransformed {
        PreTransformed::Single(base_pre_transform(record, context))
    }
}

/// Shared instance of [`BaseTransform`]
pub const BASE_TRANSFORM: &dyn PreTransform = &BaseTransform;

/// Transforms raw records of one stream into schema-valid records
///
/// Created once per stream sync. Dropped properties are logged when the
/// transformer is dropped, whatever the exit path.
pub struct RecordTransformer<'s> {
    pre: &'static dyn PreTransform,
    schema: &'s JsonValue,
    metadata: &'s MetadataMap,
    inner: SchemaTransformer,
}

impl<'s> RecordTransformer<'s> {
    /// Create a transformer for a schema and its metadata
    pub fn new(
        pre: &'static dyn PreTransform,
        schema: &'s JsonValue,
        metadata: &'s MetadataMap,
    ) -> Self {
        Self {
            pre,
            schema,
            metadata,
            inner: SchemaTransformer::new(),
        }
    }

    /// Pre-transform a raw record and coerce every resulting record
    ///
    /// Records are produced lazily; a record that does not fit the schema
    /// yields [`Error::SchemaViolation`].
    pub fn transform<'t>(
        &'t mut self,
        record: JsonObject,
        context: &DataContext<'_>,
    ) -> impl Iterator<Item = Result<JsonObject>> + 't {
        let stream_id = context.stream_id.to_string();
        let records = self.pre.pre_transform(record, context);

        let schema: &'t JsonValue = self.schema;
        let metadata: &'t MetadataMap = self.metadata;
        let inner = &mut self.inner;

        records.into_iter().map(move |record| {
            inner
                .transform(record, schema, Some(metadata))
                .map_err(|errors| Error::SchemaViolation {
                    stream: stream_id.clone(),
                    errors,
                })
        })
    }
}

impl Drop for RecordTransformer<'_> {
    fn drop(&mut self) {
        if !self.inner.filtered.is_empty() {
            debug!(
                "Filtered {} paths during transforms as they were unsupported or not selected:\n\t{}",
                self.inner.filtered.len(),
                self.inner
                    .filtered
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n\t")
            );
        }

        if !self.inner.removed.is_empty() {
            warn!(
                "Removed {} paths during transforms:\n\t{}",
                self.inner.removed.len(),
                self.inner
                    .removed
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n\t")
            );
        }
    }
}
