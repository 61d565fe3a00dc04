//! Per-fetch context and record filter hooks

use super::Stream;
use crate::types::{JsonObject, JsonValue};
use crate::utils::parse_datetime;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Context for one fetch, transform or filter call
///
/// Built fresh for every fetch and never mutated.
#[derive(Clone, Copy)]
pub struct DataContext<'a> {
    /// Stream being synced
    pub stream_id: &'a str,
    /// Owning stream or substream
    pub stream: &'a Stream,
    /// Lower bound for record timestamps
    pub filter_datetime: DateTime<Utc>,
    /// Raw parent record, set for substreams
    pub parent_record: Option<&'a JsonObject>,
}

impl<'a> DataContext<'a> {
    /// Context for a stream without a parent record
    pub fn new(stream: &'a Stream, filter_datetime: DateTime<Utc>) -> Self {
        Self {
            stream_id: stream.stream_id(),
            stream,
            filter_datetime,
            parent_record: None,
        }
    }

    /// Attach the parent's raw record
    #[must_use]
    pub fn with_parent(mut self, parent_record: Option<&'a JsonObject>) -> Self {
        self.parent_record = parent_record;
        self
    }

    /// Company identifier injected into records
    pub fn company_id(&self) -> &str {
        self.stream.run_context().company_id()
    }
}

impl std::fmt::Debug for DataContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataContext")
            .field("stream_id", &self.stream_id)
            .field("filter_datetime", &self.filter_datetime)
            .field("has_parent", &self.parent_record.is_some())
            .finish()
    }
}

/// Decides whether a raw record is filtered out (`true`) before transformation
pub type FilterHook = Arc<dyn Fn(&JsonObject, &DataContext<'_>) -> bool + Send + Sync>;

/// Hook that keeps every record
pub fn keep_all() -> FilterHook {
    Arc::new(|_: &JsonObject, _: &DataContext<'_>| false)
}

/// Hook that filters records by `updated_date` against the context's filter datetime
pub fn updated_date_filter() -> FilterHook {
    Arc::new(filter_record)
}

/// Filter out records not updated since the filter datetime
///
/// Some Ordway endpoints cannot filter by `updated_date` server side, so this
/// runs client side on every raw record. Records without an `updated_date`
/// (or with one that cannot be parsed) are kept.
pub fn filter_record(record: &JsonObject, context: &DataContext<'_>) -> bool {
    let Some(updated_date) = record.get("updated_date").and_then(JsonValue::as_str) else {
        debug!(
            "Keeping record for stream '{}': updated_date is missing",
            context.stream_id
        );
        return false;
    };

    match parse_datetime(updated_date) {
        Ok(updated) if updated <= context.filter_datetime => {
            debug!(
                "Skipping record for stream '{}': {} is <= {}",
                context.stream_id, updated_date, context.filter_datetime
            );
            true
        }
        Ok(_) => false,
        Err(e) => {
            debug!("Keeping record for stream '{}': {e}", context.stream_id);
            false
        }
    }
}

/// Collect the objects found by following `path` from `obj`
///
/// Lists along the path fan out one result per element, missing or null keys
/// yield nothing, and an empty path yields `obj` itself.
pub fn denest(obj: &JsonObject, path: &[&str]) -> Vec<JsonObject> {
    let Some((first, rest)) = path.split_first() else {
        return vec![obj.clone()];
    };

    match obj.get(*first) {
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(JsonValue::as_object)
            .flat_map(|item| denest(item, rest))
            .collect(),
        Some(JsonValue::Object(inner)) if rest.is_empty() => vec![inner.clone()],
        Some(JsonValue::Object(inner)) => denest(inner, rest),
        _ => Vec::new(),
    }
}
