//! State types for tracking sync progress
//!
//! These types are serialized to JSON and persisted between runs:
//! `{"bookmarks": {stream_id: {replication_key: iso8601, "wrote_initial_activate_version": bool}}, "currently_syncing": stream_id}`

use crate::types::{JsonObject, JsonValue};
use crate::utils::parse_datetime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bookmark key recording that a stream's first ACTIVATE_VERSION was emitted
pub const WROTE_INITIAL_ACTIVATE_VERSION: &str = "wrote_initial_activate_version";

/// Replication state of a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Per-stream bookmarks
    #[serde(default)]
    pub bookmarks: BTreeMap<String, JsonObject>,

    /// Stream that was being synced when the state was written
    #[serde(default)]
    pub currently_syncing: Option<String>,
}

impl State {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bookmark value for a stream and key
    pub fn get_bookmark(&self, stream: &str, key: &str) -> Option<&JsonValue> {
        self.bookmarks.get(stream)?.get(key)
    }

    /// Set a bookmark value unconditionally
    pub fn write_bookmark(&mut self, stream: &str, key: &str, value: JsonValue) {
        self.bookmarks
            .entry(stream.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Move a replication-key bookmark forward
    ///
    /// Returns `false` and leaves the bookmark untouched when `value` is not
    /// later than the current one. Values that cannot be compared as
    /// datetimes always replace the bookmark.
    pub fn advance_bookmark(&mut self, stream: &str, key: &str, value: &JsonValue) -> bool {
        let current = self.get_bookmark(stream, key).and_then(JsonValue::as_str);
        let candidate = value.as_str();

        if let (Some(current), Some(candidate)) = (current, candidate) {
            if let (Ok(current), Ok(candidate)) = (parse_datetime(current), parse_datetime(candidate))
            {
                if candidate <= current {
                    return false;
                }
            }
        }

        self.write_bookmark(stream, key, value.clone());
        true
    }

    /// Whether an initial ACTIVATE_VERSION was already emitted for the stream
    pub fn wrote_initial_activate_version(&self, stream: &str) -> Option<bool> {
        self.get_bookmark(stream, WROTE_INITIAL_ACTIVATE_VERSION)
            .and_then(JsonValue::as_bool)
    }

    /// Record that an ACTIVATE_VERSION was emitted for the stream
    pub fn set_wrote_initial_activate_version(&mut self, stream: &str) {
        self.write_bookmark(stream, WROTE_INITIAL_ACTIVATE_VERSION, JsonValue::Bool(true));
    }

    /// Set or clear the stream being synced
    pub fn set_currently_syncing(&mut self, stream: Option<&str>) {
        self.currently_syncing = stream.map(str::to_string);
    }
}
