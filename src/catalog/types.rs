//! Singer catalog types

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue, ReplicationMethod};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A Singer catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Catalog entries, in catalog order
    pub streams: Vec<CatalogEntry>,
}

impl Catalog {
    /// Create a catalog from entries
    pub fn new(streams: Vec<CatalogEntry>) -> Self {
        Self { streams }
    }

    /// Parse a catalog from a JSON value
    pub fn from_value(value: JsonValue) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::config(format!("Invalid catalog: {e}")))
    }

    /// Look up an entry by `tap_stream_id`
    pub fn get_stream(&self, stream_id: &str) -> Option<&CatalogEntry> {
        self.streams.iter().find(|s| s.tap_stream_id == stream_id)
    }

    /// Mutable lookup by `tap_stream_id`
    pub fn get_stream_mut(&mut self, stream_id: &str) -> Option<&mut CatalogEntry> {
        self.streams.iter_mut().find(|s| s.tap_stream_id == stream_id)
    }

    /// Whether the entry for `stream_id` exists and is selected
    pub fn is_selected(&self, stream_id: &str) -> bool {
        self.get_stream(stream_id).is_some_and(CatalogEntry::is_selected)
    }

    /// Selected entries, resuming from `currently_syncing` when it is selected
    ///
    /// The interrupted stream and those after it come first, followed by the
    /// streams before it.
    pub fn get_selected_streams(&self, currently_syncing: Option<&str>) -> Vec<&CatalogEntry> {
        let selected: Vec<&CatalogEntry> =
            self.streams.iter().filter(|s| s.is_selected()).collect();

        let start = currently_syncing
            .and_then(|id| selected.iter().position(|s| s.tap_stream_id == id))
            .unwrap_or(0);

        let mut ordered = selected[start..].to_vec();
        ordered.extend_from_slice(&selected[..start]);
        ordered
    }
}

/// One stream of a Singer catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Stream id
    pub tap_stream_id: String,
    /// Stream name
    pub stream: String,
    /// JSON schema of emitted records
    pub schema: JsonValue,
    /// Primary key of emitted records
    #[serde(default)]
    pub key_properties: Vec<String>,
    /// Metadata annotations
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
    /// Replication key override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_key: Option<String>,
    /// Replication method override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_method: Option<ReplicationMethod>,
}

impl CatalogEntry {
    /// Selected via `schema.selected` or the stream-level `selected` metadata
    pub fn is_selected(&self) -> bool {
        let schema_selected = self
            .schema
            .get("selected")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);

        schema_selected
            || self
                .metadata_map()
                .get(&[], "selected")
                .and_then(JsonValue::as_bool)
                .unwrap_or(false)
    }

    /// Metadata indexed by breadcrumb
    pub fn metadata_map(&self) -> MetadataMap {
        MetadataMap::from_entries(&self.metadata)
    }

    /// Replication key from the entry, falling back to stream-level metadata
    pub fn replication_key(&self) -> Option<String> {
        self.replication_key.clone().or_else(|| {
            self.metadata_map()
                .get_str(&[], "replication-key")
                .map(str::to_string)
        })
    }

    /// Replication method from the entry, falling back to stream-level metadata
    pub fn replication_method(&self) -> Option<ReplicationMethod> {
        self.replication_method.or_else(|| {
            self.metadata_map()
                .get(&[], "replication-method")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
        })
    }
}

/// One metadata annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Path to the annotated node, empty for the stream itself
    pub breadcrumb: Vec<String>,
    /// Annotation values
    pub metadata: JsonObject,
}

impl MetadataEntry {
    /// Create an entry
    pub fn new(breadcrumb: Vec<String>, metadata: JsonObject) -> Self {
        Self {
            breadcrumb,
            metadata,
        }
    }
}

/// Metadata indexed by breadcrumb
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataMap {
    entries: HashMap<Vec<String>, JsonObject>,
}

impl MetadataMap {
    /// Index a list of metadata entries
    pub fn from_entries(entries: &[MetadataEntry]) -> Self {
        let mut map = Self::default();
        for entry in entries {
            map.entries
                .entry(entry.breadcrumb.clone())
                .or_default()
                .extend(entry.metadata.clone());
        }
        map
    }

    /// Value of `key` at `breadcrumb`
    pub fn get(&self, breadcrumb: &[String], key: &str) -> Option<&JsonValue> {
        self.entries.get(breadcrumb)?.get(key)
    }

    /// String value of `key` at `breadcrumb`
    pub fn get_str(&self, breadcrumb: &[String], key: &str) -> Option<&str> {
        self.get(breadcrumb, key).and_then(JsonValue::as_str)
    }

    /// Set `key` at `breadcrumb`
    pub fn insert(&mut self, breadcrumb: Vec<String>, key: impl Into<String>, value: JsonValue) {
        self.entries
            .entry(breadcrumb)
            .or_default()
            .insert(key.into(), value);
    }

    /// Whether the map has no annotations
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
