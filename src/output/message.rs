//! Singer messages
//!
//! Every message is written as one JSON object per line.

use crate::types::{JsonObject, JsonValue};
use crate::utils::format_datetime;
use chrono::Utc;
use serde::Serialize;

/// A Singer message emitted on stdout
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Schema of a stream, emitted before its first record
    Schema {
        /// Stream id
        stream: String,
        /// JSON schema of the stream's records
        schema: JsonValue,
        /// Primary key of the stream
        key_properties: Vec<String>,
        /// Replication key, for incremental streams
        #[serde(skip_serializing_if = "Option::is_none")]
        bookmark_properties: Option<Vec<String>>,
    },
    /// One record
    Record {
        /// Stream id
        stream: String,
        /// The record
        record: JsonObject,
        /// Table version the record belongs to
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<i64>,
        /// Extraction time
        time_extracted: String,
    },
    /// Full replication state snapshot
    State {
        /// State value
        value: JsonValue,
    },
    /// Marks a table version as the current one
    ActivateVersion {
        /// Stream id
        stream: String,
        /// Version to activate
        version: i64,
    },
}

impl Message {
    /// Create a schema message
    pub fn schema(
        stream: impl Into<String>,
        schema: JsonValue,
        key_properties: Vec<String>,
        bookmark_properties: Option<Vec<String>>,
    ) -> Self {
        Self::Schema {
            stream: stream.into(),
            schema,
            key_properties,
            bookmark_properties,
        }
    }

    /// Create a record message extracted now
    pub fn record(stream: impl Into<String>, record: JsonObject, version: Option<i64>) -> Self {
        Self::Record {
            stream: stream.into(),
            record,
            version,
            time_extracted: format_datetime(&Utc::now()),
        }
    }

    /// Create a state message
    pub fn state(value: JsonValue) -> Self {
        Self::State { value }
    }

    /// Create an activate version message
    pub fn activate_version(stream: impl Into<String>, version: i64) -> Self {
        Self::ActivateVersion {
            stream: stream.into(),
            version,
        }
    }

    /// Stream the message refers to, if any
    pub fn stream(&self) -> Option<&str> {
        match self {
            Self::Schema { stream, .. }
            | Self::Record { stream, .. }
            | Self::ActivateVersion { stream, .. } => Some(stream),
            Self::State { .. } => None,
        }
    }

    /// Check if this is a schema message
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }

    /// Check if this is a record message
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record { .. })
    }

    /// Check if this is a state message
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }

    /// Check if this is an activate version message
    pub fn is_activate_version(&self) -> bool {
        matches!(self, Self::ActivateVersion { .. })
    }
}
