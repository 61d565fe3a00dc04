//! Engine types
//!
//! Per-stream emission settings and run statistics.

use crate::streams::Stream;

/// How records of one stream are emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitTarget {
    /// Version attached to every RECORD
    pub version: Option<i64>,
    /// Top-level streams update `currently_syncing`
    pub top_level: bool,
    /// Replication key, set only for validly incremental streams
    pub replication_key: Option<String>,
}

impl EmitTarget {
    /// Emission settings for a prepared stream
    pub fn new(stream: &Stream, version: Option<i64>) -> Self {
        Self {
            version,
            top_level: !stream.is_substream(),
            replication_key: stream
                .replication_key()
                .filter(|_| stream.is_valid_incremental())
                .map(str::to_string),
        }
    }
}

/// Statistics from a sync operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Total RECORD messages emitted
    pub records_synced: usize,
    /// Total top-level streams synced
    pub streams_synced: usize,
    /// Total STATE messages emitted
    pub states_emitted: usize,
    /// Records skipped for bookmarking because the replication key was missing
    pub missing_bookmarks: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record
    pub fn add_record(&mut self) {
        self.records_synced += 1;
    }

    /// Add a stream
    pub fn add_stream(&mut self) {
        self.streams_synced += 1;
    }

    /// Add a state message
    pub fn add_state(&mut self) {
        self.states_emitted += 1;
    }

    /// Add a record whose bookmark could not be read
    pub fn add_missing_bookmark(&mut self) {
        self.missing_bookmarks += 1;
    }

    /// Set duration
    pub fn set_duration(&mut self, ms: u64) {
        self.duration_ms = ms;
    }
}
