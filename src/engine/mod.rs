//! Execution engine module
//!
//! Main read loop and stream orchestration.
//!
//! # Overview
//!
//! The engine module provides:
//! - `SyncEngine` - syncs every selected stream, emitting Singer messages and
//!   keeping bookmarks current
//! - `EventProcessor` - replays single-record change events through the same
//!   emission path

mod events;
mod types;

pub use events::EventProcessor;
pub use types::{EmitTarget, SyncStats};

use crate::catalog::Catalog;
use crate::config::RunContext;
use crate::error::{Error, Result};
use crate::output::{Message, MessageSink};
use crate::state::StateManager;
use crate::streams::{
    check_dependency_conflicts, get_definition, updated_date_filter, FilterHook, Stream,
};
use crate::types::{JsonObject, JsonValue};
use crate::utils::parse_datetime;
use chrono::{DateTime, Utc};
use futures::{pin_mut, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Version for a full-table sync: the current epoch time in milliseconds
pub fn full_table_version() -> i64 {
    Utc::now().timestamp_millis()
}

/// Sync engine for orchestrating data extraction
pub struct SyncEngine<S: MessageSink> {
    /// Run configuration
    ctx: Arc<RunContext>,
    /// Catalog selecting the streams to sync
    catalog: Catalog,
    /// State manager
    state: StateManager,
    /// Message destination
    sink: S,
    /// Record filter handed to every stream
    filter: FilterHook,
    /// Emission settings of every prepared stream
    targets: HashMap<String, EmitTarget>,
    /// Statistics
    stats: SyncStats,
}

impl<S: MessageSink> SyncEngine<S> {
    /// Create a new sync engine
    pub fn new(ctx: Arc<RunContext>, catalog: Catalog, state: StateManager, sink: S) -> Self {
        Self {
            ctx,
            catalog,
            state,
            sink,
            filter: updated_date_filter(),
            targets: HashMap::new(),
            stats: SyncStats::default(),
        }
    }

    /// Replace the record filter hook
    #[must_use]
    pub fn with_filter_hook(mut self, filter: FilterHook) -> Self {
        self.filter = filter;
        self
    }

    /// Get the run context
    pub fn run_context(&self) -> &RunContext {
        &self.ctx
    }

    /// Get the catalog
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Get the state manager
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Get the message sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Get the message sink back
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Get statistics
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Emission settings of a prepared stream
    pub fn target(&self, stream_id: &str) -> Option<&EmitTarget> {
        self.targets.get(stream_id)
    }

    /// Sync every selected top-level stream
    ///
    /// Substreams are synced beneath their parent. The stream interrupted in a
    /// previous run, if any, goes first.
    pub async fn sync(&mut self) -> Result<SyncStats> {
        let start = Instant::now();

        check_dependency_conflicts(&self.catalog)?;

        let currently_syncing = self.state.currently_syncing().await;
        let selected: Vec<String> = self
            .catalog
            .get_selected_streams(currently_syncing.as_deref())
            .into_iter()
            .map(|entry| entry.tap_stream_id.clone())
            .collect();

        for stream_id in selected {
            let definition = get_definition(&stream_id).ok_or_else(|| Error::UnknownStream {
                stream: stream_id.clone(),
            })?;

            if definition.is_substream() {
                info!("Skipping substream \"{stream_id}\" until parent stream is reached");
                continue;
            }

            info!("Syncing stream: {stream_id}");
            let (stream, filter_datetime) = self.prepare_stream(&stream_id).await?;
            info!("Querying since: {filter_datetime}");

            let records = stream.sync(filter_datetime);
            pin_mut!(records);

            while let Some(item) = records.next().await {
                let (record_stream, record) = item?;
                self.handle_record(&record_stream, record).await?;
            }

            self.flush_state().await?;
            self.stats.add_stream();
        }

        self.state.set_currently_syncing(None).await;
        self.flush_state().await?;

        self.stats.set_duration(start.elapsed().as_millis() as u64);
        info!(
            "Sync completed: {} records from {} streams in {}ms",
            self.stats.records_synced, self.stats.streams_synced, self.stats.duration_ms
        );

        Ok(self.stats.clone())
    }

    /// Instantiate a top-level stream and emit its preliminary messages
    ///
    /// Each selected substream gets its SCHEMA and version first, then the
    /// stream itself. Returns the stream with its filter datetime.
    pub async fn prepare_stream(&mut self, stream_id: &str) -> Result<(Stream, DateTime<Utc>)> {
        let mut stream = Stream::from_catalog(
            stream_id,
            &self.catalog,
            Arc::clone(&self.ctx),
            Arc::clone(&self.filter),
        )?;

        if stream.has_substreams() {
            stream.instantiate_substreams(&self.catalog)?;

            for substream in stream.substreams()? {
                if !substream.is_selected() {
                    info!("Skipping sub-stream \"{}\"", substream.stream_id());
                    continue;
                }
                self.prepare_target(substream).await?;
            }
        }

        let filter_datetime = self.prepare_target(&stream).await?;
        Ok((stream, filter_datetime))
    }

    async fn prepare_target(&mut self, stream: &Stream) -> Result<DateTime<Utc>> {
        self.write_schema(stream)?;

        let filter_datetime = self.filter_datetime(stream).await?;
        let version = self.resolve_version(stream, filter_datetime).await?;
        self.targets
            .insert(stream.stream_id().to_string(), EmitTarget::new(stream, version));

        Ok(filter_datetime)
    }

    fn write_schema(&mut self, stream: &Stream) -> Result<()> {
        let bookmark_properties = stream
            .replication_key()
            .filter(|_| stream.is_valid_incremental())
            .map(|key| vec![key.to_string()]);

        self.sink.write(&Message::schema(
            stream.stream_id(),
            stream.schema().clone(),
            stream.key_properties().to_vec(),
            bookmark_properties,
        ))
    }

    /// Lower bound for a stream's records
    ///
    /// The later of the start date and the bookmark for validly incremental
    /// streams, the start date otherwise.
    pub async fn filter_datetime(&self, stream: &Stream) -> Result<DateTime<Utc>> {
        let start_date = self.ctx.start_date();

        let Some(replication_key) = stream
            .replication_key()
            .filter(|_| stream.is_valid_incremental())
        else {
            return Ok(start_date);
        };

        match self
            .state
            .get_bookmark(stream.stream_id(), replication_key)
            .await
        {
            Some(bookmark) => Ok(parse_datetime(&bookmark)?.max(start_date)),
            None => Ok(start_date),
        }
    }

    /// Decide the stream's table version and emit ACTIVATE_VERSION when there is one
    ///
    /// Full-table streams get a fresh version every run. Incremental streams
    /// get version 1 on their first run and no version afterwards.
    async fn resolve_version(
        &mut self,
        stream: &Stream,
        filter_datetime: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let stream_id = stream.stream_id();

        let version = if stream.is_valid_incremental() {
            let is_first_run = match self.state.wrote_initial_activate_version(stream_id).await {
                Some(true) => false,
                _ => filter_datetime <= self.ctx.start_date(),
            };
            is_first_run.then_some(1)
        } else {
            Some(full_table_version())
        };

        if let Some(version) = version {
            self.sink
                .write(&Message::activate_version(stream_id, version))?;
            self.state.set_wrote_initial_activate_version(stream_id).await;
        }

        Ok(version)
    }

    /// Emit one record and advance its stream's bookmark
    ///
    /// A validly incremental record without a replication key value is
    /// emitted but leaves state untouched.
    pub async fn handle_record(&mut self, stream_id: &str, record: JsonObject) -> Result<()> {
        let target = self
            .targets
            .get(stream_id)
            .cloned()
            .ok_or_else(|| Error::stream_not_found(stream_id))?;

        let bookmark = target
            .replication_key
            .as_ref()
            .map(|key| record.get(key).cloned().unwrap_or(JsonValue::Null));

        self.sink
            .write(&Message::record(stream_id, record, target.version))?;
        self.stats.add_record();

        if target.top_level {
            self.state.set_currently_syncing(Some(stream_id)).await;
        }

        let (Some(replication_key), Some(bookmark)) = (&target.replication_key, bookmark) else {
            return Ok(());
        };

        if bookmark.is_null() {
            warn!(
                "State not updated. Replication key \"{replication_key}\" not found in record for stream \"{stream_id}\""
            );
            self.stats.add_missing_bookmark();
            return Ok(());
        }

        debug!("Adding bookmark for {stream_id} at {bookmark}");
        self.state
            .advance_bookmark(stream_id, replication_key, &bookmark)
            .await;

        self.flush_state().await
    }

    /// Emit the full state and persist it
    pub async fn flush_state(&mut self) -> Result<()> {
        let value = self.state.to_value().await?;
        self.sink.write(&Message::state(value))?;
        self.stats.add_state();
        self.state.save().await
    }
}

impl<S: MessageSink> std::fmt::Debug for SyncEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("company", &self.ctx.company())
            .field("streams", &self.catalog.streams.len())
            .field("prepared", &self.targets.keys().collect::<Vec<_>>())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
