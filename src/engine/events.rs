//! Single-record change events
//!
//! Each event names an Ordway object type and carries one raw record. The
//! record goes through the same filter, transform and bookmark path as a
//! polled sync.

use super::SyncEngine;
use crate::error::{Error, Result};
use crate::output::MessageSink;
use crate::streams::{
    check_dependency_conflicts, get_definition, parent_of, Stream, StreamKind, StreamRecord,
};
use crate::types::{JsonObject, JsonValue};
use crate::utils::{pluralize, snake_case};
use std::collections::HashMap;
use tracing::debug;

/// Processes change events one message at a time
///
/// Streams are prepared (SCHEMA and ACTIVATE_VERSION emitted) the first time
/// an event for them arrives and cached for the processor's lifetime.
pub struct EventProcessor<S: MessageSink> {
    engine: SyncEngine<S>,
    prepared: HashMap<&'static str, Stream>,
}

impl<S: MessageSink> EventProcessor<S> {
    /// Wrap an engine, rejecting catalogs with unselected parents of selected substreams
    pub fn new(engine: SyncEngine<S>) -> Result<Self> {
        check_dependency_conflicts(engine.catalog())?;
        Ok(Self {
            engine,
            prepared: HashMap::new(),
        })
    }

    /// The wrapped engine
    pub fn engine(&self) -> &SyncEngine<S> {
        &self.engine
    }

    /// Give the engine back
    pub fn into_engine(self) -> SyncEngine<S> {
        self.engine
    }

    /// Stream id for an Ordway object type, e.g. `BillingSchedule` → `billing_schedules`
    pub fn stream_id_for(object: &str) -> String {
        pluralize(&snake_case(object))
    }

    /// Process one `{"object": ..., "record": {...}}` event
    pub async fn process(&mut self, event: &JsonValue) -> Result<()> {
        let object = event
            .get("object")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| Error::decode("Event is missing a string \"object\""))?;
        let record = event
            .get("record")
            .and_then(JsonValue::as_object)
            .cloned()
            .ok_or_else(|| Error::decode("Event is missing an object \"record\""))?;

        let stream_id = Self::stream_id_for(object);
        let definition = get_definition(&stream_id).ok_or_else(|| Error::UnknownStream {
            stream: stream_id.clone(),
        })?;

        if !self.engine.catalog().is_selected(definition.stream_id) {
            debug!("Skipping event for unselected stream \"{stream_id}\"");
            return Ok(());
        }

        let top_level_id = if definition.is_substream() {
            parent_of(definition.stream_id)
                .ok_or_else(|| Error::UnknownStream {
                    stream: stream_id.clone(),
                })?
                .stream_id
        } else {
            definition.stream_id
        };

        if !self.prepared.contains_key(top_level_id) {
            let (stream, _) = self.engine.prepare_stream(top_level_id).await?;
            self.prepared.insert(top_level_id, stream);
        }

        let Some(outputs) = self.outputs(top_level_id, definition.stream_id, record).await? else {
            return Ok(());
        };
        for (output_stream, output) in outputs {
            self.engine.handle_record(&output_stream, output).await?;
        }

        self.engine.flush_state().await
    }

    /// Records to emit for one event, `None` when the filter hook drops it
    async fn outputs(
        &self,
        top_level_id: &str,
        stream_id: &'static str,
        record: JsonObject,
    ) -> Result<Option<Vec<StreamRecord>>> {
        let parent = self
            .prepared
            .get(top_level_id)
            .ok_or_else(|| Error::stream_not_found(top_level_id))?;

        let stream = if parent.stream_id() == stream_id {
            parent
        } else {
            parent
                .substream(stream_id)
                .ok_or_else(|| Error::stream_not_found(stream_id))?
        };

        let filter_datetime = self.engine.filter_datetime(stream).await?;
        if stream.is_filtered(&record, filter_datetime) {
            debug!("Event record for \"{stream_id}\" filtered out");
            return Ok(None);
        }

        let mut outputs = Vec::new();

        if !stream.is_substream() && stream.has_substreams() {
            for substream in stream.substreams()? {
                if substream.is_selected()
                    && matches!(substream.definition().kind, StreamKind::Response { .. })
                {
                    outputs.extend(stream.sync_sub_records(substream, &record, filter_datetime)?);
                }
            }
        }

        for output in stream.transform_record(record, filter_datetime)? {
            outputs.push((stream_id.to_string(), output));
        }

        Ok(Some(outputs))
    }
}

impl<S: MessageSink> std::fmt::Debug for EventProcessor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProcessor")
            .field("engine", &self.engine)
            .field("prepared", &self.prepared.keys().collect::<Vec<_>>())
            .finish()
    }
}
