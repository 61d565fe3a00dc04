//! Runtime stream instances
//!
//! A [`Stream`] binds a static [`StreamDefinition`] to its catalog entry and
//! the run's configuration. Syncing is pull based: nothing is requested until
//! the returned stream of `(stream_id, record)` pairs is polled.

use super::context::{denest, DataContext, FilterHook};
use super::definitions::{get_definition, StreamDefinition, StreamKind, STREAMS};
use crate::catalog::{Catalog, MetadataMap};
use crate::config::RunContext;
use crate::error::{Error, Result};
use crate::request::RequestHandler;
use crate::transform::RecordTransformer;
use crate::types::{JsonObject, JsonValue, ReplicationMethod};
use async_stream::try_stream;
use chrono::{DateTime, Utc};
use futures::{pin_mut, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};

/// A record tagged with the id of the stream that owns it
pub type StreamRecord = (String, JsonObject);

/// A stream or substream bound to one run
pub struct Stream {
    definition: &'static StreamDefinition,
    ctx: Arc<RunContext>,
    schema: JsonValue,
    metadata: MetadataMap,
    key_properties: Vec<String>,
    selected: bool,
    replication_key: Option<String>,
    replication_method: ReplicationMethod,
    handler: Option<RequestHandler>,
    filter: FilterHook,
    substreams: Option<Vec<Stream>>,
}

impl Stream {
    /// Bind a definition to its catalog entry
    ///
    /// Fails when the catalog has no entry for the stream or when the
    /// effective replication key is not one the stream supports.
    pub fn new(
        definition: &'static StreamDefinition,
        catalog: &Catalog,
        ctx: Arc<RunContext>,
        filter: FilterHook,
    ) -> Result<Self> {
        let stream_id = definition.stream_id;
        let entry = catalog
            .get_stream(stream_id)
            .ok_or_else(|| Error::stream_not_found(stream_id))?;

        let replication_method = entry
            .replication_method()
            .unwrap_or(definition.replication_method);
        let replication_key = entry
            .replication_key()
            .or_else(|| definition.replication_key.map(str::to_string));

        if let Some(key) = &replication_key {
            if !definition.valid_replication_keys.contains(&key.as_str()) {
                return Err(Error::InvalidReplicationKey {
                    stream: stream_id.to_string(),
                    replication_key: key.clone(),
                });
            }
        }

        let key_properties = if entry.key_properties.is_empty() {
            definition
                .key_properties
                .iter()
                .map(|k| k.to_string())
                .collect()
        } else {
            entry.key_properties.clone()
        };

        let handler = definition
            .endpoint()
            .map(|config| RequestHandler::new(config, &ctx))
            .transpose()?;

        Ok(Self {
            definition,
            schema: entry.schema.clone(),
            metadata: entry.metadata_map(),
            key_properties,
            selected: entry.is_selected(),
            replication_key,
            replication_method,
            handler,
            filter,
            substreams: None,
            ctx,
        })
    }

    /// Look up a definition by id and bind it
    pub fn from_catalog(
        stream_id: &str,
        catalog: &Catalog,
        ctx: Arc<RunContext>,
        filter: FilterHook,
    ) -> Result<Self> {
        let definition = get_definition(stream_id).ok_or_else(|| Error::UnknownStream {
            stream: stream_id.to_string(),
        })?;
        Self::new(definition, catalog, ctx, filter)
    }

    /// Replace the request handler, e.g. to share a preconfigured client
    #[must_use]
    pub fn with_handler(mut self, handler: RequestHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn stream_id(&self) -> &'static str {
        self.definition.stream_id
    }

    pub fn definition(&self) -> &'static StreamDefinition {
        self.definition
    }

    pub fn run_context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn schema(&self) -> &JsonValue {
        &self.schema
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub fn key_properties(&self) -> &[String] {
        &self.key_properties
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn is_substream(&self) -> bool {
        self.definition.is_substream()
    }

    pub fn has_substreams(&self) -> bool {
        self.definition.has_substreams()
    }

    /// Effective replication key
    pub fn replication_key(&self) -> Option<&str> {
        self.replication_key.as_deref()
    }

    /// Effective replication method
    pub fn replication_method(&self) -> ReplicationMethod {
        self.replication_method
    }

    /// INCREMENTAL with a replication key
    pub fn is_valid_incremental(&self) -> bool {
        self.replication_method == ReplicationMethod::Incremental
            && self.replication_key.is_some()
    }

    /// The request handler, for streams backed by an endpoint
    pub fn request_handler(&self) -> Option<&RequestHandler> {
        self.handler.as_ref()
    }

    /// Instantiated substreams
    pub fn substreams(&self) -> Result<&[Stream]> {
        self.substreams
            .as_deref()
            .ok_or_else(|| Error::SubstreamsNotInstantiated {
                stream: self.stream_id().to_string(),
            })
    }

    /// Instantiated substream by id
    pub fn substream(&self, stream_id: &str) -> Option<&Stream> {
        self.substreams
            .as_deref()?
            .iter()
            .find(|s| s.stream_id() == stream_id)
    }

    /// Bind every declared substream present in the catalog
    ///
    /// Substreams share this stream's run context and filter hook.
    pub fn instantiate_substreams(&mut self, catalog: &Catalog) -> Result<()> {
        let mut substreams = Vec::with_capacity(self.definition.substreams.len());

        for child in self.definition.substreams {
            if catalog.get_stream(child).is_none() {
                debug!("Substream '{child}' is not in the catalog");
                continue;
            }
            substreams.push(Stream::from_catalog(
                child,
                catalog,
                Arc::clone(&self.ctx),
                Arc::clone(&self.filter),
            )?);
        }

        self.substreams = Some(substreams);
        Ok(())
    }

    fn handler(&self) -> Result<&RequestHandler> {
        self.handler.as_ref().ok_or_else(|| {
            Error::Other(format!(
                "Stream '{}' has no endpoint of its own",
                self.stream_id()
            ))
        })
    }

    fn transformer(&self) -> RecordTransformer<'_> {
        RecordTransformer::new(self.definition.transformer, &self.schema, &self.metadata)
    }

    /// Sync a top-level stream
    ///
    /// For every raw record, selected substreams are synced first, then the
    /// filter hook decides whether the record itself is emitted.
    pub fn sync(
        &self,
        filter_datetime: DateTime<Utc>,
    ) -> impl futures::Stream<Item = Result<StreamRecord>> + '_ {
        try_stream! {
            let handler = self.handler()?;
            let context = DataContext::new(self, filter_datetime);
            let mut transformer = self.transformer();

            let records = handler.fetch(&context);
            pin_mut!(records);

            while let Some(record) = records.next().await {
                let record = record?;

                if self.has_substreams() {
                    let children = self.sync_substreams(&record, filter_datetime);
                    pin_mut!(children);
                    while let Some(child) = children.next().await {
                        yield child?;
                    }
                }

                // substreams above already had their chance to filter
                if (self.filter)(&record, &context) {
                    continue;
                }

                for output in transformer.transform(record, &context) {
                    yield (self.stream_id().to_string(), output?);
                }
            }
        }
    }

    /// Sync an endpoint substream for one parent record
    pub fn sync_for_parent<'a>(
        &'a self,
        parent_record: &'a JsonObject,
        filter_datetime: DateTime<Utc>,
    ) -> impl futures::Stream<Item = Result<StreamRecord>> + 'a {
        try_stream! {
            let handler = self.handler()?;
            let context = DataContext::new(self, filter_datetime).with_parent(Some(parent_record));
            let mut transformer = self.transformer();

            let records = handler.fetch(&context);
            pin_mut!(records);

            while let Some(record) = records.next().await {
                let record = record?;
                if (self.filter)(&record, &context) {
                    continue;
                }

                for output in transformer.transform(record, &context) {
                    yield (self.stream_id().to_string(), output?);
                }
            }
        }
    }

    /// Sync every selected substream for one raw parent record
    pub fn sync_substreams<'a>(
        &'a self,
        parent_record: &'a JsonObject,
        filter_datetime: DateTime<Utc>,
    ) -> impl futures::Stream<Item = Result<StreamRecord>> + 'a {
        try_stream! {
            for substream in self.substreams()? {
                if !substream.is_selected() {
                    continue;
                }

                match substream.definition.kind {
                    StreamKind::Response { .. } => {
                        for child in self.sync_sub_records(substream, parent_record, filter_datetime)? {
                            yield child;
                        }
                    }
                    StreamKind::Endpoint(_) => {
                        let children = substream.sync_for_parent(parent_record, filter_datetime);
                        pin_mut!(children);
                        while let Some(child) = children.next().await {
                            yield child?;
                        }
                    }
                    StreamKind::TopLevel(_) => {
                        debug!(
                            "Ignoring top-level stream '{}' declared as a substream",
                            substream.stream_id()
                        );
                    }
                }
            }
        }
    }

    /// Transform the records nested in a parent record for a response substream
    ///
    /// Uses this stream's filter hook with the substream's transformer.
    pub fn sync_sub_records(
        &self,
        substream: &Stream,
        parent_record: &JsonObject,
        filter_datetime: DateTime<Utc>,
    ) -> Result<Vec<StreamRecord>> {
        let StreamKind::Response { path } = substream.definition.kind else {
            return Ok(Vec::new());
        };

        let context = DataContext::new(substream, filter_datetime).with_parent(Some(parent_record));
        let mut transformer = substream.transformer();
        let mut output = Vec::new();

        for sub_record in denest(parent_record, path) {
            if (self.filter)(&sub_record, &context) {
                continue;
            }
            for record in transformer.transform(sub_record, &context) {
                output.push((substream.stream_id().to_string(), record?));
            }
        }

        Ok(output)
    }

    /// Transform one raw record of this stream without fetching or filtering
    pub fn transform_record(
        &self,
        record: JsonObject,
        filter_datetime: DateTime<Utc>,
    ) -> Result<Vec<JsonObject>> {
        let context = DataContext::new(self, filter_datetime);
        let mut transformer = self.transformer();
        let records = transformer.transform(record, &context).collect();
        records
    }

    /// Apply the filter hook to a raw record of this stream
    pub fn is_filtered(&self, record: &JsonObject, filter_datetime: DateTime<Utc>) -> bool {
        (self.filter)(record, &DataContext::new(self, filter_datetime))
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("stream_id", &self.stream_id())
            .field("selected", &self.selected)
            .field("replication_method", &self.replication_method)
            .field("replication_key", &self.replication_key)
            .field("substreams", &self.substreams)
            .finish_non_exhaustive()
    }
}

/// Fail when a selected substream's parent stream is not selected
///
/// Runs over the whole catalog before any request is made.
pub fn check_dependency_conflicts(catalog: &Catalog) -> Result<()> {
    for parent in STREAMS.iter().filter(|d| d.has_substreams()) {
        if catalog.is_selected(parent.stream_id) {
            continue;
        }

        if let Some(child) = parent
            .substreams
            .iter()
            .find(|child| catalog.is_selected(child))
        {
            return Err(Error::DependencyConflict {
                parent: parent.stream_id.to_string(),
                child: child.to_string(),
            });
        }
    }

    info!("No stream dependency conflicts found");
    Ok(())
}
