//! Request handler for one logical Ordway resource

use super::pagination::PageNumberPaginator;
use super::template;
use crate::config::RunContext;
use crate::error::{Error, Result};
use crate::http::{HttpClient, RequestConfig};
use crate::streams::{DataContext, EndpointConfig};
use crate::types::{JsonObject, JsonValue};
use crate::utils::format_datetime;
use async_stream::try_stream;
use futures::Stream;
use std::collections::BTreeMap;
use tracing::debug;

/// Fetches every page of one endpoint for a [`DataContext`]
#[derive(Debug)]
pub struct RequestHandler {
    endpoint_template: String,
    sort: Option<String>,
    paginator: PageNumberPaginator,
    client: HttpClient,
}

impl RequestHandler {
    /// Handler for an endpoint, with its own rate-limited client
    pub fn new(config: &EndpointConfig, ctx: &RunContext) -> Result<Self> {
        Ok(Self::with_client(config, HttpClient::from_context(ctx)?))
    }

    /// Handler for an endpoint using the given client
    pub fn with_client(config: &EndpointConfig, client: HttpClient) -> Self {
        Self {
            endpoint_template: config.endpoint.to_string(),
            sort: config.sort.map(str::to_string),
            paginator: PageNumberPaginator::new(config.page_size),
            client,
        }
    }

    /// Endpoint template this handler requests
    pub fn endpoint_template(&self) -> &str {
        &self.endpoint_template
    }

    /// Records requested per page
    pub fn page_size(&self) -> u32 {
        self.paginator.page_size
    }

    /// Resolve the endpoint path, filling placeholders from the parent record
    pub fn resolve_endpoint(&self, context: &DataContext<'_>) -> Result<String> {
        match context.parent_record {
            None => Ok(self.endpoint_template.clone()),
            Some(parent) => template::render(&self.endpoint_template, parent),
        }
    }

    /// Incremental filter and sort parameters for the context
    ///
    /// Empty unless the stream is validly incremental. A configured sort always
    /// wins, so `sort` is only set here when none is configured.
    pub fn resolve_params(&self, context: &DataContext<'_>) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();

        let stream = context.stream;
        let Some(replication_key) = stream
            .replication_key()
            .filter(|_| stream.is_valid_incremental())
        else {
            return params;
        };

        if self.sort.is_none() {
            params.insert("sort".to_string(), replication_key.to_string());
        }

        params.insert(
            format!("{replication_key}>"),
            format_datetime(&context.filter_datetime),
        );

        params
    }

    /// Lazily fetch all pages, yielding raw records in API order
    ///
    /// Iteration stops at the first empty page. A page that is a single object
    /// counts as a page of one record.
    pub fn fetch(&self, context: &DataContext<'_>) -> impl Stream<Item = Result<JsonObject>> + '_ {
        let endpoint = self.resolve_endpoint(context);
        let stream_id = context.stream_id.to_string();

        let mut base_params = BTreeMap::new();
        if let Some(sort) = &self.sort {
            base_params.insert("sort".to_string(), sort.clone());
        }
        base_params.extend(self.resolve_params(context));

        try_stream! {
            let endpoint = endpoint?;
            let mut state = self.paginator.initial_state();

            while !state.done {
                let mut params = self.paginator.params(&state);
                params.extend(base_params.clone());

                let request = params
                    .into_iter()
                    .fold(RequestConfig::new(), |req, (key, value)| req.query(key, value));

                debug!("Fetching page {} of {} for stream '{}'", state.page, endpoint, stream_id);
                let body = self.client.get_json(&endpoint, request).await?;
                let records = page_records(body)?;

                self.paginator.advance(&mut state, records.len());

                for record in records {
                    yield record;
                }
            }

            debug!(
                "Fetched {} records from {} for stream '{}'",
                state.total_fetched, endpoint, stream_id
            );
        }
    }
}

/// Split a page body into records
fn page_records(body: JsonValue) -> Result<Vec<JsonObject>> {
    match body {
        JsonValue::Object(record) => Ok(vec![record]),
        JsonValue::Array(items) => items
            .into_iter()
            .map(|item| match item {
                JsonValue::Object(record) => Ok(record),
                other => Err(Error::decode(format!(
                    "Expected a JSON object in page, got {other}"
                ))),
            })
            .collect(),
        other => Err(Error::decode(format!(
            "Expected a JSON array or object page, got {other}"
        ))),
    }
}
