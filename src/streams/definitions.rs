//! Static descriptors for every Ordway stream
//!
//! Each entry pairs a stream id with its key properties, replication defaults,
//! record transformer and the way its records are obtained: a top-level API
//! endpoint, a path inside the parent's response, or an endpoint templated
//! from the parent record.

use crate::transform::{
    BillingScheduleTransform, CustomerTransform, InvoiceTransform, OrderTransform, PreTransform,
    SubscriptionTransform, BASE_TRANSFORM,
};
use crate::types::ReplicationMethod;

/// Default number of records requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Replication key used by every incremental Ordway stream
const UPDATED_DATE: &str = "updated_date";

/// An API endpoint and its paging options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Path template, e.g. `/customers/{id}/payment_methods`
    pub endpoint: &'static str,
    /// Records per page
    pub page_size: u32,
    /// Explicit `sort` parameter, if any
    pub sort: Option<&'static str>,
}

impl EndpointConfig {
    const fn new(endpoint: &'static str, sort: Option<&'static str>) -> Self {
        Self {
            endpoint,
            page_size: DEFAULT_PAGE_SIZE,
            sort,
        }
    }

    const fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
}

/// How a stream's records are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Synced on its own from an endpoint
    TopLevel(EndpointConfig),
    /// Nested inside each parent record at `path`
    Response {
        /// Keys to follow from the parent record
        path: &'static [&'static str],
    },
    /// Fetched from an endpoint templated with fields of the parent record
    Endpoint(EndpointConfig),
}

/// Static description of one stream
pub struct StreamDefinition {
    /// Stream id, also the catalog `tap_stream_id`
    pub stream_id: &'static str,
    /// Primary key of emitted records
    pub key_properties: &'static [&'static str],
    /// Default replication method
    pub replication_method: ReplicationMethod,
    /// Default replication key
    pub replication_key: Option<&'static str>,
    /// Keys a catalog may choose as replication key
    pub valid_replication_keys: &'static [&'static str],
    /// Record reshaping applied before schema coercion
    pub transformer: &'static dyn PreTransform,
    /// Where records come from
    pub kind: StreamKind,
    /// Ids of child streams synced alongside each parent record
    pub substreams: &'static [&'static str],
}

impl StreamDefinition {
    /// Whether this stream is only ever synced beneath a parent
    pub fn is_substream(&self) -> bool {
        !matches!(self.kind, StreamKind::TopLevel(_))
    }

    /// Whether this stream declares child streams
    pub fn has_substreams(&self) -> bool {
        !self.substreams.is_empty()
    }

    /// Endpoint config for streams backed by their own request handler
    pub fn endpoint(&self) -> Option<&EndpointConfig> {
        match &self.kind {
            StreamKind::TopLevel(config) | StreamKind::Endpoint(config) => Some(config),
            StreamKind::Response { .. } => None,
        }
    }
}

impl std::fmt::Debug for StreamDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDefinition")
            .field("stream_id", &self.stream_id)
            .field("key_properties", &self.key_properties)
            .field("replication_method", &self.replication_method)
            .field("replication_key", &self.replication_key)
            .field("kind", &self.kind)
            .field("substreams", &self.substreams)
            .finish_non_exhaustive()
    }
}

/// Incremental stream on `updated_date` with the base transformer
const fn incremental(
    stream_id: &'static str,
    key_properties: &'static [&'static str],
    endpoint: EndpointConfig,
) -> StreamDefinition {
    StreamDefinition {
        stream_id,
        key_properties,
        replication_method: ReplicationMethod::Incremental,
        replication_key: Some(UPDATED_DATE),
        valid_replication_keys: &[UPDATED_DATE],
        transformer: BASE_TRANSFORM,
        kind: StreamKind::TopLevel(endpoint),
        substreams: &[],
    }
}

/// Full-table stream without replication keys and with the base transformer
const fn full_table(
    stream_id: &'static str,
    key_properties: &'static [&'static str],
    kind: StreamKind,
) -> StreamDefinition {
    StreamDefinition {
        stream_id,
        key_properties,
        replication_method: ReplicationMethod::FullTable,
        replication_key: None,
        valid_replication_keys: &[],
        transformer: BASE_TRANSFORM,
        kind,
        substreams: &[],
    }
}

const fn top_level(endpoint: &'static str, sort: Option<&'static str>) -> StreamKind {
    StreamKind::TopLevel(EndpointConfig::new(endpoint, sort))
}

/// Every stream the tap knows about
pub static STREAMS: &[StreamDefinition] = &[
    full_table(
        "billing_runs",
        &["billing_run_id", "company_id"],
        top_level("/billing_runs", Some("name")),
    ),
    StreamDefinition {
        transformer: &BillingScheduleTransform,
        ..full_table(
            "billing_schedules",
            &["billing_schedule_id", "company_id"],
            top_level("/billing_schedules", Some("id")),
        )
    },
    incremental(
        "credits",
        &["credit_id", "company_id"],
        EndpointConfig::new("/credits", Some("updated_date,id")),
    ),
    full_table(
        "contacts",
        &["contact_id", "company_id"],
        StreamKind::Response { path: &["contacts"] },
    ),
    full_table(
        "payment_methods",
        &["payment_method_id", "company_id"],
        StreamKind::Endpoint(EndpointConfig::new("/customers/{id}/payment_methods", None)),
    ),
    full_table(
        "customer_notes",
        &["customer_note_id", "company_id"],
        StreamKind::Endpoint(EndpointConfig::new("/customers/{id}/customer_notes", None)),
    ),
    // Full table by default; catalogs may switch to INCREMENTAL on updated_date
    StreamDefinition {
        valid_replication_keys: &[UPDATED_DATE],
        transformer: &CustomerTransform,
        substreams: &["contacts", "customer_notes", "payment_methods"],
        ..full_table(
            "customers",
            &["customer_id", "company_id"],
            top_level("/customers", None),
        )
    },
    StreamDefinition {
        transformer: &InvoiceTransform,
        ..incremental(
            "invoices",
            &["invoice_id", "company_id", "invoice_line_no"],
            EndpointConfig::new("/invoices", Some("updated_date,id")),
        )
    },
    StreamDefinition {
        transformer: &OrderTransform,
        ..incremental(
            "orders",
            &["order_id", "company_id", "order_line_no"],
            EndpointConfig::new("/orders", Some("updated_date,id")),
        )
    },
    incremental(
        "payments",
        &["payment_id", "company_id"],
        EndpointConfig::new("/payments", Some("updated_date,id")),
    ),
    incremental(
        "products",
        &["product_id", "company_id"],
        EndpointConfig::new("/products", Some("updated_date,id")),
    ),
    incremental(
        "refunds",
        &["refund_id", "company_id"],
        EndpointConfig::new("/refunds", Some("updated_date,id")),
    ),
    incremental(
        "revenue_schedules",
        &["revenue_schedule_id", "company_id"],
        EndpointConfig::new("/revenue_schedules", Some("updated_date,id")).with_page_size(500),
    ),
    StreamDefinition {
        transformer: &SubscriptionTransform,
        ..incremental(
            "subscriptions",
            &["subscription_id", "subscription_line_id", "company_id"],
            EndpointConfig::new("/subscriptions", Some("updated_date,id")),
        )
    },
    full_table(
        "charges",
        &["charge_id", "company_id"],
        StreamKind::Response { path: &["charges"] },
    ),
    StreamDefinition {
        substreams: &["charges"],
        ..full_table("plans", &["plan_id", "company_id"], top_level("/plans", None))
    },
    full_table(
        "payment_runs",
        &["payment_run_id", "company_id"],
        top_level("/payment_runs", None),
    ),
    full_table(
        "revenue_rules",
        &["revenue_rule_id", "company_id"],
        top_level("/revenue_rules", None),
    ),
    full_table(
        "chart_of_accounts",
        &["code", "company_id"],
        top_level("/chart_of_accounts", None),
    ),
    full_table(
        "webhooks",
        &["name", "company_id"],
        top_level("/webhooks", None),
    ),
    incremental(
        "statements",
        &["statement_id", "company_id"],
        EndpointConfig::new("/statements", Some("updated_date,statement_id")),
    ),
    full_table(
        "coupons",
        &["coupon_id", "company_id"],
        top_level("/coupons", Some("id")),
    ),
    incremental(
        "usages",
        &["usage_id", "company_id"],
        EndpointConfig::new("/usages", Some("updated_date,id")),
    ),
];

/// Look up a stream definition by id
pub fn get_definition(stream_id: &str) -> Option<&'static StreamDefinition> {
    STREAMS.iter().find(|def| def.stream_id == stream_id)
}

/// The stream that declares `stream_id` as one of its substreams
pub fn parent_of(stream_id: &str) -> Option<&'static StreamDefinition> {
    STREAMS
        .iter()
        .find(|def| def.substreams.contains(&stream_id))
}
