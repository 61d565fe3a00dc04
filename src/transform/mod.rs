//! Record transformation
//!
//! Raw Ordway records go through two steps:
//! - a stream-specific pre-transform that injects synthetic keys and explodes
//!   nested line items ([`PreTransform`])
//! - schema coercion with exact decimal numbers ([`SchemaTransformer`])

mod entities;
mod record;
mod schema;

pub use entities::{
    BillingScheduleTransform, CustomerTransform, InvoiceTransform, OrderTransform,
    SubscriptionTransform,
};
pub use record::{
    base_pre_transform, BaseTransform, PreTransform, PreTransformed, RecordTransformer,
    BASE_TRANSFORM,
};
pub use schema::{decimal_to_json, exact_number, parse_decimal, SchemaTransformer};
