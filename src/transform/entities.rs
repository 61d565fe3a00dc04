//! Entity-specific pre-transforms
//!
//! Invoices, orders and subscriptions are exploded into one record per line,
//! each carrying a copy of selected parent fields.

use super::record::{base_pre_transform, PreTransform, PreTransformed};
use crate::streams::DataContext;
use crate::types::{JsonObject, JsonValue};

const KEY_METRICS: [&str; 4] = [
    "monthly_recurring_revenue",
    "annual_contract_revenue",
    "total_contract_revenue",
    "amount_invoiced",
];

const INVOICE_FIELDS: &[&str] = &[
    "invoice_id",
    "company_id",
    "customer_id",
    "billing_contact",
    "shipping_contact",
    "customer_name",
    "invoice_date",
    "due_date",
    "billing_run_id",
    "subtotal",
    "invoice_tax",
    "invoice_amount",
    "paid_amount",
    "balance",
    "status",
    "notes",
    "currency",
    "payment_terms",
    "start_date",
    "end_date",
    "custom_fields",
    "updated_date",
    "created_date",
    "created_by",
    "updated_by",
];

const ORDER_FIELDS: &[&str] = &[
    "order_id",
    "company_id",
    "customer_id",
    "invoice_id",
    "order_date",
    "status",
    "order_amount",
    "separate_invoice",
    "currency",
    "notes",
    "created_by",
    "updated_by",
    "created_date",
    "updated_date",
    "custom_fields",
];

const SUBSCRIPTION_FIELDS: &[&str] = &[
    "subscription_id",
    "company_id",
    "customer_id",
    "bill_contact_id",
    "shipping_contact_id",
    "status",
    "billing_start_date",
    "service_start_date",
    "order_placed_at",
    "contract_effective_date",
    "cancellation_date",
    "auto_renew",
    "currency",
    "payment_terms",
    "cmrr",
    "discounted_cmrr",
    "separate_invoice",
    "notes",
    "version",
    "version_type",
    "contract_term",
    "renewal_term",
    "tcv",
    "created_by",
    "updated_by",
    "created_date",
    "updated_date",
    "custom_fields",
];

/// Copy `fields` from `parent` into `line`, null when the parent lacks them
fn copy_parent_fields(line: &mut JsonObject, parent: &JsonObject, fields: &[&str]) {
    for field in fields {
        let value = parent.get(*field).cloned().unwrap_or(JsonValue::Null);
        line.insert((*field).to_string(), value);
    }
}

fn get_or_null(record: &JsonObject, field: &str) -> JsonValue {
    record.get(field).cloned().unwrap_or(JsonValue::Null)
}

/// Take the object entries of a nested list out of a record
fn take_lines(record: &mut JsonObject, field: &str) -> Vec<JsonObject> {
    match record.remove(field) {
        Some(JsonValue::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                JsonValue::Object(line) => Some(line),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Flattens `key_metrics` onto billing schedules
#[derive(Debug, Clone, Copy, Default)]
pub struct BillingScheduleTransform;

impl PreTransform for BillingScheduleTransform {
    fn pre_transform(&self, record: JsonObject, context: &DataContext<'_>) -> PreTransformed {
        let mut record = base_pre_transform(record, context);

        let metrics = record
            .get("key_metrics")
            .and_then(JsonValue::as_object)
            .cloned()
            .unwrap_or_default();

        for metric in KEY_METRICS {
            record.insert(metric.to_string(), get_or_null(&metrics, metric));
        }

        PreTransformed::Single(record)
    }
}

/// Renames `customer_type` to `billing_batch`, null when absent
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomerTransform;

impl PreTransform for CustomerTransform {
    fn pre_transform(&self, record: JsonObject, context: &DataContext<'_>) -> PreTransformed {
        let mut record = base_pre_transform(record, context);

        let billing_batch = record.remove("customer_type").unwrap_or(JsonValue::Null);
        record.insert("billing_batch".to_string(), billing_batch);

        PreTransformed::Single(record)
    }
}

/// One record per invoice line
#[derive(Debug, Clone, Copy, Default)]
pub struct InvoiceTransform;

impl PreTransform for InvoiceTransform {
    fn pre_transform(&self, record: JsonObject, context: &DataContext<'_>) -> PreTransformed {
        let mut invoice = base_pre_transform(record, context);
        let lines = take_lines(&mut invoice, "line_items");

        PreTransformed::many(lines.into_iter().map(move |mut line| {
            let line_no = get_or_null(&line, "line_no");
            let applied_tiers = get_or_null(&line, "applied_tiers");
            let line_custom_fields = get_or_null(&line, "custom_fields");

            copy_parent_fields(&mut line, &invoice, INVOICE_FIELDS);
            line.insert("invoice_line_no".to_string(), line_no);
            line.insert("applied_tiers".to_string(), applied_tiers);
            line.insert("line_custom_fields".to_string(), line_custom_fields);
            line
        }))
    }
}

/// One record per order line, keyed by `order_line_no`
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderTransform;

impl PreTransform for OrderTransform {
    fn pre_transform(&self, record: JsonObject, context: &DataContext<'_>) -> PreTransformed {
        let mut order = base_pre_transform(record, context);
        let lines = take_lines(&mut order, "line_items");

        PreTransformed::many(lines.into_iter().map(move |mut line| {
            let line_no = line.remove("line_no").unwrap_or(JsonValue::Null);

            copy_parent_fields(&mut line, &order, ORDER_FIELDS);
            line.insert("order_line_no".to_string(), line_no);
            line
        }))
    }
}

/// One record per subscription plan line
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriptionTransform;

impl PreTransform for SubscriptionTransform {
    fn pre_transform(&self, record: JsonObject, context: &DataContext<'_>) -> PreTransformed {
        let mut subscription = base_pre_transform(record, context);
        let plans = take_lines(&mut subscription, "plans");

        PreTransformed::many(plans.into_iter().map(move |mut plan| {
            let charge_custom_fields = get_or_null(&plan, "custom_fields");

            copy_parent_fields(&mut plan, &subscription, SUBSCRIPTION_FIELDS);
            plan.insert("charge_custom_fields".to_string(), charge_custom_fields);
            plan
        }))
    }
}
