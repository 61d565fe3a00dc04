//! Catalog discovery from the embedded stream schemas

use super::types::{Catalog, CatalogEntry, MetadataEntry};
use crate::error::{Error, Result};
use crate::streams::{StreamDefinition, STREAMS};
use crate::types::{JsonObject, JsonValue};
use serde_json::json;
use tracing::debug;

/// Raw JSON schema bundled for a stream
fn raw_schema(stream_id: &str) -> Option<&'static str> {
    let raw = match stream_id {
        "billing_runs" => include_str!("../../schemas/billing_runs.json"),
        "billing_schedules" => include_str!("../../schemas/billing_schedules.json"),
        "credits" => include_str!("../../schemas/credits.json"),
        "contacts" => include_str!("../../schemas/contacts.json"),
        "payment_methods" => include_str!("../../schemas/payment_methods.json"),
        "customer_notes" => include_str!("../../schemas/customer_notes.json"),
        "customers" => include_str!("../../schemas/customers.json"),
        "invoices" => include_str!("../../schemas/invoices.json"),
        "orders" => include_str!("../../schemas/orders.json"),
        "payments" => include_str!("../../schemas/payments.json"),
        "products" => include_str!("../../schemas/products.json"),
        "refunds" => include_str!("../../schemas/refunds.json"),
        "revenue_schedules" => include_str!("../../schemas/revenue_schedules.json"),
        "subscriptions" => include_str!("../../schemas/subscriptions.json"),
        "charges" => include_str!("../../schemas/charges.json"),
        "plans" => include_str!("../../schemas/plans.json"),
        "payment_runs" => include_str!("../../schemas/payment_runs.json"),
        "revenue_rules" => include_str!("../../schemas/revenue_rules.json"),
        "chart_of_accounts" => include_str!("../../schemas/chart_of_accounts.json"),
        "webhooks" => include_str!("../../schemas/webhooks.json"),
        "statements" => include_str!("../../schemas/statements.json"),
        "coupons" => include_str!("../../schemas/coupons.json"),
        "usages" => include_str!("../../schemas/usages.json"),
        _ => return None,
    };
    Some(raw)
}

/// Parsed JSON schema for a stream
pub fn load_schema(stream_id: &str) -> Result<JsonValue> {
    let raw = raw_schema(stream_id).ok_or_else(|| Error::stream_not_found(stream_id))?;
    serde_json::from_str(raw)
        .map_err(|e| Error::decode(format!("Invalid schema for {stream_id}: {e}")))
}

/// Standard metadata for a stream and each of its top-level properties
///
/// Key properties and the default replication key are `automatic`, every
/// other property is `available`.
pub fn stream_metadata(def: &StreamDefinition, schema: &JsonValue) -> Vec<MetadataEntry> {
    let mut root = JsonObject::new();
    root.insert("table-key-properties".into(), json!(def.key_properties));
    root.insert(
        "forced-replication-method".into(),
        json!(def.replication_method.as_str()),
    );
    if !def.valid_replication_keys.is_empty() {
        root.insert(
            "valid-replication-keys".into(),
            json!(def.valid_replication_keys),
        );
    }
    root.insert("inclusion".into(), json!("available"));

    let mut entries = vec![MetadataEntry::new(Vec::new(), root)];

    let properties = schema
        .get("properties")
        .and_then(JsonValue::as_object)
        .into_iter()
        .flat_map(|props| props.keys());

    for name in properties {
        let automatic = def.key_properties.contains(&name.as_str())
            || def.replication_key == Some(name.as_str());
        let mut meta = JsonObject::new();
        meta.insert(
            "inclusion".into(),
            json!(if automatic { "automatic" } else { "available" }),
        );
        entries.push(MetadataEntry::new(
            vec!["properties".to_string(), name.clone()],
            meta,
        ));
    }

    entries
}

/// Catalog entry for one stream definition, unselected
pub fn catalog_entry(def: &StreamDefinition) -> Result<CatalogEntry> {
    let schema = load_schema(def.stream_id)?;
    let metadata = stream_metadata(def, &schema);

    Ok(CatalogEntry {
        tap_stream_id: def.stream_id.to_string(),
        stream: def.stream_id.to_string(),
        key_properties: def.key_properties.iter().map(|k| k.to_string()).collect(),
        replication_key: def.replication_key.map(str::to_string),
        replication_method: Some(def.replication_method),
        schema,
        metadata,
    })
}

/// Build the catalog of every known stream
pub fn discover() -> Result<Catalog> {
    let entries = STREAMS
        .iter()
        .map(catalog_entry)
        .collect::<Result<Vec<_>>>()?;

    debug!("Discovered {} streams", entries.len());
    Ok(Catalog::new(entries))
}
