//! Tests for streams, substreams and selection validation

use super::*;
use crate::catalog::{discover, Catalog};
use crate::config::RunContext;
use crate::error::Error;
use crate::types::{JsonObject, JsonValue, ReplicationMethod};
use crate::utils::parse_datetime;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn run_context(api_url: &str) -> Arc<RunContext> {
    Arc::new(
        RunContext::from_value(&json!({
            "company": "Acme",
            "api_key": "key",
            "user_email": "user@example.com",
            "user_token": "token",
            "start_date": "2020-08-01",
            "api_url": api_url
        }))
        .unwrap(),
    )
}

fn offline_context() -> Arc<RunContext> {
    run_context("http://localhost:1/api/v1")
}

fn catalog_with(selected: &[&str]) -> Catalog {
    let mut catalog = discover().unwrap();
    for id in selected {
        catalog.get_stream_mut(id).unwrap().metadata[0]
            .metadata
            .insert("selected".into(), json!(true));
    }
    catalog
}

fn obj(value: JsonValue) -> JsonObject {
    value.as_object().unwrap().clone()
}

fn start() -> DateTime<Utc> {
    parse_datetime("2020-08-01").unwrap()
}

// ============================================================================
// denest
// ============================================================================

#[test]
fn test_denest_fans_out_lists() {
    let record = obj(json!({
        "plans": [{"charge": {"id": 1}}, {"charge": {"id": 2}}]
    }));
    assert_eq!(
        denest(&record, &["plans", "charge"]),
        vec![obj(json!({"id": 1})), obj(json!({"id": 2}))]
    );
}

#[test]
fn test_denest_terminal_object_and_list() {
    let record = obj(json!({"a": {"b": {"x": 1}}, "items": [{"y": 1}, {"y": 2}]}));
    assert_eq!(denest(&record, &["a", "b"]), vec![obj(json!({"x": 1}))]);
    assert_eq!(denest(&record, &["items"]).len(), 2);
}

#[test]
fn test_denest_missing_or_null_yields_nothing() {
    let record = obj(json!({"contacts": null}));
    assert!(denest(&record, &["contacts"]).is_empty());
    assert!(denest(&record, &["missing", "deeper"]).is_empty());
}

#[test]
fn test_denest_empty_path_returns_record() {
    let record = obj(json!({"id": 1}));
    assert_eq!(denest(&record, &[]), vec![record.clone()]);
}

// ============================================================================
// Filter hook
// ============================================================================

#[test]
fn test_filter_record_by_updated_date() {
    let catalog = catalog_with(&["credits"]);
    let stream =
        Stream::from_catalog("credits", &catalog, offline_context(), updated_date_filter())
            .unwrap();
    let context = DataContext::new(&stream, parse_datetime("2021-01-01T00:00:00Z").unwrap());

    assert!(filter_record(&obj(json!({"updated_date": "2020-12-31T00:00:00Z"})), &context));
    assert!(filter_record(&obj(json!({"updated_date": "2021-01-01T00:00:00Z"})), &context));
    assert!(!filter_record(&obj(json!({"updated_date": "2021-01-02T00:00:00Z"})), &context));
    assert!(!filter_record(&obj(json!({"updated_date": null})), &context));
    assert!(!filter_record(&obj(json!({"id": "C-1"})), &context));
}

#[test]
fn test_keep_all_hook() {
    let catalog = catalog_with(&["credits"]);
    let stream = Stream::from_catalog("credits", &catalog, offline_context(), keep_all()).unwrap();
    assert!(!stream.is_filtered(&obj(json!({"updated_date": "1999-01-01"})), start()));
}

// ============================================================================
// Instantiation
// ============================================================================

#[test]
fn test_stream_from_catalog_defaults() {
    let catalog = catalog_with(&["credits"]);
    let stream = Stream::from_catalog("credits", &catalog, offline_context(), keep_all()).unwrap();

    assert!(stream.is_selected());
    assert!(stream.is_valid_incremental());
    assert!(!stream.is_substream());
    assert_eq!(stream.replication_key(), Some("updated_date"));
    assert_eq!(stream.key_properties(), &["credit_id", "company_id"]);
    assert_eq!(stream.request_handler().unwrap().endpoint_template(), "/credits");
}

#[test]
fn test_catalog_can_make_customers_incremental() {
    let mut catalog = catalog_with(&["customers"]);
    let entry = catalog.get_stream_mut("customers").unwrap();
    entry.replication_method = Some(ReplicationMethod::Incremental);
    entry.replication_key = Some("updated_date".into());

    let stream =
        Stream::from_catalog("customers", &catalog, offline_context(), keep_all()).unwrap();
    assert!(stream.is_valid_incremental());
}

#[test]
fn test_incremental_customers_keep_selected_substreams() {
    let mut catalog = catalog_with(&["customers", "contacts", "payment_methods"]);
    let entry = catalog.get_stream_mut("customers").unwrap();
    entry.replication_method = Some(ReplicationMethod::Incremental);
    entry.replication_key = Some("updated_date".into());

    let mut stream =
        Stream::from_catalog("customers", &catalog, offline_context(), keep_all()).unwrap();
    stream.instantiate_substreams(&catalog).unwrap();

    assert!(stream.is_valid_incremental());
    let selected: Vec<_> = stream
        .substreams()
        .unwrap()
        .iter()
        .filter(|s| s.is_selected())
        .map(Stream::stream_id)
        .collect();
    assert_eq!(selected, vec!["contacts", "payment_methods"]);
}

#[test]
fn test_invalid_replication_key() {
    let mut catalog = catalog_with(&["credits"]);
    catalog.get_stream_mut("credits").unwrap().replication_key = Some("created_date".into());

    match Stream::from_catalog("credits", &catalog, offline_context(), keep_all()) {
        Err(Error::InvalidReplicationKey {
            stream,
            replication_key,
        }) => {
            assert_eq!(stream, "credits");
            assert_eq!(replication_key, "created_date");
        }
        other => panic!("expected invalid replication key, got {other:?}"),
    }
}

#[test]
fn test_stream_missing_from_catalog() {
    let result = Stream::from_catalog("credits", &Catalog::default(), offline_context(), keep_all());
    assert!(matches!(result, Err(Error::StreamNotFound { .. })));

    let result = Stream::from_catalog("widgets", &Catalog::default(), offline_context(), keep_all());
    assert!(matches!(result, Err(Error::UnknownStream { .. })));
}

#[test]
fn test_substreams_must_be_instantiated() {
    let catalog = catalog_with(&["customers", "contacts"]);
    let mut stream =
        Stream::from_catalog("customers", &catalog, offline_context(), keep_all()).unwrap();

    assert!(matches!(
        stream.substreams(),
        Err(Error::SubstreamsNotInstantiated { .. })
    ));

    stream.instantiate_substreams(&catalog).unwrap();
    let ids: Vec<_> = stream.substreams().unwrap().iter().map(Stream::stream_id).collect();
    assert_eq!(ids, vec!["contacts", "customer_notes", "payment_methods"]);
    assert!(stream.substream("contacts").unwrap().is_selected());
    assert!(!stream.substream("customer_notes").unwrap().is_selected());
}

#[tokio::test]
async fn test_sync_substreams_before_instantiation_fails() {
    let catalog = catalog_with(&["customers"]);
    let stream =
        Stream::from_catalog("customers", &catalog, offline_context(), keep_all()).unwrap();
    let parent = obj(json!({"id": "C-1"}));

    let result: Result<Vec<_>, _> = stream.sync_substreams(&parent, start()).try_collect().await;
    assert!(matches!(result, Err(Error::SubstreamsNotInstantiated { .. })));
}

// ============================================================================
// Dependency conflicts
// ============================================================================

#[test]
fn test_dependency_conflict() {
    let catalog = catalog_with(&["contacts", "credits"]);
    match check_dependency_conflicts(&catalog) {
        Err(Error::DependencyConflict { parent, child }) => {
            assert_eq!(parent, "customers");
            assert_eq!(child, "contacts");
        }
        other => panic!("expected dependency conflict, got {other:?}"),
    }

    let catalog = catalog_with(&["charges"]);
    assert!(matches!(
        check_dependency_conflicts(&catalog),
        Err(Error::DependencyConflict { .. })
    ));
}

#[test]
fn test_no_dependency_conflict() {
    check_dependency_conflicts(&catalog_with(&["customers", "contacts"])).unwrap();
    check_dependency_conflicts(&catalog_with(&["customers"])).unwrap();
    check_dependency_conflicts(&catalog_with(&[])).unwrap();
}

// ============================================================================
// Sync
// ============================================================================

fn page(records: JsonValue) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(records)
}

#[tokio::test]
async fn test_sync_incremental_stream() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/credits"))
        .and(query_param("page", "1"))
        .and(query_param("size", "50"))
        .and(query_param("sort", "updated_date,id"))
        .and(query_param("updated_date>", "2020-08-01T00:00:00.000000Z"))
        .respond_with(page(json!([
            {"id": "CR-1", "credit_amount": "100.50", "updated_date": "2020-09-01T00:00:00Z"},
            {"id": "CR-2", "credit_amount": 5, "updated_date": "2020-07-01T00:00:00Z"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/credits"))
        .and(query_param("page", "2"))
        .respond_with(page(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = catalog_with(&["credits"]);
    let ctx = run_context(&format!("{}/api/v1", server.uri()));
    let stream = Stream::from_catalog("credits", &catalog, ctx, updated_date_filter()).unwrap();

    let records: Vec<_> = stream.sync(start()).try_collect().await.unwrap();

    // CR-2 was updated before the filter datetime
    assert_eq!(records.len(), 1);
    let (stream_id, record) = &records[0];
    assert_eq!(stream_id, "credits");
    assert_eq!(record["credit_id"], json!("CR-1"));
    assert_eq!(record["company_id"], json!("acme"));
    assert_eq!(record["credit_amount"].to_string(), "100.50");
    assert_eq!(record["updated_date"], json!("2020-09-01T00:00:00.000000Z"));
    assert!(record.get("id").is_none());
}

#[tokio::test]
async fn test_sync_with_response_and_endpoint_substreams() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/customers"))
        .and(query_param("page", "1"))
        .respond_with(page(json!([{
            "id": "C-1",
            "name": "Acme",
            "customer_type": "Enterprise",
            "contacts": [{"id": "CT-1", "email": "a@acme.test"}, {"id": "CT-2"}]
        }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/customers"))
        .and(query_param("page", "2"))
        .respond_with(page(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/customers/C-1/customer_notes"))
        .and(query_param("page", "1"))
        .respond_with(page(json!({"id": "N-1", "note": "Renewal"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/customers/C-1/customer_notes"))
        .and(query_param("page", "2"))
        .respond_with(page(json!([])))
        .mount(&server)
        .await;

    let catalog = catalog_with(&["customers", "contacts", "customer_notes"]);
    let ctx = run_context(&format!("{}/api/v1", server.uri()));
    let mut stream = Stream::from_catalog("customers", &catalog, ctx, keep_all()).unwrap();
    stream.instantiate_substreams(&catalog).unwrap();

    let records: Vec<_> = stream.sync(start()).try_collect().await.unwrap();
    let ids: Vec<_> = records.iter().map(|(id, _)| id.as_str()).collect();

    assert_eq!(
        ids,
        vec!["contacts", "contacts", "customer_notes", "customers"]
    );
    assert_eq!(records[0].1["contact_id"], json!("CT-1"));
    assert_eq!(records[0].1["company_id"], json!("acme"));
    assert_eq!(records[2].1["customer_note_id"], json!("N-1"));

    let customer = &records[3].1;
    assert_eq!(customer["customer_id"], json!("C-1"));
    assert_eq!(customer["billing_batch"], json!("Enterprise"));
    assert!(customer.get("contacts").is_none());
}

#[tokio::test]
async fn test_filtered_parent_still_syncs_substreams() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/plans"))
        .and(query_param("page", "1"))
        .respond_with(page(json!([{
            "id": "P-1",
            "updated_date": "2019-01-01T00:00:00Z",
            "charges": [{"id": "CH-1", "updated_date": "2021-01-01T00:00:00Z"}]
        }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/plans"))
        .and(query_param("page", "2"))
        .respond_with(page(json!([])))
        .mount(&server)
        .await;

    let catalog = catalog_with(&["plans", "charges"]);
    let ctx = run_context(&format!("{}/api/v1", server.uri()));
    let mut stream = Stream::from_catalog("plans", &catalog, ctx, updated_date_filter()).unwrap();
    stream.instantiate_substreams(&catalog).unwrap();

    let records: Vec<_> = stream.sync(start()).try_collect().await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].0, "charges");
    assert_eq!(records[0].1["charge_id"], json!("CH-1"));
}

#[tokio::test]
async fn test_sync_propagates_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/products"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = catalog_with(&["products"]);
    let ctx = run_context(&format!("{}/api/v1", server.uri()));
    let stream = Stream::from_catalog("products", &catalog, ctx, keep_all()).unwrap();

    let result: Result<Vec<_>, _> = stream.sync(start()).try_collect().await;
    match result {
        Err(Error::HttpStatus { status, body, .. }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected http status error, got {other:?}"),
    }
}
