//! Tests for engine module

use super::*;
use crate::catalog::discover;
use crate::output::MemorySink;
use crate::streams::keep_all;
use pretty_assertions::assert_eq;
use serde_json::json;
use test_case::test_case;
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

fn engine(selected: &[&str], state: StateManager) -> SyncEngine<MemorySink> {
    SyncEngine::new(offline_context(), catalog_with(selected), state, MemorySink::new())
}

fn obj(value: JsonValue) -> JsonObject {
    value.as_object().unwrap().clone()
}

fn kinds(sink: &MemorySink) -> Vec<(&'static str, String)> {
    sink.messages()
        .iter()
        .map(|m| {
            let kind = match m {
                Message::Schema { .. } => "SCHEMA",
                Message::Record { .. } => "RECORD",
                Message::State { .. } => "STATE",
                Message::ActivateVersion { .. } => "ACTIVATE_VERSION",
            };
            (kind, m.stream().unwrap_or_default().to_string())
        })
        .collect()
}

fn page(records: JsonValue) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(records)
}

// ============================================================================
// SyncStats Tests
// ============================================================================

#[test]
fn test_sync_stats() {
    let mut stats = SyncStats::new();
    stats.add_record();
    stats.add_record();
    stats.add_stream();
    stats.add_state();
    stats.add_missing_bookmark();
    stats.set_duration(1500);

    assert_eq!(stats.records_synced, 2);
    assert_eq!(stats.streams_synced, 1);
    assert_eq!(stats.states_emitted, 1);
    assert_eq!(stats.missing_bookmarks, 1);
    assert_eq!(stats.duration_ms, 1500);
}

// ============================================================================
// Filter Datetime Tests
// ============================================================================

#[test_case(None, "2020-08-01T00:00:00Z" ; "no bookmark uses start date")]
#[test_case(Some("2021-03-04T05:06:07Z"), "2021-03-04T05:06:07Z" ; "later bookmark wins")]
#[test_case(Some("2019-01-01T00:00:00Z"), "2020-08-01T00:00:00Z" ; "earlier bookmark loses to start date")]
#[tokio::test]
async fn test_filter_datetime(bookmark: Option<&str>, expected: &str) {
    let state = StateManager::in_memory();
    if let Some(bookmark) = bookmark {
        state
            .advance_bookmark("credits", "updated_date", &json!(bookmark))
            .await;
    }

    let engine = engine(&["credits"], state);
    let stream =
        Stream::from_catalog("credits", engine.catalog(), offline_context(), keep_all()).unwrap();

    assert_eq!(
        engine.filter_datetime(&stream).await.unwrap(),
        parse_datetime(expected).unwrap()
    );
}

#[tokio::test]
async fn test_filter_datetime_ignores_bookmark_for_full_table() {
    let state = StateManager::from_value(json!({
        "bookmarks": {"plans": {"updated_date": "2022-01-01T00:00:00Z"}}
    }))
    .unwrap();

    let engine = engine(&["plans"], state);
    let stream =
        Stream::from_catalog("plans", engine.catalog(), offline_context(), keep_all()).unwrap();

    assert_eq!(
        engine.filter_datetime(&stream).await.unwrap(),
        offline_context().start_date()
    );
}

#[tokio::test]
async fn test_filter_datetime_rejects_unparseable_bookmark() {
    let state = StateManager::from_value(json!({
        "bookmarks": {"credits": {"updated_date": "yesterday"}}
    }))
    .unwrap();

    let engine = engine(&["credits"], state);
    let stream =
        Stream::from_catalog("credits", engine.catalog(), offline_context(), keep_all()).unwrap();

    assert!(matches!(
        engine.filter_datetime(&stream).await,
        Err(Error::InvalidDatetime { .. })
    ));
}

// ============================================================================
// Prepare Stream Tests
// ============================================================================

#[tokio::test]
async fn test_prepare_incremental_first_run() {
    let state = StateManager::in_memory();
    let mut engine = engine(&["credits"], state.clone());

    engine.prepare_stream("credits").await.unwrap();

    assert_eq!(
        engine.sink().messages()[0],
        Message::schema(
            "credits",
            crate::catalog::load_schema("credits").unwrap(),
            vec!["credit_id".to_string(), "company_id".to_string()],
            Some(vec!["updated_date".to_string()]),
        )
    );
    assert_eq!(
        engine.sink().messages()[1],
        Message::activate_version("credits", 1)
    );
    assert_eq!(engine.target("credits").unwrap().version, Some(1));
    assert_eq!(
        state.wrote_initial_activate_version("credits").await,
        Some(true)
    );
}

#[tokio::test]
async fn test_prepare_incremental_later_run() {
    let state = StateManager::from_value(json!({
        "bookmarks": {"credits": {
            "updated_date": "2021-01-01T00:00:00Z",
            "wrote_initial_activate_version": true
        }}
    }))
    .unwrap();
    let mut engine = engine(&["credits"], state);

    let (_, filter_datetime) = engine.prepare_stream("credits").await.unwrap();

    assert_eq!(filter_datetime, parse_datetime("2021-01-01T00:00:00Z").unwrap());
    assert_eq!(kinds(engine.sink()), vec![("SCHEMA", "credits".to_string())]);
    assert_eq!(engine.target("credits").unwrap().version, None);
}

#[tokio::test]
async fn test_prepare_bookmark_without_flag_is_not_first_run() {
    let state = StateManager::from_value(json!({
        "bookmarks": {"payments": {"updated_date": "2021-01-01T00:00:00Z"}}
    }))
    .unwrap();
    let mut engine = engine(&["payments"], state);

    engine.prepare_stream("payments").await.unwrap();

    assert_eq!(engine.sink().count(Message::is_activate_version), 0);
}

#[tokio::test]
async fn test_prepare_full_table_always_activates() {
    let state = StateManager::from_value(json!({
        "bookmarks": {"webhooks": {"wrote_initial_activate_version": true}}
    }))
    .unwrap();
    let mut engine = engine(&["webhooks"], state);

    engine.prepare_stream("webhooks").await.unwrap();

    let Message::ActivateVersion { version, .. } = &engine.sink().messages()[1] else {
        panic!("expected ACTIVATE_VERSION");
    };
    assert!(*version > 1_600_000_000_000);
    assert_eq!(engine.target("webhooks").unwrap().version, Some(*version));

    let Message::Schema {
        bookmark_properties,
        ..
    } = &engine.sink().messages()[0]
    else {
        panic!("expected SCHEMA");
    };
    assert!(bookmark_properties.is_none());
}

#[tokio::test]
async fn test_prepare_emits_substreams_before_parent() {
    let mut engine = engine(&["customers", "contacts"], StateManager::in_memory());

    let (stream, _) = engine.prepare_stream("customers").await.unwrap();

    assert_eq!(
        kinds(engine.sink()),
        vec![
            ("SCHEMA", "contacts".to_string()),
            ("ACTIVATE_VERSION", "contacts".to_string()),
            ("SCHEMA", "customers".to_string()),
            ("ACTIVATE_VERSION", "customers".to_string()),
        ]
    );
    assert!(stream.substream("contacts").is_some());
    assert!(engine.target("customer_notes").is_none());
    assert!(!engine.target("contacts").unwrap().top_level);
    assert!(engine.target("customers").unwrap().top_level);
}

// ============================================================================
// Handle Record Tests
// ============================================================================

#[tokio::test]
async fn test_handle_record_advances_bookmark() {
    let state = StateManager::in_memory();
    let mut engine = engine(&["credits"], state.clone());
    engine.prepare_stream("credits").await.unwrap();

    engine
        .handle_record(
            "credits",
            obj(json!({"credit_id": "CR-1", "updated_date": "2021-02-01T00:00:00.000000Z"})),
        )
        .await
        .unwrap();

    let Message::Record { version, .. } = &engine.sink().messages()[2] else {
        panic!("expected RECORD");
    };
    assert_eq!(*version, Some(1));
    assert_eq!(
        engine.sink().last_state().unwrap(),
        &json!({
            "bookmarks": {"credits": {
                "wrote_initial_activate_version": true,
                "updated_date": "2021-02-01T00:00:00.000000Z"
            }},
            "currently_syncing": "credits"
        })
    );
}

#[tokio::test]
async fn test_handle_record_without_replication_key_keeps_state() {
    let mut engine = engine(&["credits"], StateManager::in_memory());
    engine.prepare_stream("credits").await.unwrap();

    engine
        .handle_record("credits", obj(json!({"credit_id": "CR-1"})))
        .await
        .unwrap();

    assert_eq!(engine.sink().records("credits").len(), 1);
    assert_eq!(engine.sink().count(Message::is_state), 0);
    assert_eq!(engine.stats().missing_bookmarks, 1);
}

#[tokio::test]
async fn test_handle_record_substream_does_not_set_currently_syncing() {
    let state = StateManager::in_memory();
    let mut engine = engine(&["plans", "charges"], state.clone());
    engine.prepare_stream("plans").await.unwrap();

    engine
        .handle_record("charges", obj(json!({"charge_id": "CH-1"})))
        .await
        .unwrap();

    assert!(state.currently_syncing().await.is_none());
}

#[tokio::test]
async fn test_handle_record_requires_prepared_stream() {
    let mut engine = engine(&["credits"], StateManager::in_memory());

    let result = engine
        .handle_record("credits", obj(json!({"credit_id": "CR-1"})))
        .await;
    assert!(matches!(result, Err(Error::StreamNotFound { .. })));
}

// ============================================================================
// Sync Tests
// ============================================================================

#[tokio::test]
async fn test_sync_rejects_dependency_conflict() {
    let mut engine = engine(&["contacts"], StateManager::in_memory());

    let result = engine.sync().await;

    assert!(matches!(result, Err(Error::DependencyConflict { .. })));
    assert!(engine.sink().messages().is_empty());
}

#[tokio::test]
async fn test_sync_resumes_currently_syncing_stream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(page(json!([])))
        .mount(&server)
        .await;

    let state = StateManager::from_value(json!({"currently_syncing": "payments"})).unwrap();
    let mut engine = SyncEngine::new(
        run_context(&format!("{}/api/v1", server.uri())),
        catalog_with(&["credits", "payments"]),
        state.clone(),
        MemorySink::new(),
    );

    let stats = engine.sync().await.unwrap();

    let schemas: Vec<_> = kinds(engine.sink())
        .into_iter()
        .filter(|(kind, _)| *kind == "SCHEMA")
        .map(|(_, stream)| stream)
        .collect();
    assert_eq!(schemas, vec!["payments", "credits"]);
    assert_eq!(stats.streams_synced, 2);
    assert_eq!(stats.records_synced, 0);
    assert!(state.currently_syncing().await.is_none());
    assert_eq!(
        engine.sink().last_state().unwrap()["currently_syncing"],
        JsonValue::Null
    );
}

#[tokio::test]
async fn test_sync_stream_with_substreams() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/plans"))
        .and(query_param("page", "1"))
        .respond_with(page(json!([{
            "id": "P-1",
            "updated_date": "2021-01-01T00:00:00Z",
            "charges": [{"id": "CH-1"}, {"id": "CH-2"}]
        }])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/plans"))
        .and(query_param("page", "2"))
        .respond_with(page(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let mut engine = SyncEngine::new(
        run_context(&format!("{}/api/v1", server.uri())),
        catalog_with(&["plans", "charges"]),
        StateManager::in_memory(),
        MemorySink::new(),
    );

    engine.sync().await.unwrap();
    let sink = engine.into_sink();

    assert_eq!(
        kinds(&sink),
        vec![
            ("SCHEMA", "charges".to_string()),
            ("ACTIVATE_VERSION", "charges".to_string()),
            ("SCHEMA", "plans".to_string()),
            ("ACTIVATE_VERSION", "plans".to_string()),
            ("RECORD", "charges".to_string()),
            ("RECORD", "charges".to_string()),
            ("RECORD", "plans".to_string()),
            ("STATE", String::new()),
            ("STATE", String::new()),
        ]
    );
    assert_eq!(sink.records("charges")[1]["charge_id"], json!("CH-2"));
    assert_eq!(sink.records("plans")[0]["plan_id"], json!("P-1"));
}

#[tokio::test]
async fn test_sync_with_custom_filter_hook() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/webhooks"))
        .and(query_param("page", "1"))
        .respond_with(page(json!([
            {"name": "keep", "updated_date": "2019-01-01T00:00:00Z"},
            {"name": "drop"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/webhooks"))
        .and(query_param("page", "2"))
        .respond_with(page(json!([])))
        .mount(&server)
        .await;

    let hook: FilterHook = Arc::new(|record: &JsonObject, _: &crate::streams::DataContext<'_>| {
        record.get("name") == Some(&json!("drop"))
    });
    let mut engine = SyncEngine::new(
        run_context(&format!("{}/api/v1", server.uri())),
        catalog_with(&["webhooks"]),
        StateManager::in_memory(),
        MemorySink::new(),
    )
    .with_filter_hook(hook);

    engine.sync().await.unwrap();

    let records = engine.sink().records("webhooks");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["name"], json!("keep"));
}

// ============================================================================
// Event Processor Tests
// ============================================================================

#[test_case("Customer", "customers")]
#[test_case("BillingSchedule", "billing_schedules")]
#[test_case("CustomerNote", "customer_notes")]
#[test_case("ChartOfAccounts", "chart_of_accounts")]
#[test_case("Usage", "usages")]
fn test_event_stream_id(object: &str, expected: &str) {
    assert_eq!(EventProcessor::<MemorySink>::stream_id_for(object), expected);
}

#[tokio::test]
async fn test_event_emits_record_and_response_substreams() {
    let engine = engine(&["customers", "contacts"], StateManager::in_memory());
    let mut processor = EventProcessor::new(engine).unwrap();

    processor
        .process(&json!({
            "object": "Customer",
            "record": {
                "id": "C-1",
                "customer_type": "SMB",
                "updated_date": "2021-01-01T00:00:00Z",
                "contacts": [{"id": "CT-1"}]
            }
        }))
        .await
        .unwrap();

    let sink = processor.into_engine().into_sink();
    assert_eq!(
        kinds(&sink)[4..].to_vec(),
        vec![
            ("RECORD", "contacts".to_string()),
            ("RECORD", "customers".to_string()),
            ("STATE", String::new()),
        ]
    );
    assert_eq!(sink.records("customers")[0]["billing_batch"], json!("SMB"));
    assert_eq!(sink.records("contacts")[0]["contact_id"], json!("CT-1"));
}

#[tokio::test]
async fn test_event_prepares_stream_once() {
    let engine = engine(&["credits"], StateManager::in_memory());
    let mut processor = EventProcessor::new(engine).unwrap();

    for (id, updated) in [("CR-1", "2021-01-01T00:00:00Z"), ("CR-2", "2021-02-01T00:00:00Z")] {
        processor
            .process(&json!({
                "object": "Credit",
                "record": {"id": id, "updated_date": updated}
            }))
            .await
            .unwrap();
    }

    let sink = processor.engine().sink();
    assert_eq!(sink.count(Message::is_schema), 1);
    assert_eq!(sink.count(Message::is_activate_version), 1);
    assert_eq!(sink.records("credits").len(), 2);
    assert_eq!(
        sink.last_state().unwrap()["bookmarks"]["credits"]["updated_date"],
        json!("2021-02-01T00:00:00.000000Z")
    );
}

#[tokio::test]
async fn test_event_filtered_record_skips_state() {
    let state = StateManager::from_value(json!({
        "bookmarks": {"credits": {
            "updated_date": "2021-06-01T00:00:00Z",
            "wrote_initial_activate_version": true
        }}
    }))
    .unwrap();
    let mut processor = EventProcessor::new(engine(&["credits"], state)).unwrap();

    processor
        .process(&json!({
            "object": "Credit",
            "record": {"id": "CR-1", "updated_date": "2021-05-01T00:00:00Z"}
        }))
        .await
        .unwrap();

    assert_eq!(
        kinds(processor.engine().sink()),
        vec![("SCHEMA", "credits".to_string())]
    );
}

#[tokio::test]
async fn test_event_for_substream_prepares_parent() {
    let mut processor =
        EventProcessor::new(engine(&["customers", "customer_notes"], StateManager::in_memory()))
            .unwrap();

    processor
        .process(&json!({
            "object": "CustomerNote",
            "record": {"id": "N-1", "note": "Call back"}
        }))
        .await
        .unwrap();

    let sink = processor.engine().sink();
    assert_eq!(sink.count(Message::is_schema), 2);
    assert_eq!(sink.records("customer_notes")[0]["customer_note_id"], json!("N-1"));
    assert!(sink.records("customers").is_empty());
}

#[tokio::test]
async fn test_event_for_unselected_stream_is_ignored() {
    let mut processor =
        EventProcessor::new(engine(&["credits"], StateManager::in_memory())).unwrap();

    processor
        .process(&json!({"object": "Payment", "record": {"id": "PMT-1"}}))
        .await
        .unwrap();

    assert!(processor.engine().sink().messages().is_empty());
}

#[tokio::test]
async fn test_event_errors() {
    let mut processor =
        EventProcessor::new(engine(&["credits"], StateManager::in_memory())).unwrap();

    assert!(matches!(
        processor
            .process(&json!({"object": "Gadget", "record": {}}))
            .await,
        Err(Error::UnknownStream { .. })
    ));
    assert!(matches!(
        processor.process(&json!({"object": "Credit"})).await,
        Err(Error::Decode { .. })
    ));
}

#[test]
fn test_event_processor_rejects_dependency_conflict() {
    let result = EventProcessor::new(engine(&["charges"], StateManager::in_memory()));
    assert!(matches!(result, Err(Error::DependencyConflict { .. })));
}
