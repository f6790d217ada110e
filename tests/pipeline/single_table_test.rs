//! End-to-end single-table scenario against scripted doubles.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use weaver::agent::{Agent, InvocationParams};
use weaver::api::{ApiClient, RetryPolicy};
use weaver::config::Settings;
use weaver::metrics::NoopSink;
use weaver::registry::{SystemClock, TableRegistry};
use weaver::testing::{FailingStore, MemoryStore, RecordingChat, ScriptedTransport};

const CONFIG: &str = r#"
    [platform]
    realm = "acme.example.com"
    user_token = "tok-test"

    [storage]
    bucket = "test-bucket"

    [chat]
    channel = "C123"
    bot_token = "xoxb-test"
    batch_delay_ms = 0

    [[tables]]
    name = "Customers"
    id = "bqcust"
    fields = ["Record ID# [KEY]", "Customer Name [UNIQUE]", "Email"]
"#;

fn agent_with(
    transport: ScriptedTransport,
    store: MemoryStore,
    chat: RecordingChat,
) -> Agent {
    let settings = Settings::from_toml(CONFIG).unwrap();
    let api = ApiClient::new(
        Box::new(transport),
        settings.platform.base_url.clone(),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        },
        settings.query.default_page_size,
    );
    let registry = TableRegistry::new(settings.query.cache_ttl(), Arc::new(SystemClock));
    Agent::new(
        settings,
        api,
        registry,
        Box::new(store),
        Box::new(chat),
        Box::new(NoopSink),
    )
}

fn script_happy_path(transport: &ScriptedTransport) {
    transport.expect_json(
        "GET",
        "tables/bqcust",
        json!({"id": "bqcust", "name": "Customers"}),
    );
    transport.expect_json(
        "GET",
        "fields?tableId=bqcust",
        json!([
            {"id": 3, "label": "Record ID#", "fieldType": "recordid"},
            {"id": 7, "label": "Customer Name", "fieldType": "text"},
            {"id": 9, "label": "Email", "fieldType": "email"}
        ]),
    );
    transport.expect_json(
        "POST",
        "records/query",
        json!({"data": [{
            "3": {"value": 1},
            "7": {"value": "Acme Corp"},
            "9": {"value": "info@acme.test"}
        }]}),
    );
}

#[test]
fn single_table_query_produces_one_report_and_one_notification() {
    let transport = ScriptedTransport::new();
    script_happy_path(&transport);
    let store = MemoryStore::new();
    let chat = RecordingChat::new();
    let agent = agent_with(transport, store.clone(), chat.clone());

    let params = InvocationParams {
        prompt: "show customers named Acme".to_string(),
        table_names: vec!["Customers".to_string()],
        entity_names: vec!["Acme".to_string()],
        limit: 10,
        ..InvocationParams::default()
    };
    let response = agent.invoke(params);

    assert!(response.ok, "unexpected failure: {:?}", response.error);
    let reports = response.reports.unwrap();
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].record_name.is_empty());
    assert_eq!(reports[0].reports.len(), 1);
    assert_eq!(reports[0].reports[0].format, "CSV");
    assert!(reports[0].reports[0].url.contains("reports/"));

    // One CSV landed in storage under the reports prefix.
    let keys = store.keys();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("reports/Customers_1_"));
    assert!(keys[0].ends_with(".csv"));

    // Exactly one notification batch.
    let posts = chat.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].0, "C123");
    assert!(posts[0].1.contains("View File"));
}

#[test]
fn empty_result_set_produces_no_reports_and_no_notification() {
    let transport = ScriptedTransport::new();
    transport.expect_json(
        "GET",
        "tables/bqcust",
        json!({"id": "bqcust", "name": "Customers"}),
    );
    transport.expect_json(
        "GET",
        "fields?tableId=bqcust",
        json!([{"id": 3, "label": "Record ID#", "fieldType": "recordid"}]),
    );
    transport.expect_json("POST", "records/query", json!({"data": []}));
    let store = MemoryStore::new();
    let chat = RecordingChat::new();
    let agent = agent_with(transport, store.clone(), chat.clone());

    let response = agent.invoke(InvocationParams::new(
        "show customers".to_string(),
        vec!["Customers".to_string()],
    ));

    assert!(response.ok);
    assert!(response.reports.unwrap().is_empty());
    assert!(store.keys().is_empty());
    assert!(chat.posts().is_empty());
}

#[test]
fn export_failure_downgrades_result_instead_of_aborting() {
    let transport = ScriptedTransport::new();
    script_happy_path(&transport);
    let chat = RecordingChat::new();

    let settings = Settings::from_toml(CONFIG).unwrap();
    let api = ApiClient::new(
        Box::new(transport),
        settings.platform.base_url.clone(),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        },
        settings.query.default_page_size,
    );
    let registry = TableRegistry::new(settings.query.cache_ttl(), Arc::new(SystemClock));
    let agent = Agent::new(
        settings,
        api,
        registry,
        Box::new(FailingStore),
        Box::new(chat.clone()),
        Box::new(NoopSink),
    );

    let response = agent.invoke(InvocationParams::new(
        "show customers".to_string(),
        vec!["Customers".to_string()],
    ));

    assert!(response.ok);
    let reports = response.reports.unwrap();
    assert_eq!(reports.len(), 1);
    // Downgraded: the result survives with no report links...
    assert!(reports[0].reports.is_empty());
    // ...and the link-less result is skipped by the notifier.
    assert!(chat.posts().is_empty());
}
