//! Parent+child scenarios: relationship traversal, wide-row flattening,
//! and the no-edge fallback.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use weaver::agent::{Agent, InvocationParams};
use weaver::api::{ApiClient, RetryPolicy};
use weaver::config::Settings;
use weaver::metrics::NoopSink;
use weaver::registry::{SystemClock, TableRegistry};
use weaver::testing::{MemoryStore, RecordingChat, ScriptedTransport};

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
    fields = ["Record ID# [KEY]", "Customer Name [UNIQUE]"]

    [[tables]]
    name = "Customer Support Tickets"
    id = "bqtick"
    fields = [
        "Record ID# [KEY]",
        "Ticket Id [UNIQUE]",
        "Status",
        "Date Opened [DATE]",
        "Related Customer [RELATED KEY]",
    ]
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

fn script_tables_and_fields(transport: &ScriptedTransport) {
    transport.expect_json(
        "GET",
        "tables/bqcust",
        json!({"id": "bqcust", "name": "Customers"}),
    );
    transport.expect_json(
        "GET",
        "tables/bqtick",
        json!({"id": "bqtick", "name": "Customer Support Tickets"}),
    );
    transport.expect_json(
        "GET",
        "fields?tableId=bqcust",
        json!([
            {"id": 3, "label": "Record ID#", "fieldType": "recordid"},
            {"id": 7, "label": "Customer Name", "fieldType": "text"}
        ]),
    );
    // Parent query comes before the child field map is loaded.
    transport.expect_json(
        "POST",
        "records/query",
        json!({"data": [{
            "3": {"value": 1},
            "7": {"value": "Acme Corp"}
        }]}),
    );
    transport.expect_json(
        "GET",
        "fields?tableId=bqtick",
        json!([
            {"id": 3, "label": "Record ID#", "fieldType": "recordid"},
            {"id": 6, "label": "Ticket Id", "fieldType": "text"},
            {"id": 9, "label": "Status", "fieldType": "text"},
            {"id": 8, "label": "Date Opened", "fieldType": "date"},
            {"id": 15, "label": "Related Customer", "fieldType": "numeric"}
        ]),
    );
}

fn params() -> InvocationParams {
    InvocationParams {
        prompt: "tickets per customer".to_string(),
        table_names: vec![
            "Customers".to_string(),
            "Customer Support Tickets".to_string(),
        ],
        entity_names: vec!["Acme Corp".to_string()],
        limit: 10,
        ..InvocationParams::default()
    }
}

#[test]
fn joins_children_into_wide_rows_and_embeds_csv_link() {
    let transport = ScriptedTransport::new();
    script_tables_and_fields(&transport);
    transport.expect_json(
        "GET",
        "tables/bqtick/relationships",
        json!({"relationships": [{
            "parentTableId": "bqcust",
            "childTableId": "bqtick",
            "foreignKeyField": {"id": 15, "label": "Related Customer"}
        }]}),
    );
    transport.expect_json(
        "POST",
        "records/query",
        json!({"data": [
            {
                "3": {"value": 11},
                "6": {"value": "T-1"},
                "9": {"value": "Open"},
                "8": {"value": "2026-08-01"},
                "15": {"value": 1}
            },
            {
                "3": {"value": 12},
                "6": {"value": "T-2"},
                "9": {"value": "Closed"},
                "8": {"value": "2026-08-03"},
                "15": {"value": 1}
            }
        ]}),
    );
    let store = MemoryStore::new();
    let chat = RecordingChat::new();
    let agent = agent_with(transport, store.clone(), chat.clone());

    let response = agent.invoke(params());

    assert!(response.ok, "unexpected failure: {:?}", response.error);
    let reports = response.reports.unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.record_name, "Customers_1");
    assert_eq!(report.reports.len(), 1);
    assert!(report.summary.insights.contains("**Data Exports:**"));
    assert_eq!(report.summary.statistics["total_records"], json!(2));

    // The uploaded CSV holds one wide row per child, parent columns first.
    let keys = store.keys();
    assert_eq!(keys.len(), 1);
    let body = String::from_utf8(store.object(&keys[0]).unwrap()).unwrap();
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.get(0), Some("Customers_Record ID#"));
    assert!(headers
        .iter()
        .any(|h| h == "Customer Support Tickets_Ticket Id"));
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);

    assert_eq!(chat.posts().len(), 1);
}

#[test]
fn missing_relationship_edge_still_yields_parent_only_result() {
    let transport = ScriptedTransport::new();
    script_tables_and_fields(&transport);
    // The child table declares no relationships at all.
    transport.expect_json(
        "GET",
        "tables/bqtick/relationships",
        json!({"relationships": []}),
    );
    let store = MemoryStore::new();
    let chat = RecordingChat::new();
    let agent = agent_with(transport, store.clone(), chat.clone());

    let response = agent.invoke(params());

    assert!(response.ok, "unexpected failure: {:?}", response.error);
    let reports = response.reports.unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];

    // Empty child set: the summary narrative says so.
    assert!(report
        .summary
        .insights
        .contains("No Customer Support Tickets records found"));
    assert_eq!(report.summary.statistics["total_records"], json!(0));

    // The exported row carries only parent-derived columns.
    let keys = store.keys();
    assert_eq!(keys.len(), 1);
    let body = String::from_utf8(store.object(&keys[0]).unwrap()).unwrap();
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let headers = reader.headers().unwrap().clone();
    assert!(headers.iter().all(|h| h.starts_with("Customers_")));
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 1);
}
