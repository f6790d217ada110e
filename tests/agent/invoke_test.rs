//! Invocation boundary: validation failures, clarification payloads,
//! and the success envelope.

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

    [chat]
    channel = "C123"
    bot_token = "xoxb-test"
    batch_delay_ms = 0

    [[tables]]
    name = "Customers"
    id = "bqcust"
    fields = ["Record ID# [KEY]", "Customer Name [UNIQUE]"]
"#;

fn agent(transport: ScriptedTransport) -> Agent {
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
        Box::new(MemoryStore::new()),
        Box::new(RecordingChat::new()),
        Box::new(NoopSink),
    )
}

#[test]
fn missing_prompt_is_a_flat_error_envelope() {
    let response = agent(ScriptedTransport::new()).invoke(InvocationParams::default());
    assert!(!response.ok);
    assert!(response.error.unwrap().contains("prompt"));
    assert!(response.needs_clarification.is_none());
}

#[test]
fn missing_table_names_is_a_flat_error_envelope() {
    let params = InvocationParams {
        prompt: "show customers".to_string(),
        ..InvocationParams::default()
    };
    let response = agent(ScriptedTransport::new()).invoke(params);
    assert!(!response.ok);
    assert!(response.error.unwrap().contains("table_names"));
}

#[test]
fn unmatched_table_asks_for_clarification() {
    let params = InvocationParams::new(
        "show orders".to_string(),
        vec!["Orders".to_string()],
    );
    let response = agent(ScriptedTransport::new()).invoke(params);

    assert!(!response.ok);
    assert_eq!(response.needs_clarification, Some(true));
    assert!(response.error.is_none());
    let message = response.message.unwrap();
    assert!(message.contains("Orders"));
    assert!(message.contains("- Customers"));
    let details = response.details.unwrap();
    assert_eq!(details.requested, vec!["Orders".to_string()]);
    assert_eq!(details.available, vec!["Customers".to_string()]);
}

#[test]
fn table_matching_is_case_insensitive() {
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

    let params = InvocationParams::new(
        "show customers".to_string(),
        vec!["customers".to_string()],
    );
    let response = agent(transport).invoke(params);
    assert!(response.ok, "unexpected failure: {:?}", response.error);
}

#[test]
fn success_envelope_carries_summary_and_actions() {
    let transport = ScriptedTransport::new();
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
            {"id": 7, "label": "Customer Name", "fieldType": "text"}
        ]),
    );
    transport.expect_json(
        "POST",
        "records/query",
        json!({"data": [{"3": {"value": 1}, "7": {"value": "Acme"}}]}),
    );

    let params = InvocationParams::new(
        "show customers".to_string(),
        vec!["Customers".to_string()],
    );
    let response = agent(transport).invoke(params);

    assert!(response.ok);
    assert_eq!(response.summary.as_deref(), Some("Processed 1 record(s)"));
    let actions = response.actions.unwrap();
    assert!(actions.iter().any(|a| a.service == "platform"));
    assert!(actions.iter().any(|a| a.service == "storage"));
    assert!(actions.iter().any(|a| a.service == "chat"));
}

#[test]
fn platform_failure_becomes_flat_error() {
    let transport = ScriptedTransport::new();
    // Metadata fetch fails terminally on a non-retryable status.
    transport.expect_status("GET", "tables/bqcust", 403);
    let params = InvocationParams::new(
        "show customers".to_string(),
        vec!["Customers".to_string()],
    );
    let response = agent(transport).invoke(params);
    assert!(!response.ok);
    assert!(response.error.unwrap().contains("403"));
}
