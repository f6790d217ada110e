//! Settings loading from disk, env expansion, and allow-list parsing.

use std::io::Write;

use weaver::config::{ConfigError, FieldRole, Settings};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn loads_a_full_config_from_disk() {
    let file = write_config(
        r#"
        debug_mode = true

        [platform]
        realm = "acme.example.com"
        user_token = "tok-123"
        timeout_secs = 15

        [storage]
        bucket = "acme-reports"
        region = "eu-west-1"
        url_ttl_secs = 900

        [chat]
        channel = "C042"
        bot_token = "xoxb-42"

        [query]
        cache_ttl_secs = 120
        max_attempts = 5

        [[tables]]
        name = "Customers"
        id = "bqcust"
        fields = ["Record ID# [KEY]", "Customer Name [UNIQUE]", "Email"]

        [[tables]]
        name = "Customer Support Tickets"
        id = "bqtick"
        fields = [
            "Record ID# [KEY]",
            "Date Opened [DATE]",
            "Related Customer [RELATED KEY]",
        ]
        "#,
    );

    let settings = Settings::from_file(file.path()).unwrap();
    assert!(settings.debug_mode);
    assert_eq!(settings.platform.timeout_secs, 15);
    assert_eq!(settings.storage.region, "eu-west-1");
    assert_eq!(settings.storage.url_ttl_secs, 900);
    assert_eq!(settings.query.max_attempts, 5);
    assert_eq!(settings.tables.len(), 2);

    let tickets = settings.allow_lists().find("Customer Support Tickets").unwrap();
    assert_eq!(tickets.key_field().unwrap().label, "Record ID#");
    assert_eq!(tickets.date_field().unwrap().label, "Date Opened");
    let related: Vec<_> = tickets.related_key_fields().collect();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].role, Some(FieldRole::RelatedKey));
}

#[test]
fn missing_file_is_reported() {
    let err = Settings::from_file("/nonexistent/weaver.toml").unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound(_)));
}

#[test]
fn duplicate_key_marker_is_rejected() {
    let file = write_config(
        r#"
        [platform]
        realm = "acme.example.com"
        user_token = "tok-123"

        [[tables]]
        name = "Customers"
        id = "bqcust"
        fields = ["Record ID# [KEY]", "Customer Name [KEY]"]
        "#,
    );
    let err = Settings::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateKeyField { .. }));
}

#[test]
fn tokens_expand_from_the_environment() {
    std::env::set_var("WEAVER_IT_TOKEN", "expanded-secret");
    let file = write_config(
        r#"
        [platform]
        realm = "acme.example.com"
        user_token = "${WEAVER_IT_TOKEN}"
        "#,
    );
    let settings = Settings::from_file(file.path()).unwrap();
    assert_eq!(settings.platform.user_token, "expanded-secret");
}
