//! TOML-based configuration for Weaver.
//!
//! Supports a config file (weaver.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [platform]
//! realm = "acme.example.com"
//! user_token = "${PLATFORM_USER_TOKEN}"
//!
//! [storage]
//! bucket = "acme-reports"
//! region = "us-east-1"
//!
//! [chat]
//! channel = "C0123456789"
//! bot_token = "${CHAT_BOT_TOKEN}"
//!
//! [query]
//! cache_ttl_secs = 600
//! max_attempts = 3
//!
//! [[tables]]
//! name = "Customers"
//! id = "bqx3kz7aa"
//! fields = ["Record ID# [KEY]", "Customer Name [UNIQUE]", "Email"]
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::allowlist::{AllowLists, TableDescriptor};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required identifier: {0}")]
    MissingIdentifier(String),

    #[error("Table '{table}' declares more than one KEY field")]
    DuplicateKeyField { table: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Tabular platform connection.
    pub platform: PlatformSettings,

    /// Object storage for exported reports and attachments.
    pub storage: StorageSettings,

    /// Chat notification delivery.
    pub chat: ChatSettings,

    /// Query execution, caching and retry tuning.
    pub query: QuerySettings,

    /// Per-table allow-lists with role markers.
    pub tables: Vec<TableDescriptor>,

    /// Clear all caches at the start of every invocation.
    pub debug_mode: bool,
}

/// Tabular platform connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformSettings {
    /// Realm hostname sent with every request.
    pub realm: String,

    /// User token (supports ${ENV_VAR} expansion).
    pub user_token: String,

    /// API base URL.
    pub base_url: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            realm: String::new(),
            user_token: String::new(),
            base_url: "https://api.quickbase.com/v1".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Object storage settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Bucket name.
    pub bucket: String,

    /// Bucket region.
    pub region: String,

    /// Key prefix for exported reports.
    pub report_prefix: String,

    /// Key prefix for re-hosted attachments.
    pub attachment_prefix: String,

    /// Signed download URL lifetime in seconds.
    pub url_ttl_secs: u32,

    /// Largest attachment the formatter will re-host.
    pub max_file_size_bytes: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            report_prefix: "reports".to_string(),
            attachment_prefix: "attachments".to_string(),
            url_ttl_secs: 3600,
            max_file_size_bytes: 104_857_600,
        }
    }
}

/// Chat notification settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Destination channel id.
    pub channel: String,

    /// Bot token (supports ${ENV_VAR} expansion).
    pub bot_token: String,

    /// Chat API base URL.
    pub base_url: String,

    /// Character budget per posted message.
    pub max_message_chars: usize,

    /// Delay between batch posts in milliseconds.
    pub batch_delay_ms: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            channel: String::new(),
            bot_token: String::new(),
            base_url: "https://slack.com/api".to_string(),
            max_message_chars: 3500,
            batch_delay_ms: 1000,
        }
    }
}

/// Query execution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Metadata cache lifetime in seconds.
    pub cache_ttl_secs: u64,

    /// Attempt ceiling for retryable requests.
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds; attempt n waits `base * 2^n`.
    pub backoff_base_ms: u64,

    /// Record ceiling for unbounded child queries.
    pub large_query_threshold: usize,

    /// Default page size when no explicit `top` is requested.
    pub default_page_size: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 600,
            max_attempts: 3,
            backoff_base_ms: 1000,
            large_query_threshold: 20_000,
            default_page_size: 1000,
        }
    }
}

impl QuerySettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse settings from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let mut settings: Settings = toml::from_str(contents)?;
        settings.platform.user_token = expand_env_vars(&settings.platform.user_token)?;
        settings.chat.bot_token = expand_env_vars(&settings.chat.bot_token)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check required identifiers and allow-list invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.platform.realm.is_empty() {
            return Err(ConfigError::MissingIdentifier("platform.realm".into()));
        }
        if self.platform.user_token.is_empty() {
            return Err(ConfigError::MissingIdentifier("platform.user_token".into()));
        }
        for table in &self.tables {
            table.validate()?;
        }
        Ok(())
    }

    /// Allow-list lookup view over the configured tables.
    pub fn allow_lists(&self) -> AllowLists<'_> {
        AllowLists::new(&self.tables)
    }
}

/// Expand `${VAR}` and `$VAR` references against the process environment.
pub fn expand_env_vars(s: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' {
            if chars.peek() == Some(&'{') {
                chars.next(); // consume '{'
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch == '}' {
                        chars.next(); // consume '}'
                        break;
                    }
                    var_name.push(chars.next().unwrap());
                }
                let value = env::var(&var_name)
                    .map_err(|_| ConfigError::MissingEnvVar(var_name.clone()))?;
                result.push_str(&value);
            } else {
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        var_name.push(chars.next().unwrap());
                    } else {
                        break;
                    }
                }
                if var_name.is_empty() {
                    // Just a lone $, keep it
                    result.push('$');
                } else {
                    let value = env::var(&var_name)
                        .map_err(|_| ConfigError::MissingEnvVar(var_name.clone()))?;
                    result.push_str(&value);
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [platform]
        realm = "acme.example.com"
        user_token = "tok-123"

        [[tables]]
        name = "Customers"
        id = "bqx3kz7aa"
        fields = ["Record ID# [KEY]", "Customer Name [UNIQUE]", "Email"]
    "#;

    #[test]
    fn parses_minimal_config() {
        let settings = Settings::from_toml(MINIMAL).unwrap();
        assert_eq!(settings.platform.realm, "acme.example.com");
        assert_eq!(settings.query.cache_ttl_secs, 600);
        assert_eq!(settings.chat.max_message_chars, 3500);
        assert_eq!(settings.tables.len(), 1);
    }

    #[test]
    fn missing_realm_is_rejected() {
        let err = Settings::from_toml("[platform]\nuser_token = \"t\"").unwrap_err();
        assert!(matches!(err, ConfigError::MissingIdentifier(_)));
    }

    #[test]
    fn expands_env_vars_in_tokens() {
        env::set_var("WEAVER_TEST_TOKEN", "secret-token");
        let toml = MINIMAL.replace("tok-123", "${WEAVER_TEST_TOKEN}");
        let settings = Settings::from_toml(&toml).unwrap();
        assert_eq!(settings.platform.user_token, "secret-token");
    }

    #[test]
    fn missing_env_var_is_an_error() {
        let toml = MINIMAL.replace("tok-123", "${WEAVER_TEST_UNSET_VAR}");
        let err = Settings::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn lone_dollar_is_preserved() {
        assert_eq!(expand_env_vars("cost: $ 5").unwrap(), "cost: $ 5");
    }
}
