//! Chat notification delivery.
//!
//! One text block per report result, packed into batches bounded by a
//! character budget and posted sequentially. Notification failures are
//! logged and swallowed: delivery is best-effort and never fails the
//! invocation.

use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::config::ChatSettings;
use crate::pipeline::ReportResult;

/// Result type for chat operations.
pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("chat post failed: {0}")]
    Network(String),
}

/// `chat.postMessage`-style response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct PostResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Seam to the chat API.
pub trait ChatApi: Send + Sync {
    fn post_message(&self, channel: &str, text: &str) -> NotifyResult<PostResponse>;
}

/// Production chat API over blocking reqwest.
pub struct HttpChatApi {
    client: reqwest::blocking::Client,
    base_url: String,
    token: String,
}

impl HttpChatApi {
    pub fn new(settings: &ChatSettings) -> NotifyResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            token: settings.bot_token.clone(),
        })
    }
}

impl ChatApi for HttpChatApi {
    fn post_message(&self, channel: &str, text: &str) -> NotifyResult<PostResponse> {
        let url = format!("{}/chat.postMessage", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "channel": channel,
            "text": text,
            "mrkdwn": true,
        });
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .map_err(|e| NotifyError::Network(e.to_string()))?;
        let body: PostResponse = response
            .json()
            .map_err(|e| NotifyError::Network(e.to_string()))?;
        Ok(body)
    }
}

/// Separator between report blocks inside one message.
pub fn batch_separator() -> String {
    format!("\n\n{}\n\n", "─".repeat(50))
}

/// Batches report results into chat messages under the character budget.
pub struct Notifier<'a> {
    api: &'a dyn ChatApi,
    settings: &'a ChatSettings,
}

impl<'a> Notifier<'a> {
    pub fn new(api: &'a dyn ChatApi, settings: &'a ChatSettings) -> Self {
        Self { api, settings }
    }

    /// Pack result blocks into budget-bounded batches. Public for tests;
    /// results without report links are skipped.
    pub fn pack_batches(&self, results: &[ReportResult]) -> Vec<Vec<String>> {
        let separator_len = batch_separator().chars().count();
        let mut batches: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_size = 0usize;

        for result in results {
            let Some(first_report) = result.reports.first() else {
                continue;
            };
            let link = format!("<{}|View File>", first_report.url);
            let block = format!(
                "{}\n\n*{} Report:* {}",
                result.summary.insights, result.record_name, link
            );
            let block_size = block.chars().count() + separator_len;
            if current_size + block_size > self.settings.max_message_chars && !current.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_size = 0;
            }
            current.push(block);
            current_size += block_size;
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    /// Send all batches sequentially with the configured inter-batch
    /// delay. No-op when results, channel, or credential are absent.
    pub fn send_batched(&self, results: &[ReportResult]) {
        if results.is_empty()
            || self.settings.channel.is_empty()
            || self.settings.bot_token.is_empty()
        {
            return;
        }
        let batches = self.pack_batches(results);
        let total = batches.len();
        for (i, batch) in batches.iter().enumerate() {
            let header = if total > 1 {
                format!("📊 *Report Batch {}/{}*\n\n", i + 1, total)
            } else {
                String::new()
            };
            let separator = batch_separator();
            let message = format!("{header}{}", batch.join(separator.as_str()));
            match self.api.post_message(&self.settings.channel, &message) {
                Ok(resp) if !resp.ok => {
                    warn!(error = ?resp.error, "chat API rejected message");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "chat post failed"),
            }
            if i + 1 < total {
                thread::sleep(Duration::from_millis(self.settings.batch_delay_ms));
            }
        }
        info!(
            results = results.len(),
            batches = total,
            "sent report notifications"
        );
    }
}
