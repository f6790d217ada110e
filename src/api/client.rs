//! Blocking client for the tabular platform API.
//!
//! All requests go through a [`Transport`] seam so retry, pagination,
//! and shape validation stay testable without a network. The production
//! transport is a `reqwest` blocking client carrying the realm and
//! user-token headers on every call.

use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::error::{retryable_status, ApiError, ApiResult, TransportError};
use super::types::{QueryBody, QueryOptions, QueryResponse, RawRecord};
use crate::config::PlatformSettings;

/// HTTP method subset the platform API needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outbound request handed to the transport.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
        }
    }
}

/// Raw response from the transport; status is interpreted by the client.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> ApiResult<Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Seam between the client's logic and the actual HTTP stack.
pub trait Transport: Send + Sync {
    fn send(&self, req: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Production transport: blocking reqwest with platform auth headers.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    realm: String,
    token: String,
}

impl HttpTransport {
    pub fn new(platform: &PlatformSettings) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(platform.timeout_secs))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            client,
            realm: platform.realm.clone(),
            token: platform.user_token.clone(),
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, req: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let builder = match req.method {
            Method::Get => self.client.get(&req.url),
            Method::Post => self.client.post(&req.url),
        };
        let mut builder = builder
            .header("QB-Realm-Hostname", self.realm.as_str())
            .header("Authorization", format!("QB-USER-TOKEN {}", self.token))
            .header("User-Agent", "weaver");
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }
        let response = builder.send().map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(e.to_string())
            } else {
                TransportError::Network(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response
            .bytes()
            .map_err(|e| TransportError::Network(e.to_string()))?
            .to_vec();
        Ok(HttpResponse {
            status,
            body,
            content_type,
        })
    }
}

/// Retry tuning: attempt n (0-based) backs off `base_delay * 2^n`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt)
    }
}

/// Blocking fetch/query executor with retry, backoff, and pagination.
pub struct ApiClient {
    transport: Box<dyn Transport>,
    base_url: String,
    retry: RetryPolicy,
    default_page_size: usize,
}

impl ApiClient {
    pub fn new(
        transport: Box<dyn Transport>,
        base_url: impl Into<String>,
        retry: RetryPolicy,
        default_page_size: usize,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            retry,
            default_page_size,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Send with the retry policy: 429/500/502/503/504 and transport
    /// failures back off and retry; anything else propagates immediately.
    /// After the attempt ceiling the last error propagates unchanged.
    fn send_with_retry(&self, req: &HttpRequest) -> ApiResult<HttpResponse> {
        let max = self.retry.max_attempts.max(1);
        for attempt in 0..max {
            match self.transport.send(req) {
                Ok(resp) if resp.is_success() => return Ok(resp),
                Ok(resp) if retryable_status(resp.status) && attempt + 1 < max => {
                    let wait = self.retry.delay(attempt);
                    warn!(status = resp.status, url = %req.url, ?wait, "retryable API error, backing off");
                    thread::sleep(wait);
                }
                Ok(resp) => {
                    return Err(ApiError::Http {
                        status: resp.status,
                        url: req.url.clone(),
                    });
                }
                Err(err) if attempt + 1 < max => {
                    let wait = self.retry.delay(attempt);
                    warn!(error = %err, url = %req.url, ?wait, "network error, backing off");
                    thread::sleep(wait);
                }
                Err(err) => return Err(err.into()),
            }
        }
        unreachable!("retry loop always returns before exhausting attempts")
    }

    /// The platform reports some failures inside a 200 body.
    fn validate_payload(value: &Value) -> ApiResult<()> {
        match value {
            Value::Object(map) => {
                if let Some(err) = map.get("error") {
                    return Err(ApiError::Platform {
                        message: err.to_string(),
                    });
                }
                if map.get("status").and_then(Value::as_str) == Some("error") {
                    let message = map
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string();
                    return Err(ApiError::Platform { message });
                }
                Ok(())
            }
            Value::Array(_) => Ok(()),
            other => Err(ApiError::InvalidShape(format!(
                "expected object or array, got {other}"
            ))),
        }
    }

    /// GET a JSON document with retry and in-body error checking.
    pub fn get_json(&self, path: &str) -> ApiResult<Value> {
        let req = HttpRequest::get(self.url(path));
        let resp = self.send_with_retry(&req)?;
        let value = resp.json()?;
        Self::validate_payload(&value)?;
        Ok(value)
    }

    /// POST a JSON document with retry and in-body error checking.
    pub fn post_json(&self, path: &str, body: Value) -> ApiResult<Value> {
        let req = HttpRequest::post(self.url(path), body);
        let resp = self.send_with_retry(&req)?;
        let value = resp.json()?;
        Self::validate_payload(&value)?;
        Ok(value)
    }

    /// Raw GET for the attachment endpoint: bytes plus content type,
    /// no retry.
    pub fn get_bytes(&self, path: &str) -> ApiResult<(Vec<u8>, Option<String>)> {
        let req = HttpRequest::get(self.url(path));
        let resp = self.transport.send(&req)?;
        if !resp.is_success() {
            return Err(ApiError::Http {
                status: resp.status,
                url: req.url,
            });
        }
        Ok((resp.body, resp.content_type))
    }

    /// Run a records query, paginating with `skip`/`top` until a short
    /// page arrives or the accumulated count reaches `max_records`
    /// (result truncated exactly to `max_records`).
    pub fn query(
        &self,
        table_id: &str,
        body: &QueryBody,
        max_records: Option<usize>,
    ) -> ApiResult<Vec<RawRecord>> {
        let mut page_size = body
            .options
            .map(|o| o.top)
            .unwrap_or(self.default_page_size)
            .max(1);
        if let Some(max) = max_records {
            page_size = page_size.min(max.max(1));
        }

        let mut all: Vec<RawRecord> = Vec::new();
        let mut skip = 0;
        loop {
            let mut page = body.clone();
            page.from = table_id.to_string();
            page.options = Some(QueryOptions {
                skip,
                top: page_size,
            });
            let value = self.post_json("records/query", serde_json::to_value(&page)?)?;
            let response: QueryResponse = serde_json::from_value(value)?;
            let fetched = response.data.len();
            debug!(table_id, skip, fetched, "query page");
            all.extend(response.data);
            if fetched == 0 || fetched < page_size {
                break;
            }
            skip += page_size;
            if let Some(max) = max_records {
                if all.len() >= max {
                    all.truncate(max);
                    return Ok(all);
                }
            }
        }
        if let Some(max) = max_records {
            all.truncate(max);
        }
        Ok(all)
    }
}
