//! Test doubles for exercising the pipeline without a network.
//!
//! These implement the crate's seams ([`Clock`](crate::registry::Clock),
//! [`Transport`](crate::api::Transport), [`ObjectStore`](crate::export::ObjectStore),
//! and [`ChatApi`](crate::notify::ChatApi)) with deterministic
//! in-memory behavior. Each double is cheaply clonable and shares its
//! state, so a test can keep a probe handle after handing the double to
//! the code under test.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use serde_json::Value;

use crate::api::{HttpRequest, HttpResponse, Method, Transport, TransportError};
use crate::export::{ExportError, ExportResult, ObjectStore};
use crate::notify::{ChatApi, NotifyResult, PostResponse};
use crate::registry::Clock;

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            now: Mutex::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap()
    }
}

struct ScriptedResponse {
    method: Method,
    path_fragment: String,
    response: HttpResponse,
}

/// Transport double fed with canned responses.
///
/// Each expectation is consumed by the first matching request; a
/// request with no matching expectation panics with the offending URL.
#[derive(Clone)]
pub struct ScriptedTransport {
    inner: Arc<ScriptedInner>,
}

struct ScriptedInner {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    sent: AtomicUsize,
}

impl ScriptedTransport {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ScriptedInner {
                responses: Mutex::new(VecDeque::new()),
                sent: AtomicUsize::new(0),
            }),
        }
    }

    fn parse_method(method: &str) -> Method {
        match method {
            "POST" => Method::Post,
            _ => Method::Get,
        }
    }

    /// Queue a 200 JSON response for the next request whose URL contains
    /// `path_fragment`.
    pub fn expect_json(&self, method: &str, path_fragment: &str, body: Value) {
        self.push(ScriptedResponse {
            method: Self::parse_method(method),
            path_fragment: path_fragment.to_string(),
            response: HttpResponse {
                status: 200,
                body: serde_json::to_vec(&body).unwrap(),
                content_type: Some("application/json".to_string()),
            },
        });
    }

    /// Queue a bare status response (empty JSON body).
    pub fn expect_status(&self, method: &str, path_fragment: &str, status: u16) {
        self.push(ScriptedResponse {
            method: Self::parse_method(method),
            path_fragment: path_fragment.to_string(),
            response: HttpResponse {
                status,
                body: b"{}".to_vec(),
                content_type: Some("application/json".to_string()),
            },
        });
    }

    /// Queue raw bytes, e.g. for the attachment endpoint.
    pub fn expect_bytes(
        &self,
        method: &str,
        path_fragment: &str,
        body: Vec<u8>,
        content_type: &str,
    ) {
        self.push(ScriptedResponse {
            method: Self::parse_method(method),
            path_fragment: path_fragment.to_string(),
            response: HttpResponse {
                status: 200,
                body,
                content_type: Some(content_type.to_string()),
            },
        });
    }

    fn push(&self, scripted: ScriptedResponse) {
        self.inner.responses.lock().unwrap().push_back(scripted);
    }

    /// Requests seen so far.
    pub fn sent(&self) -> usize {
        self.inner.sent.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, req: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.inner.sent.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.inner.responses.lock().unwrap();
        let position = responses
            .iter()
            .position(|r| r.method == req.method && req.url.contains(&r.path_fragment));
        match position {
            Some(i) => Ok(responses.remove(i).unwrap().response),
            None => panic!("no scripted response for {:?} {}", req.method, req.url),
        }
    }
}

/// In-memory object store.
#[derive(Clone)]
pub struct MemoryStore {
    objects: Arc<Mutex<Vec<(String, Vec<u8>, String)>>>,
}

impl MemoryStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Keys uploaded so far, in order.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _, _)| k.clone())
            .collect()
    }

    /// Body of an uploaded object.
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _, _)| k == key)
            .map(|(_, body, _)| body.clone())
    }
}

impl ObjectStore for MemoryStore {
    fn put_object(&self, key: &str, body: &[u8], content_type: &str) -> ExportResult<()> {
        self.objects.lock().unwrap().push((
            key.to_string(),
            body.to_vec(),
            content_type.to_string(),
        ));
        Ok(())
    }

    fn presigned_url(&self, key: &str, ttl_secs: u32) -> ExportResult<String> {
        Ok(format!("https://storage.test/{key}?expires={ttl_secs}"))
    }
}

/// Object store whose uploads always fail; exercises the export
/// downgrade path.
#[derive(Clone, Default)]
pub struct FailingStore;

impl ObjectStore for FailingStore {
    fn put_object(&self, _key: &str, _body: &[u8], _content_type: &str) -> ExportResult<()> {
        Err(ExportError::Storage("upload refused".to_string()))
    }

    fn presigned_url(&self, _key: &str, _ttl_secs: u32) -> ExportResult<String> {
        Err(ExportError::Storage("upload refused".to_string()))
    }
}

/// Chat double that records every post and always answers ok.
#[derive(Clone)]
pub struct RecordingChat {
    posts: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingChat {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            posts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// `(channel, text)` pairs posted so far.
    pub fn posts(&self) -> Vec<(String, String)> {
        self.posts.lock().unwrap().clone()
    }
}

impl ChatApi for RecordingChat {
    fn post_message(&self, channel: &str, text: &str) -> NotifyResult<PostResponse> {
        self.posts
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(PostResponse {
            ok: true,
            error: None,
            extra: serde_json::Map::new(),
        })
    }
}
