//! Invocation boundary.
//!
//! Receives the fixed parameter contract produced by the upstream
//! agent, validates it, matches table names against the configured
//! allow-lists, dispatches the right handler, and translates every
//! outcome into a flat response envelope. The table-mismatch case is
//! the one business condition deliberately turned into a structured
//! `needs_clarification` payload; every other unhandled error becomes
//! `{ok:false, error}` here and callers never see internal stack state.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::api::{ApiClient, HttpTransport, RetryPolicy, SortOrder};
use crate::clause::DateUnit;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::export::{ObjectStore, S3Store};
use crate::metrics::{Datapoint, LogSink, MetricsSink};
use crate::notify::{ChatApi, HttpChatApi};
use crate::pipeline::{
    handle_parent_child, handle_single_table, ParsedQuery, PipelineContext, ReportResult,
    ResolvedTable,
};
use crate::registry::{SystemClock, TableRegistry};

fn default_limit() -> usize {
    50
}

/// The upstream invocation contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InvocationParams {
    pub prompt: String,
    pub table_names: Vec<String>,
    pub entity_names: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub date_filter_value: Option<u32>,
    pub date_filter_unit: Option<String>,
    pub sort_field: Option<String>,
    pub sort_order: Option<String>,
}

impl Default for InvocationParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            table_names: Vec::new(),
            entity_names: Vec::new(),
            limit: default_limit(),
            date_filter_value: None,
            date_filter_unit: None,
            sort_field: None,
            sort_order: None,
        }
    }
}

impl InvocationParams {
    pub fn new(prompt: impl Into<String>, table_names: Vec<String>) -> Self {
        Self {
            prompt: prompt.into(),
            table_names,
            ..Self::default()
        }
    }
}

/// One entry in the invocation's audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct Action {
    pub service: String,
    pub action: String,
}

/// Clarification details for an unmatched table name.
#[derive(Debug, Clone, Serialize)]
pub struct ClarificationDetails {
    #[serde(rename = "type")]
    pub kind: String,
    pub requested: Vec<String>,
    pub available: Vec<String>,
}

/// Flat response envelope returned to the upstream caller.
#[derive(Debug, Serialize)]
pub struct InvocationResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reports: Option<Vec<ReportResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Action>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_clarification: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ClarificationDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvocationResponse {
    pub fn success(reports: Vec<ReportResult>, actions: Vec<Action>) -> Self {
        let summary = format!("Processed {} record(s)", reports.len());
        Self {
            ok: true,
            reports: Some(reports),
            summary: Some(summary),
            actions: Some(actions),
            needs_clarification: None,
            message: None,
            details: None,
            error: None,
        }
    }

    pub fn clarification(message: String, details: ClarificationDetails) -> Self {
        Self {
            ok: false,
            reports: None,
            summary: None,
            actions: None,
            needs_clarification: Some(true),
            message: Some(message),
            details: Some(details),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            ok: false,
            reports: None,
            summary: None,
            actions: None,
            needs_clarification: None,
            message: None,
            details: None,
            error: Some(message),
        }
    }
}

/// Outcome of table matching: resolved tables or a clarification ask.
enum TableMatch {
    Resolved(Vec<ResolvedTable>),
    Unmatched { requested: String },
}

/// The assembled service stack driving one invocation at a time.
pub struct Agent {
    settings: Settings,
    api: ApiClient,
    registry: TableRegistry,
    store: Box<dyn ObjectStore>,
    chat: Box<dyn ChatApi>,
    metrics: Box<dyn MetricsSink>,
}

impl Agent {
    /// Production wiring: blocking HTTP transport, S3 storage, chat API,
    /// log-backed metrics, wall clock.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let transport = HttpTransport::new(&settings.platform)
            .map_err(crate::api::ApiError::from)?;
        let api = ApiClient::new(
            Box::new(transport),
            settings.platform.base_url.clone(),
            RetryPolicy {
                max_attempts: settings.query.max_attempts,
                base_delay: settings.query.backoff_base(),
            },
            settings.query.default_page_size,
        );
        let registry = TableRegistry::new(settings.query.cache_ttl(), Arc::new(SystemClock));
        let store = S3Store::new(&settings.storage)?;
        let chat = HttpChatApi::new(&settings.chat)?;
        Ok(Self::new(
            settings,
            api,
            registry,
            Box::new(store),
            Box::new(chat),
            Box::new(LogSink),
        ))
    }

    /// Explicit wiring; tests inject doubles here.
    pub fn new(
        settings: Settings,
        api: ApiClient,
        registry: TableRegistry,
        store: Box<dyn ObjectStore>,
        chat: Box<dyn ChatApi>,
        metrics: Box<dyn MetricsSink>,
    ) -> Self {
        Self {
            settings,
            api,
            registry,
            store,
            chat,
            metrics,
        }
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    /// Run one invocation end to end. This is the boundary: every
    /// internal error is flattened into the response envelope.
    pub fn invoke(&self, params: InvocationParams) -> InvocationResponse {
        let start = Instant::now();
        if self.settings.debug_mode {
            self.registry.clear_all();
        }
        info!(
            prompt = %params.prompt,
            tables = ?params.table_names,
            entities = ?params.entity_names,
            limit = params.limit,
            "received invocation"
        );
        let response = match self.execute(&params) {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, "invocation failed");
                self.metrics
                    .record(&[Datapoint::count("FailedInvocations", 1.0)]);
                InvocationResponse::error(err.to_string())
            }
        };
        let elapsed = start.elapsed().as_secs_f64();
        if response.ok {
            let report_count = response.reports.as_ref().map(Vec::len).unwrap_or(0);
            self.metrics.record(&[
                Datapoint::count("ReportsGenerated", report_count as f64),
                Datapoint::seconds("ExecutionTime", elapsed),
                Datapoint::count("SuccessfulInvocations", 1.0),
            ]);
            let stats = self.registry.stats();
            info!(
                result_count = report_count,
                elapsed,
                cached_tables = stats.cached_tables,
                cached_relationships = stats.cached_relationships,
                "invocation complete"
            );
        }
        response
    }

    fn execute(&self, params: &InvocationParams) -> Result<InvocationResponse> {
        if params.prompt.is_empty() {
            return Err(Error::Validation(
                "Missing required parameter: prompt".to_string(),
            ));
        }
        if params.table_names.is_empty() {
            return Err(Error::Validation(
                "Missing required parameter: table_names".to_string(),
            ));
        }

        let tables = match self.match_tables(&params.table_names)? {
            TableMatch::Resolved(tables) => tables,
            TableMatch::Unmatched { requested } => {
                let available = self.settings.allow_lists().table_names();
                warn!(table = %requested, "table not found in allow-lists");
                let listing = available
                    .iter()
                    .map(|t| format!("- {t}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                return Ok(InvocationResponse::clarification(
                    format!(
                        "Table '{requested}' is not available. Please specify one of these \
                         tables:\n\n{listing}"
                    ),
                    ClarificationDetails {
                        kind: "table_not_found".to_string(),
                        requested: params.table_names.clone(),
                        available,
                    },
                ));
            }
        };

        let query = ParsedQuery {
            entity_names: params.entity_names.clone(),
            date_filter: match (params.date_filter_value, params.date_filter_unit.as_deref()) {
                (Some(value), Some(unit)) => Some((value, DateUnit::parse(unit))),
                _ => None,
            },
            sort_field: params.sort_field.clone(),
            sort_order: params
                .sort_order
                .as_deref()
                .map(SortOrder::parse)
                .unwrap_or_default(),
            limit: params.limit,
            tables,
        };

        let ctx = PipelineContext {
            settings: &self.settings,
            api: &self.api,
            registry: &self.registry,
            store: self.store.as_ref(),
            chat: self.chat.as_ref(),
        };

        let mut actions = vec![Action {
            service: "platform".to_string(),
            action: format!(
                "Queried tables: {:?}",
                query.tables.iter().map(|t| t.name()).collect::<Vec<_>>()
            ),
        }];
        let results = if query.tables.len() == 2 {
            handle_parent_child(&ctx, &query)?
        } else {
            handle_single_table(&ctx, &query)?
        };
        actions.push(Action {
            service: "chat".to_string(),
            action: "Sent notification to chat channel".to_string(),
        });
        actions.push(Action {
            service: "storage".to_string(),
            action: "Stored CSV report and generated signed URL".to_string(),
        });

        Ok(InvocationResponse::success(results, actions))
    }

    /// Match requested names against the allow-lists (exact, then
    /// case-insensitive) and fetch live metadata for each hit.
    fn match_tables(&self, names: &[String]) -> Result<TableMatch> {
        let mut resolved = Vec::new();
        for requested in names {
            let Some(desc) = self.settings.allow_lists().find(requested) else {
                return Ok(TableMatch::Unmatched {
                    requested: requested.clone(),
                });
            };
            let info = self.registry.table_metadata(&self.api, &desc.id)?;
            info!(table = %info.name, id = %info.id, "matched table");
            resolved.push(ResolvedTable {
                desc: desc.clone(),
                info,
            });
        }
        Ok(TableMatch::Resolved(resolved))
    }
}
