//! Query orchestration.
//!
//! Two handlers drive the whole report pipeline: a single-table path
//! and a parent+child path. Both resolve metadata through the registry,
//! build clauses from the allow-list roles, execute paginated queries,
//! then hand each result group to the formatter, summarizer, exporter,
//! and notifier in order.

mod parent_child;
mod single;

pub use parent_child::handle_parent_child;
pub use single::handle_single_table;

use serde::Serialize;

use crate::api::{ApiClient, SortOrder, TableInfo};
use crate::clause::DateUnit;
use crate::config::{Settings, TableDescriptor};
use crate::export::ObjectStore;
use crate::notify::ChatApi;
use crate::registry::TableRegistry;
use crate::summary::SummaryData;

/// A download link attached to a report result.
#[derive(Debug, Clone, Serialize)]
pub struct ReportLink {
    pub format: String,
    pub label: String,
    pub url: String,
}

impl ReportLink {
    pub fn csv(url: String) -> Self {
        Self {
            format: "CSV".to_string(),
            label: "Download CSV Report".to_string(),
            url,
        }
    }
}

/// One delivered result group.
#[derive(Debug, Clone, Serialize)]
pub struct ReportResult {
    pub record_name: String,
    pub summary: SummaryData,
    pub reports: Vec<ReportLink>,
}

/// A matched table: its configured allow-list plus live metadata.
#[derive(Debug, Clone)]
pub struct ResolvedTable {
    pub desc: TableDescriptor,
    pub info: TableInfo,
}

impl ResolvedTable {
    /// Display name from live metadata.
    pub fn name(&self) -> &str {
        &self.info.name
    }
}

/// Validated invocation parameters after table matching.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub tables: Vec<ResolvedTable>,
    pub entity_names: Vec<String>,
    pub date_filter: Option<(u32, DateUnit)>,
    pub sort_field: Option<String>,
    pub sort_order: SortOrder,
    pub limit: usize,
}

/// Shared services the handlers run against.
pub struct PipelineContext<'a> {
    pub settings: &'a Settings,
    pub api: &'a ApiClient,
    pub registry: &'a TableRegistry,
    pub store: &'a dyn ObjectStore,
    pub chat: &'a dyn ChatApi,
}
