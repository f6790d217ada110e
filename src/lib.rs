//! # Weaver
//!
//! Turns loosely structured parameters from an upstream language-model
//! agent into validated queries against a tabular data platform, joins
//! related tables, and delivers the shaped results as exported reports
//! and chat notifications.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Invocation Contract (prompt, tables, filters)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [agent: validate + match tables]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Registry (TTL-cached metadata, fields, relationships)  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [clause builder: roles → filters]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Pipeline (single-table / parent+child handlers)      │
//! │         + paginated execution via the API client         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [format / summarize]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Export (CSV → object storage → signed URL) + Notify    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything is blocking and request-scoped; the only state that
//! outlives an invocation is the registry's TTL caches and the
//! artifacts uploaded to object storage.

pub mod agent;
pub mod api;
pub mod clause;
pub mod config;
pub mod error;
pub mod export;
pub mod format;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod registry;
pub mod summary;
pub mod testing;

pub use error::{Error, Result};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::agent::{Agent, InvocationParams, InvocationResponse};
    pub use crate::api::{ApiClient, FieldMap, QueryBody, RawRecord, RetryPolicy, SortOrder};
    pub use crate::clause::DateUnit;
    pub use crate::config::{FieldRole, Settings, TableDescriptor};
    pub use crate::export::{FlatRow, ObjectStore};
    pub use crate::format::FormattedRecord;
    pub use crate::pipeline::{ReportLink, ReportResult};
    pub use crate::registry::{SystemClock, TableRegistry};
    pub use crate::summary::{generate_summary, SummaryData};
}
