//! Platform API access: blocking HTTP client, typed wire records, and
//! the transport seam the rest of the crate is tested through.

mod client;
mod error;
mod types;

pub use client::{ApiClient, HttpRequest, HttpResponse, HttpTransport, Method, RetryPolicy, Transport};
pub use error::{retryable_status, ApiError, ApiResult, TransportError};
pub use types::{
    FieldDescriptor, FieldInfo, FieldMap, FieldValue, ForeignKeyField, QueryBody, QueryOptions,
    QueryResponse, RawRecord, RelationshipInfo, RelationshipsResponse, SortBy, SortOrder,
    TableInfo, RECORD_ID_LABEL,
};
