//! Typed wire records for the tabular platform API.
//!
//! Every struct models the keys the pipeline actually reads and folds
//! anything else into a late-bound extras bag, so upstream additions
//! never break decoding. Shape problems are rejected here, at the
//! client boundary, not deep inside the pipeline.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Label of the platform's numeric record-id field.
pub const RECORD_ID_LABEL: &str = "Record ID#";

/// One field as returned by `GET /fields?tableId=`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInfo {
    pub id: i64,
    pub label: String,
    #[serde(rename = "fieldType", default)]
    pub field_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Resolved field metadata keyed by label; one per table, cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldMap {
    by_label: HashMap<String, FieldDescriptor>,
}

/// The slice of field metadata the pipeline needs per label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub id: i64,
    pub field_type: Option<String>,
}

impl FieldMap {
    pub fn from_fields(fields: Vec<FieldInfo>) -> Self {
        let by_label = fields
            .into_iter()
            .map(|f| {
                (
                    f.label,
                    FieldDescriptor {
                        id: f.id,
                        field_type: f.field_type,
                    },
                )
            })
            .collect();
        Self { by_label }
    }

    pub fn get(&self, label: &str) -> Option<&FieldDescriptor> {
        self.by_label.get(label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.by_label.contains_key(label)
    }

    /// Metadata for the platform record-id field, when present upstream.
    pub fn record_id(&self) -> Option<&FieldDescriptor> {
        self.by_label.get(RECORD_ID_LABEL)
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}

/// Table metadata from `GET /tables/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The foreign-key half of a relationship edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyField {
    pub id: i64,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One declared parent↔child edge from `GET /tables/{id}/relationships`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipInfo {
    #[serde(rename = "parentTableId")]
    pub parent_table_id: String,
    #[serde(rename = "childTableId", default)]
    pub child_table_id: String,
    #[serde(rename = "foreignKeyField", default)]
    pub foreign_key_field: Option<ForeignKeyField>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Envelope around the relationships list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationshipsResponse {
    #[serde(default)]
    pub relationships: Vec<RelationshipInfo>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sort direction on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[serde(rename = "ASC")]
    Asc,
    #[default]
    #[serde(rename = "DESC")]
    Desc,
}

impl SortOrder {
    /// Parse a loose upstream string; anything unrecognized sorts descending.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }
}

/// One `sortBy` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortBy {
    #[serde(rename = "fieldId")]
    pub field_id: i64,
    pub order: SortOrder,
}

/// Pagination window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueryOptions {
    pub skip: usize,
    pub top: usize,
}

/// POST `records/query` body. Constructed per call, never persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryBody {
    pub from: String,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<i64>>,
    #[serde(rename = "sortBy", skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<Vec<SortBy>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<QueryOptions>,
}

/// One cell of a raw record: the platform wraps every value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldValue {
    #[serde(default)]
    pub value: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A raw record keyed by stringified field id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub HashMap<String, FieldValue>);

impl RawRecord {
    /// The unwrapped value for a field id, if present and non-null.
    pub fn value_of(&self, field_id: i64) -> Option<&Value> {
        self.0
            .get(&field_id.to_string())
            .map(|fv| &fv.value)
            .filter(|v| !v.is_null())
    }
}

/// POST `records/query` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub data: Vec<RawRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
