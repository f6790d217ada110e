//! Record formatting: project raw platform records onto clean,
//! allow-list-ordered label→value maps, dereferencing attachments to
//! storage URLs along the way.

mod attachment;

pub use attachment::{AttachmentError, AttachmentResolver};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

use crate::api::{FieldMap, RawRecord};
use crate::config::TableDescriptor;

/// Platform file references embed `/files/{table}/{record}/{field}/{version}`.
static FILE_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/files/[^/]+/(\d+)/\d+/(\d+)").unwrap());

/// Entity-name stop-words skipped when deriving a record-group name.
const NAME_STOP_WORDS: &[&str] = &["show", "list", "get", "return"];

/// Fallback record-group suffix.
const DEFAULT_GROUP_SUFFIX: &str = "record";

/// A formatted record: allow-list-ordered label→value pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormattedRecord {
    fields: Vec<(String, Value)>,
}

impl FormattedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, value: Value) {
        self.fields.push((label.into(), value));
    }

    pub fn get(&self, label: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(l, v)| (l.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for FormattedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (label, value) in &self.fields {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

/// Numeric record id from a raw record, tolerating stringified ids.
pub fn record_id_of(record: &RawRecord, field_map: &FieldMap) -> Option<i64> {
    let rid = field_map.record_id()?;
    match record.value_of(rid.id)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Project a raw record onto its allow-listed labels. File-typed values
/// are re-hosted through the resolver and replaced with signed URLs; on
/// failure the platform reference is kept. Labels with no resolvable
/// metadata are skipped with a warning.
pub fn format_record(
    record: &RawRecord,
    table: &TableDescriptor,
    field_map: &FieldMap,
    attachments: &AttachmentResolver<'_>,
) -> FormattedRecord {
    let record_id = record_id_of(record, field_map);
    let mut output = FormattedRecord::new();

    for label in table.labels() {
        let Some(meta) = field_map.get(label) else {
            warn!(label, table = %table.name, "label not found in field map, skipping");
            continue;
        };
        let value = record.value_of(meta.id).cloned().unwrap_or(Value::Null);

        let is_file = meta.field_type.as_deref() == Some("file");
        if is_file {
            if let Value::Object(obj) = &value {
                let platform_url = obj.get("url").and_then(Value::as_str).unwrap_or_default();
                let (parsed_rid, parsed_version) = parse_file_path(platform_url);
                let version = attachment_version(obj).or(parsed_version).unwrap_or(1);
                let rid = record_id.or(parsed_rid);
                let resolved = rid.and_then(|rid| {
                    attachments.process(
                        &table.id,
                        rid,
                        meta.id,
                        version,
                        &storage_prefix(&table.name),
                    )
                });
                let final_url = resolved.unwrap_or_else(|| platform_url.to_string());
                output.insert(label, Value::String(final_url));
                continue;
            }
        }
        output.insert(label, value);
    }
    output
}

/// First declared version number on an attachment value.
fn attachment_version(obj: &serde_json::Map<String, Value>) -> Option<i64> {
    let versions = obj.get("versions")?.as_array()?;
    match versions.first()?.get("versionNumber")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Recover (record id, version) from a platform file path.
fn parse_file_path(url: &str) -> (Option<i64>, Option<i64>) {
    match FILE_PATH_RE.captures(url) {
        Some(caps) => (
            caps.get(1).and_then(|m| m.as_str().parse().ok()),
            caps.get(2).and_then(|m| m.as_str().parse().ok()),
        ),
        None => (None, None),
    }
}

/// Lowercased, underscore-joined table name for storage key prefixes.
pub fn storage_prefix(table_name: &str) -> String {
    table_name.to_lowercase().replace(' ', "_")
}

/// Flatten-time re-resolution: swap an attachment-shaped value that
/// survived formatting for a storage URL. Returns `None` when the value
/// is not an attachment reference; on transfer failure the platform URL
/// comes back instead.
pub fn reresolve_attachment(
    obj: &serde_json::Map<String, Value>,
    table: &TableDescriptor,
    label: &str,
    raw: &RawRecord,
    field_map: &FieldMap,
    resolver: &AttachmentResolver<'_>,
) -> Option<String> {
    let url = obj.get("url")?.as_str()?;
    if !url.contains("/files/") {
        return None;
    }
    let version = attachment_version(obj)
        .or_else(|| parse_file_path(url).1)
        .unwrap_or(1);
    let rid = record_id_of(raw, field_map).or_else(|| parse_file_path(url).0)?;
    let field_id = field_map.get(label)?.id;
    Some(
        resolver
            .process(&table.id, rid, field_id, version, &storage_prefix(&table.name))
            .unwrap_or_else(|| url.to_string()),
    )
}

/// Derive a record-group name safe for storage keys: the first
/// populated allow-listed field value, else the first non-stop-word
/// entity name, else a fixed default. All three forms are prefixed
/// with the table name.
pub fn record_group_name(
    table_name: &str,
    table: &TableDescriptor,
    field_map: &FieldMap,
    record: Option<&RawRecord>,
    entity_names: &[String],
) -> String {
    let base = table_name.replace(' ', "_");

    if let Some(record) = record {
        for label in table.labels() {
            let Some(meta) = field_map.get(label) else {
                continue;
            };
            if let Some(value) = record.value_of(meta.id) {
                if let Some(text) = populated_text(value) {
                    let safe: String = text
                        .trim()
                        .replace(' ', "_")
                        .chars()
                        .take(50)
                        .collect();
                    return format!("{base}_{safe}");
                }
            }
        }
    }

    for name in entity_names {
        if !NAME_STOP_WORDS.contains(&name.to_lowercase().as_str()) {
            let safe = name.trim().replace(' ', "_");
            return format!("{base}_{safe}");
        }
    }

    format!("{base}_{DEFAULT_GROUP_SUFFIX}")
}

/// A scalar rendering of a populated value; empty-ish values yield None.
fn populated_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// Render an already-formatted value to a CSV cell: attachment URLs and
/// scalars pass through, nested structures become JSON text.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => value.to_string(),
        other => other.to_string(),
    }
}
