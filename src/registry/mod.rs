//! Table registry: TTL-cached platform metadata.
//!
//! Three process-local caches, keyed by table id: table metadata, field
//! maps, and relationship lists. Each lookup is read-check-then-refresh:
//! a valid entry is returned as-is, an expired or missing one is
//! refetched through the API client and stored whole. The clock is
//! injected so expiry is deterministic under test.
//!
//! An empty relationship list is itself cached; repeated lookups against
//! a table with no relationships must not keep hitting the platform.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use serde_json::Value;
use tracing::{info, warn};

use crate::api::{
    ApiClient, ApiError, FieldInfo, FieldMap, RelationshipInfo, RelationshipsResponse, TableInfo,
};

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, ApiError>;

/// Injected time source for TTL math.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall-clock implementation used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A cached payload and the instant it was stored.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    stored_at: SystemTime,
    data: T,
}

/// TTL cache over a shared map; entries are replaced whole, never
/// partially updated.
pub struct TtlCache<T: Clone> {
    name: &'static str,
    entries: DashMap<String, CacheEntry<T>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(name: &'static str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// A clone of the payload if present and unexpired.
    pub fn get(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        let age = self
            .clock
            .now()
            .duration_since(entry.stored_at)
            .unwrap_or_default();
        if age < self.ttl {
            Some(entry.data.clone())
        } else {
            info!(cache = self.name, key, "cache entry expired, refreshing");
            None
        }
    }

    pub fn insert(&self, key: &str, data: T) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                stored_at: self.clock.now(),
                data,
            },
        );
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry ages in seconds, for diagnostics.
    pub fn ages(&self) -> Vec<(String, f64)> {
        let now = self.clock.now();
        self.entries
            .iter()
            .map(|e| {
                let age = now.duration_since(e.stored_at).unwrap_or_default();
                (e.key().clone(), (age.as_secs_f64() * 10.0).round() / 10.0)
            })
            .collect()
    }

    /// Cached keys, for diagnostics.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

/// Cache statistics for diagnostics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub cached_tables: usize,
    pub cached_relationships: usize,
    pub cached_metadata: usize,
    pub table_ids: Vec<String>,
    pub metadata_age_sec: Vec<(String, f64)>,
    pub fields_age_sec: Vec<(String, f64)>,
    pub relationships_age_sec: Vec<(String, f64)>,
}

/// TTL-cached view of platform table metadata.
pub struct TableRegistry {
    metadata: TtlCache<TableInfo>,
    fields: TtlCache<FieldMap>,
    relationships: TtlCache<Vec<RelationshipInfo>>,
}

impl TableRegistry {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            metadata: TtlCache::new("metadata", ttl, clock.clone()),
            fields: TtlCache::new("fields", ttl, clock.clone()),
            relationships: TtlCache::new("relationships", ttl, clock),
        }
    }

    /// Fetch metadata for a single table, TTL-cached.
    pub fn table_metadata(&self, api: &ApiClient, table_id: &str) -> RegistryResult<TableInfo> {
        if let Some(cached) = self.metadata.get(table_id) {
            info!(table_id, "using cached metadata");
            return Ok(cached);
        }
        let value = api.get_json(&format!("tables/{table_id}"))?;
        if !value.is_object() {
            return Err(ApiError::InvalidShape(format!(
                "unexpected response for table {table_id}"
            )));
        }
        let info: TableInfo = serde_json::from_value(value)?;
        info!(table = %info.name, id = %info.id, "cached table metadata");
        self.metadata.insert(table_id, info.clone());
        Ok(info)
    }

    /// Load field metadata keyed by label, TTL-cached.
    pub fn field_map(&self, api: &ApiClient, table_id: &str) -> RegistryResult<FieldMap> {
        if let Some(cached) = self.fields.get(table_id) {
            info!(table_id, "using cached field map");
            return Ok(cached);
        }
        info!(table_id, "fetching field map");
        let value = api.get_json(&format!("fields?tableId={table_id}"))?;
        let Value::Array(raw) = value else {
            return Err(ApiError::InvalidShape(format!(
                "expected a field list for table {table_id}"
            )));
        };
        let mut fields = Vec::with_capacity(raw.len());
        for item in raw {
            if !item.is_object() {
                return Err(ApiError::InvalidShape(format!(
                    "invalid field entry for table {table_id}"
                )));
            }
            let field: FieldInfo = serde_json::from_value(item).map_err(|e| {
                ApiError::InvalidShape(format!("field missing required keys: {e}"))
            })?;
            fields.push(field);
        }
        let map = FieldMap::from_fields(fields);
        info!(table_id, field_count = map.len(), "cached field map");
        self.fields.insert(table_id, map.clone());
        Ok(map)
    }

    /// Retrieve declared relationships for a table, TTL-cached. An
    /// empty list is cached like any other payload.
    pub fn relationships(
        &self,
        api: &ApiClient,
        table_id: &str,
    ) -> RegistryResult<Vec<RelationshipInfo>> {
        if let Some(cached) = self.relationships.get(table_id) {
            info!(table_id, "using cached relationships");
            return Ok(cached);
        }
        let value = api.get_json(&format!("tables/{table_id}/relationships"))?;
        let rels = if value.is_object() {
            let response: RelationshipsResponse = serde_json::from_value(value)?;
            response.relationships
        } else {
            Vec::new()
        };
        if rels.is_empty() {
            warn!(table_id, "no relationships found");
        } else {
            info!(table_id, count = rels.len(), "cached relationships");
            for rel in &rels {
                let (fk_id, fk_label) = rel
                    .foreign_key_field
                    .as_ref()
                    .map(|fk| (fk.id, fk.label.as_str()))
                    .unwrap_or((0, ""));
                info!(
                    parent = %rel.parent_table_id,
                    child = %rel.child_table_id,
                    fk_id,
                    fk_label,
                    "relationship edge"
                );
            }
        }
        self.relationships.insert(table_id, rels.clone());
        Ok(rels)
    }

    /// Administrative: drop every cached entry, process-wide.
    pub fn clear_all(&self) {
        self.metadata.clear();
        self.fields.clear();
        self.relationships.clear();
        info!("cleared all caches");
    }

    /// Administrative: cache statistics with per-entry ages.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached_tables: self.fields.len(),
            cached_relationships: self.relationships.len(),
            cached_metadata: self.metadata.len(),
            table_ids: self.fields.keys(),
            metadata_age_sec: self.metadata.ages(),
            fields_age_sec: self.fields.ages(),
            relationships_age_sec: self.relationships.ages(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RetryPolicy;
    use crate::testing::{ManualClock, ScriptedTransport};
    use serde_json::json;

    fn client(transport: ScriptedTransport) -> ApiClient {
        ApiClient::new(
            Box::new(transport),
            "https://api.example.com/v1",
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::ZERO,
            },
            1000,
        )
    }

    fn fields_payload() -> Value {
        json!([
            {"id": 3, "label": "Record ID#", "fieldType": "recordid"},
            {"id": 7, "label": "Customer Name", "fieldType": "text"}
        ])
    }

    #[test]
    fn field_map_includes_record_id() {
        let transport = ScriptedTransport::new();
        transport.expect_json("GET", "fields?tableId=t1", fields_payload());
        let registry = TableRegistry::new(Duration::from_secs(600), Arc::new(SystemClock));
        let map = registry.field_map(&client(transport), "t1").unwrap();
        assert!(map.record_id().is_some());
    }

    #[test]
    fn cache_hit_within_ttl_and_refetch_after_expiry() {
        let clock = Arc::new(ManualClock::new());
        let transport = ScriptedTransport::new();
        let probe = transport.clone();
        transport.expect_json("GET", "fields?tableId=t1", fields_payload());
        transport.expect_json("GET", "fields?tableId=t1", fields_payload());
        let api = client(transport);
        let registry = TableRegistry::new(Duration::from_secs(600), clock.clone());

        let first = registry.field_map(&api, "t1").unwrap();
        let second = registry.field_map(&api, "t1").unwrap();
        assert_eq!(probe.sent(), 1);
        assert_eq!(first.len(), second.len());

        clock.advance(Duration::from_secs(601));
        registry.field_map(&api, "t1").unwrap();
        assert_eq!(probe.sent(), 2);
    }

    #[test]
    fn malformed_field_shape_is_a_validation_error() {
        let transport = ScriptedTransport::new();
        transport.expect_json("GET", "fields?tableId=t1", json!([{"label": "No Id"}]));
        let registry = TableRegistry::new(Duration::from_secs(600), Arc::new(SystemClock));
        let err = registry.field_map(&client(transport), "t1").unwrap_err();
        assert!(matches!(err, ApiError::InvalidShape(_)));
    }

    #[test]
    fn empty_relationship_list_is_cached() {
        let transport = ScriptedTransport::new();
        let probe = transport.clone();
        transport.expect_json("GET", "tables/t1/relationships", json!({"relationships": []}));
        let api = client(transport);
        let registry = TableRegistry::new(Duration::from_secs(600), Arc::new(SystemClock));

        assert!(registry.relationships(&api, "t1").unwrap().is_empty());
        assert!(registry.relationships(&api, "t1").unwrap().is_empty());
        assert_eq!(probe.sent(), 1);
    }

    #[test]
    fn clear_all_empties_every_cache() {
        let transport = ScriptedTransport::new();
        transport.expect_json("GET", "fields?tableId=t1", fields_payload());
        let api = client(transport);
        let registry = TableRegistry::new(Duration::from_secs(600), Arc::new(SystemClock));
        registry.field_map(&api, "t1").unwrap();
        assert_eq!(registry.stats().cached_tables, 1);
        registry.clear_all();
        assert_eq!(registry.stats().cached_tables, 0);
    }
}
