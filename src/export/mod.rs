//! Report export: CSV serialization, object-storage upload, and signed
//! download URLs.
//!
//! Storage sits behind the [`ObjectStore`] trait; production uses an S3
//! bucket through the synchronous `rust-s3` backend, tests use the
//! in-memory store from `crate::testing`.

use tracing::info;

use crate::config::StorageSettings;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Errors that can occur during export and upload.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("CSV export expects a non-empty list of flat rows")]
    EmptyInput,

    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("object storage error: {0}")]
    Storage(String),
}

/// One denormalized row: ordered column→cell pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatRow {
    cells: Vec<(String, String)>,
}

impl FlatRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column; the first row's insertion order becomes the
    /// CSV header order.
    pub fn push(&mut self, column: impl Into<String>, cell: impl Into<String>) {
        self.cells.push((column.into(), cell.into()));
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Serialize flat rows to CSV. The header derives from the first row's
/// columns only: columns absent from the first row are dropped, cells
/// missing from later rows are left empty.
pub fn csv_bytes(rows: &[FlatRow]) -> ExportResult<Vec<u8>> {
    let Some(first) = rows.first() else {
        return Err(ExportError::EmptyInput);
    };
    if first.is_empty() {
        return Err(ExportError::EmptyInput);
    }
    let headers: Vec<&str> = first.columns().collect();
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&headers)?;
    for row in rows {
        let record: Vec<&str> = headers
            .iter()
            .map(|h| row.get(h).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Storage(e.to_string()))
}

/// Seam to the object storage service.
pub trait ObjectStore: Send + Sync {
    fn put_object(&self, key: &str, body: &[u8], content_type: &str) -> ExportResult<()>;

    /// Time-limited signed download URL for an uploaded key.
    fn presigned_url(&self, key: &str, ttl_secs: u32) -> ExportResult<String>;
}

/// S3-backed store over the blocking `rust-s3` client.
pub struct S3Store {
    bucket: Box<s3::Bucket>,
}

impl S3Store {
    pub fn new(settings: &StorageSettings) -> ExportResult<Self> {
        let region: s3::Region = settings
            .region
            .parse()
            .map_err(|e| ExportError::Storage(format!("invalid region: {e}")))?;
        let credentials = s3::creds::Credentials::default()
            .map_err(|e| ExportError::Storage(e.to_string()))?;
        let bucket = s3::Bucket::new(&settings.bucket, region, credentials)
            .map_err(|e| ExportError::Storage(e.to_string()))?;
        Ok(Self { bucket })
    }
}

impl ObjectStore for S3Store {
    fn put_object(&self, key: &str, body: &[u8], content_type: &str) -> ExportResult<()> {
        self.bucket
            .put_object_with_content_type(key, body, content_type)
            .map_err(|e| ExportError::Storage(e.to_string()))?;
        Ok(())
    }

    fn presigned_url(&self, key: &str, ttl_secs: u32) -> ExportResult<String> {
        self.bucket
            .presign_get(key, ttl_secs, None)
            .map_err(|e| ExportError::Storage(e.to_string()))
    }
}

/// Uploads serialized reports and hands back signed URLs.
pub struct Exporter<'a> {
    store: &'a dyn ObjectStore,
    settings: &'a StorageSettings,
}

impl<'a> Exporter<'a> {
    pub fn new(store: &'a dyn ObjectStore, settings: &'a StorageSettings) -> Self {
        Self { store, settings }
    }

    /// Serialize rows, upload under
    /// `{prefix}/{record_name}_{UTCtimestamp}.csv`, return a signed URL.
    pub fn save_csv(&self, rows: &[FlatRow], record_name: &str) -> ExportResult<String> {
        let body = csv_bytes(rows)?;
        let key = format!(
            "{}/{}_{}.csv",
            self.settings.report_prefix,
            record_name,
            utc_stamp()
        );
        info!(
            key = %key,
            kb = body.len() as f64 / 1000.0,
            rows = rows.len(),
            "uploading CSV report"
        );
        self.store.put_object(&key, &body, "text/csv")?;
        self.store.presigned_url(&key, self.settings.url_ttl_secs)
    }
}

/// Compact UTC timestamp for storage keys: `20260807T141500Z`.
pub fn utc_stamp() -> String {
    let format = time::macros::format_description!(
        "[year][month][day]T[hour][minute][second]Z"
    );
    time::OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_else(|_| "00000000T000000Z".to_string())
}
