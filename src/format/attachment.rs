//! Attachment dereferencing.
//!
//! Platform file fields carry an internal reference, not downloadable
//! content. The resolver fetches the bytes from the attachment
//! endpoint, undoes the provider's base64 armoring of rich-text
//! payloads, re-hosts the file in object storage, and hands back a
//! signed URL. Any failure falls back to the original platform
//! reference; an attachment never sinks a report.

use base64::Engine;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};
use crate::config::StorageSettings;
use crate::export::{utc_stamp, ExportError, ObjectStore};

/// Base64-armored rich text starts with this prefix on the wire
/// (the encoding of `{\rtf`).
const ARMOR_PREFIX: &[u8] = b"e1xydGY";

#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("attachment too large: {bytes} bytes")]
    TooLarge { bytes: u64 },
}

/// Downloads platform attachments and re-hosts them in object storage.
pub struct AttachmentResolver<'a> {
    api: &'a ApiClient,
    store: &'a dyn ObjectStore,
    settings: &'a StorageSettings,
}

impl<'a> AttachmentResolver<'a> {
    pub fn new(
        api: &'a ApiClient,
        store: &'a dyn ObjectStore,
        settings: &'a StorageSettings,
    ) -> Self {
        Self {
            api,
            store,
            settings,
        }
    }

    /// Re-host one attachment and return its signed URL. Failures are
    /// logged and collapse to `None`; the caller keeps the platform
    /// reference.
    pub fn process(
        &self,
        table_id: &str,
        record_id: i64,
        field_id: i64,
        version: i64,
        name_prefix: &str,
    ) -> Option<String> {
        match self.fetch_and_store(table_id, record_id, field_id, version, name_prefix) {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(record_id, field_id, error = %err, "attachment transfer failed");
                None
            }
        }
    }

    fn fetch_and_store(
        &self,
        table_id: &str,
        record_id: i64,
        field_id: i64,
        version: i64,
        name_prefix: &str,
    ) -> Result<String, AttachmentError> {
        let path = format!("files/{table_id}/{record_id}/{field_id}/{version}");
        let (mut data, content_type) = self.api.get_bytes(&path)?;
        let mut content_type =
            content_type.unwrap_or_else(|| "application/octet-stream".to_string());

        if data.starts_with(ARMOR_PREFIX) {
            match base64::engine::general_purpose::STANDARD.decode(&data) {
                Ok(decoded) if decoded.starts_with(b"{\\rtf") => {
                    info!(record_id, "decoded base64-armored rich text");
                    data = decoded;
                    content_type = "application/rtf".to_string();
                }
                Ok(_) => {}
                Err(err) => warn!(record_id, error = %err, "failed to decode armored payload"),
            }
        }

        if data.len() as u64 > self.settings.max_file_size_bytes {
            return Err(AttachmentError::TooLarge {
                bytes: data.len() as u64,
            });
        }

        let ext = extension_for(&content_type);
        let key = format!(
            "{}/{}_{}_{}{}",
            self.settings.attachment_prefix,
            name_prefix,
            record_id,
            utc_stamp(),
            ext
        );
        self.store.put_object(&key, &data, &content_type)?;
        let url = self.store.presigned_url(&key, self.settings.url_ttl_secs)?;
        info!(
            record_id,
            content_type = %content_type,
            bytes = data.len(),
            "re-hosted attachment"
        );
        Ok(url)
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "application/pdf" => ".pdf",
        "image/png" => ".png",
        "image/jpeg" => ".jpg",
        "text/plain" => ".txt",
        "application/rtf" => ".rtf",
        "application/json" => ".json",
        "text/csv" => ".csv",
        _ => ".bin",
    }
}
