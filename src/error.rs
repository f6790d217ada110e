//! Crate-level error for the invocation boundary.
//!
//! Modules keep their own error enums; this type is what bubbles up to
//! the single boundary translator in `agent`, which flattens it into an
//! `{ok:false, error}` envelope.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::export::ExportError;
use crate::notify::NotifyError;

/// Result type used across the orchestration layer.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("{0}")]
    Validation(String),
}
