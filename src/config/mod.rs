//! Configuration module for Weaver.
//!
//! Handles the settings file, environment variable expansion, and the
//! per-table field allow-lists with their role markers.

mod allowlist;
mod settings;

pub use allowlist::{clean_label, AllowField, AllowLists, FieldRole, TableDescriptor};
pub use settings::{
    expand_env_vars, ChatSettings, ConfigError, PlatformSettings, QuerySettings, Settings,
    StorageSettings,
};
