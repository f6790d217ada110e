//! Per-table field allow-lists.
//!
//! Each configured table carries an ordered allow-list of field labels.
//! A label may end with a role marker (`[KEY]`, `[DATE]`,
//! `[RELATED KEY]`, or `[UNIQUE]`) controlling how the clause builder
//! uses the field. Markers are parsed once, here, when configuration is
//! loaded; the rest of the crate only ever sees the enumerated role and
//! the clean label.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use super::settings::ConfigError;

/// Matches a trailing role marker and any surrounding whitespace.
static MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\[[A-Z ]+\]\s*").unwrap());

/// Semantic role a field plays in query construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldRole {
    /// Primary search field.
    Key,
    /// Date-filter field.
    Date,
    /// Relationship search field.
    RelatedKey,
    /// Identifier-like search field, always included in name searches.
    Unique,
}

impl FieldRole {
    fn from_marker(raw: &str) -> Option<Self> {
        // Longer markers first: "[RELATED KEY]" also contains "[KEY]".
        if raw.contains("[RELATED KEY]") {
            Some(Self::RelatedKey)
        } else if raw.contains("[KEY]") {
            Some(Self::Key)
        } else if raw.contains("[DATE]") {
            Some(Self::Date)
        } else if raw.contains("[UNIQUE]") {
            Some(Self::Unique)
        } else {
            None
        }
    }
}

/// One allow-listed field: clean label plus its parsed role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowField {
    pub label: String,
    pub role: Option<FieldRole>,
}

impl AllowField {
    /// Parse a raw allow-list entry such as `"Date Opened [DATE]"`.
    pub fn parse(raw: &str) -> Self {
        Self {
            label: clean_label(raw),
            role: FieldRole::from_marker(raw),
        }
    }
}

impl<'de> Deserialize<'de> for AllowField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Strip role markers from a raw label, returning the live field label.
pub fn clean_label(raw: &str) -> String {
    MARKER_RE.replace_all(raw, "").trim().to_string()
}

/// A configured table: platform id, display name, ordered allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub id: String,
    pub fields: Vec<AllowField>,
}

impl TableDescriptor {
    /// Enforce allow-list invariants: id present, at most one KEY field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::MissingIdentifier(format!(
                "tables.{}.id",
                self.name
            )));
        }
        let keys = self
            .fields
            .iter()
            .filter(|f| f.role == Some(FieldRole::Key))
            .count();
        if keys > 1 {
            return Err(ConfigError::DuplicateKeyField {
                table: self.name.clone(),
            });
        }
        Ok(())
    }

    /// The single KEY field, if declared.
    pub fn key_field(&self) -> Option<&AllowField> {
        self.fields.iter().find(|f| f.role == Some(FieldRole::Key))
    }

    /// The first DATE field, if declared.
    pub fn date_field(&self) -> Option<&AllowField> {
        self.fields.iter().find(|f| f.role == Some(FieldRole::Date))
    }

    /// All RELATED KEY fields, in allow-list order.
    pub fn related_key_fields(&self) -> impl Iterator<Item = &AllowField> {
        self.fields
            .iter()
            .filter(|f| f.role == Some(FieldRole::RelatedKey))
    }

    /// All UNIQUE fields, in allow-list order.
    pub fn unique_fields(&self) -> impl Iterator<Item = &AllowField> {
        self.fields
            .iter()
            .filter(|f| f.role == Some(FieldRole::Unique))
    }

    /// Clean labels in allow-list order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.label.as_str())
    }
}

/// Lookup view over the configured tables.
#[derive(Debug, Clone, Copy)]
pub struct AllowLists<'a> {
    tables: &'a [TableDescriptor],
}

impl<'a> AllowLists<'a> {
    pub fn new(tables: &'a [TableDescriptor]) -> Self {
        Self { tables }
    }

    /// Exact-name lookup, then case-insensitive fallback.
    pub fn find(&self, name: &str) -> Option<&'a TableDescriptor> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .or_else(|| self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name)))
    }

    /// Lookup by platform table id.
    pub fn find_by_id(&self, id: &str) -> Option<&'a TableDescriptor> {
        self.tables.iter().find(|t| t.id == id)
    }

    /// Configured table names, in declaration order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }
}
