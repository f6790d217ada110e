//! Clause construction - turn allow-list roles into platform query
//! clauses.
//!
//! The platform's query grammar is brace-delimited:
//! `{fieldId.OPERATOR.'operand'}`. Everything here produces those
//! fragments from the enumerated field roles resolved at config load;
//! no marker strings are re-parsed at query time.

use tracing::{debug, warn};

use crate::api::{FieldMap, SortBy, SortOrder, RECORD_ID_LABEL};
use crate::config::{FieldRole, TableDescriptor};

/// Comparison operator for relationship traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationOp {
    /// Containment match against a reference list.
    Contains,
    /// Exact value match.
    Exact,
}

impl RelationOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contains => ".TV.",
            Self::Exact => ".EX.",
        }
    }
}

/// Relative date window unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Days,
    Weeks,
    Months,
    Years,
}

impl DateUnit {
    /// Parse the single-letter wire form; anything unrecognized is days.
    pub fn parse(s: &str) -> Self {
        match s {
            "w" => Self::Weeks,
            "m" => Self::Months,
            "y" => Self::Years,
            _ => Self::Days,
        }
    }

    /// Compact suffix used in `today-{n}{unit}` filters.
    pub fn suffix(self) -> char {
        match self {
            Self::Days => 'd',
            Self::Weeks => 'w',
            Self::Months => 'm',
            Self::Years => 'y',
        }
    }

    /// Spelled-out plural used in `{n} {unit} ago` filters.
    pub fn spelled(self) -> &'static str {
        match self {
            Self::Days => "days",
            Self::Weeks => "weeks",
            Self::Months => "months",
            Self::Years => "years",
        }
    }
}

/// Search field ids for name matching: KEY, then every RELATED KEY,
/// then every UNIQUE field, resolved against live metadata in
/// allow-list order. Marked fields missing upstream are skipped with a
/// warning.
pub fn search_field_ids(table: &TableDescriptor, field_map: &FieldMap) -> Vec<i64> {
    let mut ids = Vec::new();
    let mut push = |label: &str| match field_map.get(label) {
        Some(meta) => ids.push(meta.id),
        None => warn!(
            table = %table.name,
            label,
            "marked field not found in live metadata"
        ),
    };
    if let Some(key) = table.key_field() {
        push(&key.label);
    }
    for field in table.related_key_fields() {
        push(&field.label);
    }
    for field in table.unique_fields() {
        push(&field.label);
    }
    ids
}

/// Name-match clause: each name's field alternatives OR-ed together,
/// per-name groups AND-ed when several names are given, consistently
/// parenthesized. Returns None when there is nothing to match on.
pub fn name_match_clause(names: &[String], search_fids: &[i64]) -> Option<String> {
    if names.is_empty() || search_fids.is_empty() {
        return None;
    }
    let name_clauses: Vec<String> = names
        .iter()
        .map(|name| {
            search_fids
                .iter()
                .map(|fid| format!("{{{fid}.EX.'{name}'}}"))
                .collect::<Vec<_>>()
                .join("OR")
        })
        .collect();
    let clause = if name_clauses.len() > 1 {
        let grouped: Vec<String> = name_clauses.iter().map(|c| format!("({c})")).collect();
        format!("({})", grouped.join("AND"))
    } else {
        format!("({})", name_clauses[0])
    };
    Some(clause)
}

/// Relative date filter in the compact form: `{fid.OAF.'today-3d'}`.
/// Returns None (with a warning) when the table declares no DATE field
/// or the marked field is missing upstream.
pub fn date_filter_clause(
    table: &TableDescriptor,
    field_map: &FieldMap,
    value: u32,
    unit: DateUnit,
) -> Option<String> {
    let fid = date_field_id(table, field_map)?;
    let clause = format!("{{{fid}.OAF.'today-{value}{}'}}", unit.suffix());
    debug!(table = %table.name, clause = %clause, "date filter");
    Some(clause)
}

/// Relative date filter in the spelled-out form used for child queries:
/// `{fid.OAF.'3 days ago'}`.
pub fn child_date_clause(
    table: &TableDescriptor,
    field_map: &FieldMap,
    value: u32,
    unit: DateUnit,
) -> Option<String> {
    let fid = date_field_id(table, field_map)?;
    Some(format!("{{{fid}.OAF.'{value} {} ago'}}", unit.spelled()))
}

fn date_field_id(table: &TableDescriptor, field_map: &FieldMap) -> Option<i64> {
    let Some(field) = table.date_field() else {
        warn!(table = %table.name, "no DATE field in allow-list");
        return None;
    };
    match field_map.get(&field.label) {
        Some(meta) => Some(meta.id),
        None => {
            warn!(
                table = %table.name,
                label = %field.label,
                "DATE field marked in allow-list but not found upstream"
            );
            None
        }
    }
}

/// Foreign-key traversal clause: `{fid.TV.42}` or `{fid.EX.42}`.
pub fn relationship_clause(fk_field_id: i64, op: RelationOp, parent_record_id: &str) -> String {
    format!("{{{fk_field_id}{}{parent_record_id}}}", op.as_str())
}

/// Pick the traversal operator: containment only when the parent's KEY
/// field is literally the platform record-id field and the child's
/// referencing field is marked RELATED KEY; exact match otherwise.
pub fn relationship_operator(
    parent: &TableDescriptor,
    child: &TableDescriptor,
    fk_label: &str,
) -> RelationOp {
    let parent_keys_on_record_id = parent
        .key_field()
        .is_some_and(|f| f.label == RECORD_ID_LABEL);
    let child_marks_related_key = child
        .fields
        .iter()
        .any(|f| f.role == Some(FieldRole::RelatedKey) && f.label == fk_label);
    let op = if parent_keys_on_record_id && child_marks_related_key {
        RelationOp::Contains
    } else {
        RelationOp::Exact
    };
    debug!(
        parent = %parent.name,
        child = %child.name,
        fk_label,
        operator = op.as_str(),
        "relationship operator"
    );
    op
}

/// Resolve a sort request by exact label match; a miss logs a warning
/// and sorting is simply omitted.
pub fn resolve_sort(
    sort_field: &str,
    table_name: &str,
    field_map: &FieldMap,
    order: SortOrder,
) -> Option<SortBy> {
    match field_map.get(sort_field) {
        Some(meta) => {
            debug!(sort_field, field_id = meta.id, "resolved sort field");
            Some(SortBy {
                field_id: meta.id,
                order,
            })
        }
        None => {
            warn!(sort_field, table = table_name, "sort field not found, omitting sort");
            None
        }
    }
}

/// Select projection: allow-list labels resolved through the field map
/// (a miss is skipped with a warning), with the record-id field always
/// present at the front.
pub fn select_projection(table: &TableDescriptor, field_map: &FieldMap) -> Vec<i64> {
    let mut select = Vec::new();
    for label in table.labels() {
        match field_map.get(label) {
            Some(meta) => select.push(meta.id),
            None => warn!(
                label,
                table = %table.name,
                "allow-listed field not found in field map"
            ),
        }
    }
    if let Some(rid) = field_map.record_id() {
        if !select.contains(&rid.id) {
            select.insert(0, rid.id);
        }
    }
    select
}

/// AND-join already-parenthesized clause fragments.
pub fn combine_clauses(clauses: &[String]) -> Option<String> {
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join("AND"))
    }
}
