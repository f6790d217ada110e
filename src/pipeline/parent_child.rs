//! Parent+child handler.
//!
//! Runs the parent query, then walks each parent record through its
//! relationship edge: child query, wide-row flattening with
//! `{table}_{field}` columns, per-parent CSV export, and a summary of
//! the child set. A parent with no children still produces a
//! parent-only row and an empty-records narrative.

use serde_json::Value;
use tracing::{debug, warn};

use super::{ParsedQuery, PipelineContext, ReportLink, ReportResult, ResolvedTable};
use crate::api::{FieldMap, QueryBody, RawRecord};
use crate::clause::{
    child_date_clause, combine_clauses, name_match_clause, relationship_clause,
    relationship_operator, resolve_sort, search_field_ids, select_projection, DateUnit,
};
use crate::error::{Error, Result};
use crate::export::{Exporter, FlatRow};
use crate::format::{
    cell_text, format_record, record_group_name, reresolve_attachment, AttachmentResolver,
    FormattedRecord,
};
use crate::notify::Notifier;
use crate::summary::generate_summary;

/// Query the parent table, join each parent to its children, and emit
/// one report result per parent.
pub fn handle_parent_child(
    ctx: &PipelineContext<'_>,
    query: &ParsedQuery,
) -> Result<Vec<ReportResult>> {
    let mut results = Vec::new();
    let [parent, child] = &query.tables[..] else {
        return Err(Error::Validation(
            "parent+child mode requires exactly two tables".to_string(),
        ));
    };

    let parent_map = ctx.registry.field_map(ctx.api, &parent.desc.id)?;

    let mut where_clauses = Vec::new();
    if !query.entity_names.is_empty() {
        let search_fids = search_field_ids(&parent.desc, &parent_map);
        if let Some(clause) = name_match_clause(&query.entity_names, &search_fids) {
            where_clauses.push(clause);
        }
    }
    let sort_by = query
        .sort_field
        .as_deref()
        .and_then(|field| resolve_sort(field, parent.name(), &parent_map, query.sort_order))
        .map(|s| vec![s]);
    let select = select_projection(&parent.desc, &parent_map);

    let body = QueryBody {
        where_clause: combine_clauses(&where_clauses),
        select: (!select.is_empty()).then_some(select),
        sort_by,
        ..QueryBody::default()
    };
    let parents = ctx.api.query(&parent.desc.id, &body, Some(query.limit))?;
    let child_map = ctx.registry.field_map(ctx.api, &child.desc.id)?;
    let resolver = AttachmentResolver::new(ctx.api, ctx.store, &ctx.settings.storage);
    let exporter = Exporter::new(ctx.store, &ctx.settings.storage);

    for p in &parents {
        let Some(pid) = parent_record_id(p, &parent_map) else {
            warn!(parent = parent.name(), "parent record has no record id, skipping");
            continue;
        };
        let children = child_records(ctx, parent, child, &child_map, &pid, query.date_filter)?;
        debug!(parent_id = %pid, children = children.len(), "joined child records");

        let parent_formatted = format_record(p, &parent.desc, &parent_map, &resolver);
        let rec_name = record_group_name(
            parent.name(),
            &parent.desc,
            &parent_map,
            Some(p),
            &query.entity_names,
        );

        let mut flat_rows: Vec<FlatRow> = Vec::new();
        let mut child_formatted: Vec<FormattedRecord> = Vec::new();
        if children.is_empty() {
            let mut row = FlatRow::new();
            flatten_into(
                &mut row,
                parent,
                &parent_formatted,
                p,
                &parent_map,
                &resolver,
            );
            if !row.is_empty() {
                flat_rows.push(row);
            }
        } else {
            for c in &children {
                let formatted = format_record(c, &child.desc, &child_map, &resolver);
                let mut row = FlatRow::new();
                flatten_into(
                    &mut row,
                    parent,
                    &parent_formatted,
                    p,
                    &parent_map,
                    &resolver,
                );
                flatten_into(&mut row, child, &formatted, c, &child_map, &resolver);
                child_formatted.push(formatted);
                if !row.is_empty() {
                    flat_rows.push(row);
                }
            }
        }

        let mut summary = generate_summary(&child_formatted, child.name(), &rec_name);

        let csv_url = match exporter.save_csv(&flat_rows, &rec_name) {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(record_name = %rec_name, error = %err, "CSV export failed");
                None
            }
        };
        let mut reports = Vec::new();
        if let Some(url) = csv_url {
            summary.append_insights(&format!("\n\n**Data Exports:**\n- [CSV Format]({url})"));
            reports.push(ReportLink::csv(url));
        }

        results.push(ReportResult {
            record_name: rec_name,
            summary,
            reports,
        });
    }

    Notifier::new(ctx.chat, &ctx.settings.chat).send_batched(&results);
    Ok(results)
}

/// Fetch the children of one parent record through the declared
/// relationship edge. No matching edge yields an empty set with a
/// warning, never an error.
fn child_records(
    ctx: &PipelineContext<'_>,
    parent: &ResolvedTable,
    child: &ResolvedTable,
    child_map: &FieldMap,
    parent_record_id: &str,
    date_filter: Option<(u32, DateUnit)>,
) -> Result<Vec<RawRecord>> {
    let rels = ctx.registry.relationships(ctx.api, &child.desc.id)?;
    for rel in &rels {
        if rel.parent_table_id != parent.desc.id {
            continue;
        }
        let Some(fk) = &rel.foreign_key_field else {
            warn!(
                parent = parent.name(),
                child = child.name(),
                "relationship edge has no foreign key field"
            );
            continue;
        };
        let op = relationship_operator(&parent.desc, &child.desc, &fk.label);
        let mut where_clauses = vec![relationship_clause(fk.id, op, parent_record_id)];
        if let Some((value, unit)) = date_filter {
            if let Some(clause) = child_date_clause(&child.desc, child_map, value, unit) {
                where_clauses.push(clause);
            }
        }
        let body = QueryBody {
            where_clause: Some(where_clauses.join(" AND ")),
            ..QueryBody::default()
        };
        let children = ctx.api.query(
            &child.desc.id,
            &body,
            Some(ctx.settings.query.large_query_threshold),
        )?;
        if children.is_empty() {
            warn!(
                parent_id = parent_record_id,
                "child query returned no records"
            );
        }
        return Ok(children);
    }
    warn!(
        parent = parent.name(),
        child = child.name(),
        "no matching relationship edge found"
    );
    Ok(Vec::new())
}

/// The parent record's id rendered for clause building.
fn parent_record_id(record: &RawRecord, field_map: &FieldMap) -> Option<String> {
    let rid = field_map.record_id()?;
    match record.value_of(rid.id)? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Merge one formatted record into a wide row under `{table}_{field}`
/// columns. Empty values are dropped; attachment-shaped values are
/// re-resolved to storage URLs at this point.
fn flatten_into(
    row: &mut FlatRow,
    table: &ResolvedTable,
    formatted: &FormattedRecord,
    raw: &RawRecord,
    field_map: &FieldMap,
    resolver: &AttachmentResolver<'_>,
) {
    for (label, value) in formatted.iter() {
        if value.is_null() || value.as_str() == Some("") {
            continue;
        }
        let column = format!("{}_{}", table.name(), label);
        if let Value::Object(obj) = value {
            if let Some(url) =
                reresolve_attachment(obj, &table.desc, label, raw, field_map, resolver)
            {
                row.push(column, url);
                continue;
            }
        }
        row.push(column, cell_text(value));
    }
}
