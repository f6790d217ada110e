//! Single-table handler.

use tracing::{debug, warn};

use super::{ParsedQuery, PipelineContext, ReportLink, ReportResult};
use crate::api::QueryBody;
use crate::clause::{
    combine_clauses, date_filter_clause, name_match_clause, resolve_sort, search_field_ids,
    select_projection,
};
use crate::error::Result;
use crate::export::{Exporter, FlatRow};
use crate::format::{cell_text, format_record, record_group_name, AttachmentResolver, FormattedRecord};
use crate::notify::Notifier;
use crate::summary::generate_summary;

/// Query one table, format and summarize the hits, export a CSV, and
/// notify. Produces at most one report result.
pub fn handle_single_table(
    ctx: &PipelineContext<'_>,
    query: &ParsedQuery,
) -> Result<Vec<ReportResult>> {
    let mut results = Vec::new();
    let Some(table) = query.tables.first() else {
        return Ok(results);
    };

    let field_map = ctx.registry.field_map(ctx.api, &table.desc.id)?;

    let mut where_clauses = Vec::new();
    if !query.entity_names.is_empty() {
        let search_fids = search_field_ids(&table.desc, &field_map);
        if let Some(clause) = name_match_clause(&query.entity_names, &search_fids) {
            where_clauses.push(clause);
        }
    }
    if let Some((value, unit)) = query.date_filter {
        if let Some(clause) = date_filter_clause(&table.desc, &field_map, value, unit) {
            where_clauses.push(clause);
        }
    }

    let where_clause = combine_clauses(&where_clauses);
    if let Some(w) = &where_clause {
        debug!(where_clause = %w, "query filter");
    }

    let sort_by = query
        .sort_field
        .as_deref()
        .and_then(|field| resolve_sort(field, table.name(), &field_map, query.sort_order))
        .map(|s| vec![s]);

    let select = select_projection(&table.desc, &field_map);
    let body = QueryBody {
        where_clause,
        select: (!select.is_empty()).then_some(select),
        sort_by,
        ..QueryBody::default()
    };

    let rows = ctx.api.query(&table.desc.id, &body, Some(query.limit))?;
    let resolver = AttachmentResolver::new(ctx.api, ctx.store, &ctx.settings.storage);
    let formatted: Vec<FormattedRecord> = rows
        .iter()
        .map(|r| format_record(r, &table.desc, &field_map, &resolver))
        .collect();

    if !formatted.is_empty() {
        let rec_name = record_group_name(
            table.name(),
            &table.desc,
            &field_map,
            rows.first(),
            &query.entity_names,
        );
        let summary = generate_summary(&formatted, table.name(), &rec_name);

        let flat_rows: Vec<FlatRow> = formatted
            .iter()
            .map(|record| {
                let mut row = FlatRow::new();
                for (label, value) in record.iter() {
                    let cell = if value.is_null() {
                        String::new()
                    } else {
                        cell_text(value)
                    };
                    row.push(label, cell);
                }
                row
            })
            .collect();

        // An export failure downgrades this result to no links; it never
        // aborts the batch.
        let exporter = Exporter::new(ctx.store, &ctx.settings.storage);
        let reports = match exporter.save_csv(&flat_rows, &rec_name) {
            Ok(url) => vec![ReportLink::csv(url)],
            Err(err) => {
                warn!(record_name = %rec_name, error = %err, "CSV export failed");
                Vec::new()
            }
        };

        results.push(ReportResult {
            record_name: rec_name,
            summary,
            reports,
        });
    }

    Notifier::new(ctx.chat, &ctx.settings.chat).send_batched(&results);
    Ok(results)
}
