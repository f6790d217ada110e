//! Statistical summarization of formatted record sets.
//!
//! Builds per-field value-frequency histograms, flags low-cardinality
//! "key fields", derives a date range, and renders a short narrative
//! plus a context fragment for downstream elaboration.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::format::FormattedRecord;

/// A key field must have between 2 and 10 distinct values...
const KEY_FIELD_MIN_DISTINCT: usize = 2;
const KEY_FIELD_MAX_DISTINCT: usize = 10;
/// ...and its top values are rendered at most this many at a time.
const BREAKDOWN_TOP_N: usize = 5;
/// Narrative shows at most this many key-field breakdowns.
const NARRATIVE_KEY_FIELDS: usize = 3;
/// Raw sample size carried alongside the statistics.
const SAMPLE_SIZE: usize = 3;

/// Generated summary for one record group.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryData {
    pub title: String,
    pub statistics: Map<String, Value>,
    pub insights: String,
    pub analysis_context: String,
    pub raw_data_sample: Vec<Value>,
}

impl SummaryData {
    /// Append a markdown fragment to the narrative.
    pub fn append_insights(&mut self, fragment: &str) {
        self.insights.push_str(fragment);
    }
}

/// Per-field histogram accumulated in first-seen order.
#[derive(Default)]
struct FieldAnalysis {
    values: Vec<(String, usize)>,
}

impl FieldAnalysis {
    fn record(&mut self, value: String) {
        match self.values.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => self.values.push((value, 1)),
        }
    }
}

/// Aggregate formatted records into statistics and a narrative.
pub fn generate_summary(
    records: &[FormattedRecord],
    table_name: &str,
    rec_name: &str,
) -> SummaryData {
    if records.is_empty() {
        let mut statistics = Map::new();
        statistics.insert("total_records".to_string(), json!(0));
        return SummaryData {
            title: format!("{rec_name} Summary"),
            statistics,
            insights: format!("No {table_name} records found matching your criteria."),
            analysis_context: "No matching records found.".to_string(),
            raw_data_sample: Vec::new(),
        };
    }

    let total = records.len();
    let mut statistics = Map::new();
    statistics.insert("total_records".to_string(), json!(total));

    // Histogram every populated field, tracking date-like names.
    let mut analyses: Vec<(String, FieldAnalysis)> = Vec::new();
    let mut date_values: Vec<String> = Vec::new();
    for record in records {
        for (field_name, value) in record.iter() {
            if value.is_null() || value.as_str() == Some("") {
                continue;
            }
            let text = value_text(value);
            let lowered = field_name.to_lowercase();
            if lowered.contains("date") || lowered.contains("created") {
                date_values.push(text.clone());
            }
            let idx = match analyses.iter().position(|(n, _)| n == field_name) {
                Some(i) => i,
                None => {
                    analyses.push((field_name.to_string(), FieldAnalysis::default()));
                    analyses.len() - 1
                }
            };
            analyses[idx].1.record(text);
        }
    }

    // Low-cardinality fields get a frequency breakdown.
    let mut key_fields: Vec<String> = Vec::new();
    for (field, analysis) in &mut analyses {
        let distinct = analysis.values.len();
        if (KEY_FIELD_MIN_DISTINCT..=KEY_FIELD_MAX_DISTINCT).contains(&distinct)
            && total > distinct
        {
            // Stable sort keeps first-seen order between equal counts.
            analysis.values.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
            let breakdown = analysis
                .values
                .iter()
                .take(BREAKDOWN_TOP_N)
                .map(|(value, count)| format!("{count} {value}"))
                .collect::<Vec<_>>()
                .join(", ");
            statistics.insert(field.clone(), json!(breakdown));
            key_fields.push(field.clone());
        }
    }

    if !date_values.is_empty() {
        date_values.sort();
        statistics.insert(
            "date_range".to_string(),
            json!(format!(
                "{} to {}",
                date_values.first().unwrap(),
                date_values.last().unwrap()
            )),
        );
    }

    let mut insights = Vec::new();
    insights.push(format!("*{rec_name} Overview:*"));
    insights.push(format!(
        "• Total {}: {total}",
        table_name.to_lowercase()
    ));
    for field in key_fields.iter().take(NARRATIVE_KEY_FIELDS) {
        if let Some(breakdown) = statistics.get(field).and_then(Value::as_str) {
            insights.push(format!("• {field}: {breakdown}"));
        }
    }
    if let Some(range) = statistics.get("date_range").and_then(Value::as_str) {
        insights.push(format!("• Date range: {range}"));
    }
    insights.push("\nReview the attached report for complete details.".to_string());

    let focus = if key_fields.is_empty() {
        "all fields".to_string()
    } else {
        key_fields
            .iter()
            .take(2)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };
    let analysis_context = format!(
        "Analyze this {table_name} data and provide 1-2 sentences about patterns, \
         trends, or notable observations. Consider {focus}."
    );

    let raw_data_sample = records
        .iter()
        .take(SAMPLE_SIZE)
        .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
        .collect();

    SummaryData {
        title: format!("{rec_name} {table_name} Summary"),
        statistics,
        insights: insights.join("\n"),
        analysis_context,
        raw_data_sample,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
