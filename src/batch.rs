//! Tabular batch input and aggregate run summary
//!
//! Supports:
//! - CSV files with a header row (any header spelling the normalizer knows)
//! - JSON files holding an array of objects, or an object with a "rows" array
//! - A run summary with counts by status, by outcome and by field

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::outcome::Outcome;
use crate::reconcile::EntityReport;
use crate::record::{Attribute, CompanyRecord, ProcessingStatus};
use crate::sources::SourceId;

/// Input rows as `(header, value)` pairs in header order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<(String, String)>>,
}

impl InputTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Input format for batch files
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref() {
            Some("csv") => Some(Self::Csv),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }
}

/// Load a batch file (format from extension)
pub fn load_input(path: &Path) -> Result<InputTable> {
    let format = InputFormat::from_path(path).with_context(|| {
        format!(
            "Cannot determine input format from file extension. Expected .csv or .json: {}",
            path.display()
        )
    })?;

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    match format {
        InputFormat::Csv => parse_csv_input(&content),
        InputFormat::Json => parse_json_input(&content),
    }
}

/// Parse CSV with a header row; short rows are padded with empty values
pub fn parse_csv_input(content: &str) -> Result<InputTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV record {}", i + 1))?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        let row = headers
            .iter()
            .enumerate()
            .map(|(idx, h)| (h.clone(), record.get(idx).unwrap_or_default().to_string()))
            .collect();
        rows.push(row);
    }

    Ok(InputTable { headers, rows })
}

/// Parse JSON rows
///
/// Supports two formats:
/// 1. Array of objects: [{"name": "Acme", "website": "acme.com"}]
/// 2. Object with a "rows" array: {"rows": [...]}
pub fn parse_json_input(content: &str) -> Result<InputTable> {
    let value: serde_json::Value = serde_json::from_str(content).context("Failed to parse JSON content")?;

    let items = match &value {
        serde_json::Value::Array(arr) => arr,
        serde_json::Value::Object(obj) => match obj.get("rows") {
            Some(serde_json::Value::Array(arr)) => arr,
            Some(_) => bail!("'rows' field must be an array"),
            None => bail!("JSON object must have a 'rows' array field"),
        },
        _ => bail!("JSON must be an array of row objects or an object with a 'rows' field"),
    };

    let mut headers: Vec<String> = Vec::new();
    let mut objects = Vec::new();
    for item in items {
        let serde_json::Value::Object(obj) = item else {
            continue;
        };
        for key in obj.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
        objects.push(obj);
    }

    let rows = objects
        .into_iter()
        .map(|obj| {
            headers
                .iter()
                .map(|h| (h.clone(), obj.get(h).map(json_cell).unwrap_or_default()))
                .collect()
        })
        .collect();

    Ok(InputTable { headers, rows })
}

fn json_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Completed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "Completed"),
            RunStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Per-field population and outcome histogram
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub populated: usize,
    pub missing: usize,
    /// Provenance outcome counts across all records
    pub outcomes: BTreeMap<String, usize>,
}

/// Aggregate summary of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_status: RunStatus,
    pub started_at: String,
    pub finished_at: String,
    pub duration_secs: f64,
    pub total_rows: usize,
    /// Rows reconciled before the run ended
    pub processed: usize,
    /// Rows left untouched by a cancellation
    pub pending: usize,
    pub by_status: BTreeMap<String, usize>,
    /// Outcome counts over every adapter invocation
    pub by_outcome: BTreeMap<String, usize>,
    pub by_field: BTreeMap<String, FieldSummary>,
    pub adapter_invocations: BTreeMap<String, usize>,
    /// Invocations not made because the source was circuit-broken
    pub skipped_invocations: BTreeMap<String, usize>,
    pub circuit_broken_sources: Vec<String>,
    pub overrides_applied: usize,
    pub persisted: usize,
    pub persist_failures: usize,
}

impl RunSummary {
    /// Fold one entity's reconciliation report into the totals
    pub fn record_entity(&mut self, report: &EntityReport) {
        self.processed += 1;
        for (source, outcome) in &report.invocations {
            *self.adapter_invocations.entry(source.to_string()).or_default() += 1;
            *self.by_outcome.entry(outcome.to_string()).or_default() += 1;
        }
        for source in &report.skipped {
            *self.skipped_invocations.entry(source.to_string()).or_default() += 1;
        }
        self.overrides_applied += report.overridden.len();
    }

    pub fn outcome_count(&self, outcome: Outcome) -> usize {
        self.by_outcome.get(outcome.as_str()).copied().unwrap_or(0)
    }

    pub fn status_count(&self, status: ProcessingStatus) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}

/// Create a new run summary stamped with the start time
pub fn new_run_summary(total_rows: usize) -> RunSummary {
    RunSummary {
        run_status: RunStatus::Completed,
        started_at: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        finished_at: String::new(),
        duration_secs: 0.0,
        total_rows,
        processed: 0,
        pending: 0,
        by_status: BTreeMap::new(),
        by_outcome: BTreeMap::new(),
        by_field: BTreeMap::new(),
        adapter_invocations: BTreeMap::new(),
        skipped_invocations: BTreeMap::new(),
        circuit_broken_sources: Vec::new(),
        overrides_applied: 0,
        persisted: 0,
        persist_failures: 0,
    }
}

/// Finalize a run summary from the output records
pub fn finalize_run_summary(
    summary: &mut RunSummary,
    records: &[CompanyRecord],
    run_status: RunStatus,
    circuit_broken: &[SourceId],
    duration_secs: f64,
) {
    summary.finished_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    summary.run_status = run_status;
    summary.duration_secs = duration_secs;
    summary.circuit_broken_sources = circuit_broken.iter().map(|s| s.to_string()).collect();

    summary.by_status.clear();
    for status in ProcessingStatus::ALL {
        let count = records.iter().filter(|r| r.processing_status == status).count();
        summary.by_status.insert(status.to_string(), count);
    }
    summary.pending = summary.total_rows.saturating_sub(summary.processed);

    summary.by_field.clear();
    for attr in Attribute::ALL {
        let mut field = FieldSummary::default();
        for record in records {
            if record.is_populated(attr) {
                field.populated += 1;
            } else {
                field.missing += 1;
            }
            if let Some(prov) = record.provenance(attr) {
                *field.outcomes.entry(prov.outcome.to_string()).or_default() += 1;
            }
        }
        summary.by_field.insert(attr.column().to_string(), field);
    }
}

/// Export run summary to JSON file
pub fn export_run_summary(summary: &RunSummary, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write run summary to: {}", output_path.display()))?;

    Ok(())
}
