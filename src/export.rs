use anyhow::{Context, Result};
use csv::Writer;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::batch::RunSummary;
use crate::normalizer::SchemaNormalizer;
use crate::record::CompanyRecord;

/// Output format for the augmented batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "csv" => Some(OutputFormat::Csv),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

/// Header row: passthrough columns (first-seen order across rows), then the canonical set
pub fn output_headers(records: &[CompanyRecord]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for record in records {
        for (header, _) in &record.passthrough {
            if !headers.contains(header) {
                headers.push(header.clone());
            }
        }
    }
    headers.extend(SchemaNormalizer::output_headers());
    headers
}

pub fn export_csv(records: &[CompanyRecord], normalizer: &SchemaNormalizer, output_path: &Path) -> Result<()> {
    debug!("Exporting {} records to CSV: {}", records.len(), output_path.display());

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;
    let mut wtr = Writer::from_writer(file);

    let headers = output_headers(records);
    wtr.write_record(&headers)?;

    for record in records {
        let row: BTreeMap<String, String> = normalizer.normalize_out(record).into_iter().collect();
        let values: Vec<&str> = headers
            .iter()
            .map(|h| row.get(h).map(String::as_str).unwrap_or_default())
            .collect();
        wtr.write_record(&values)?;
    }

    wtr.flush()?;
    info!("Exported {} records to CSV: {}", records.len(), output_path.display());

    Ok(())
}

#[derive(Serialize)]
struct JsonExport<'a> {
    summary: &'a RunSummary,
    records: Vec<serde_json::Map<String, serde_json::Value>>,
}

pub fn export_json(
    records: &[CompanyRecord],
    summary: &RunSummary,
    normalizer: &SchemaNormalizer,
    output_path: &Path,
) -> Result<()> {
    debug!("Exporting {} records to JSON: {}", records.len(), output_path.display());

    let json_output = JsonExport {
        summary,
        records: records
            .iter()
            .map(|record| {
                normalizer
                    .normalize_out(record)
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect()
            })
            .collect(),
    };

    let json_string = serde_json::to_string_pretty(&json_output).context("Failed to serialize records")?;

    let mut file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;
    file.write_all(json_string.as_bytes())?;

    info!("Exported {} records to JSON: {}", records.len(), output_path.display());

    Ok(())
}
