use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::export::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "firmographer")]
#[command(about = "Fills in company size, industry and revenue for a batch of companies from public web sources")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Create default configuration file at ./config/firmographer.toml
    #[arg(long, global = true)]
    pub init: bool,

    /// Path to the CSV or JSON batch to reconcile
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<String>,

    /// Output file for the augmented batch (defaults to <input>_enriched.<format>)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<String>,

    /// Output format: 'csv' (default) or 'json'
    #[arg(short = 'f', long, default_value = "csv")]
    pub output_format: String,

    /// JSON record store; fields already stored are not fetched again
    #[arg(long, value_name = "FILE")]
    pub store: Option<String>,

    /// Manual override table (overrides config)
    #[arg(long, value_name = "FILE")]
    pub overrides: Option<String>,

    /// Write the run summary as JSON to this file
    #[arg(long, value_name = "FILE")]
    pub summary: Option<String>,

    /// Configuration file (defaults to ./config/firmographer.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<String>,

    /// Verbose logging (use -v for skips and warnings, -vv for DEBUG)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export execution logs to a file (specify file path)
    #[arg(long)]
    pub log_file: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load and validate the configuration, then print per-source pacing
    CheckConfig,

    /// Show how the headers of an input file map onto the canonical schema
    Headers {
        /// CSV or JSON input file
        file: String,
    },
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        if self.init || self.command.is_some() {
            return Ok(());
        }

        match &self.input {
            None => return Err("Input file is required (use --input <file.csv|file.json>)".to_string()),
            Some(i) if i.trim().is_empty() => return Err("Input file cannot be empty".to_string()),
            _ => {}
        }

        if self.format().is_none() {
            return Err("Output format must be 'csv' or 'json'".to_string());
        }

        Ok(())
    }

    pub fn format(&self) -> Option<OutputFormat> {
        OutputFormat::parse(&self.output_format)
    }

    pub fn config_path(&self) -> PathBuf {
        match &self.config {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(crate::config::CONFIG_PATH),
        }
    }

    /// Explicit `--output`, or a sibling of the input named after it
    pub fn output_path(&self) -> Option<PathBuf> {
        if let Some(output) = &self.output {
            return Some(PathBuf::from(output));
        }
        let input = Path::new(self.input.as_deref()?);
        let stem = input.file_stem()?.to_string_lossy();
        let extension = self.format().unwrap_or(OutputFormat::Csv).extension();
        Some(input.with_file_name(format!("{}_enriched.{}", stem, extension)))
    }
}
