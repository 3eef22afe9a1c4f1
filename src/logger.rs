use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

use crate::batch::RunSummary;
use crate::reconcile::EntityReport;
use crate::sources::SourceId;

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,   // Only progress bar and final summary
    Summary = 1,  // One line per entity (default)
    Detailed = 2, // Skips, persistence failures, warnings
    Debug = 3,    // Everything
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }
}

/// User-facing run narration, separate from `tracing` diagnostics
#[derive(Clone)]
pub struct RunLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<String>,
    output_file: Arc<Mutex<Option<String>>>,
}

impl RunLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(RwLock::new(None)),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
            output_file: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: String) -> Self {
        Self {
            log_file_path: Some(log_file_path),
            ..Self::new(verbosity)
        }
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        self.verbosity
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("WARN", message);
        }
    }

    /// Errors are shown at every verbosity
    pub fn error(&self, message: &str) {
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let timestamp = chrono::Utc::now().format("%H:%M:%S%.3f");
        let msg = format!("[{}] {}: {}", timestamp, level, message);

        if self.log_file_path.is_some() {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(msg.clone());
            }
        }

        // print above an active progress bar instead of through it
        if let Ok(guard) = self.progress_bar.try_read() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }

        eprintln!("{}", msg);
    }

    pub async fn start_progress(&self, total_steps: u64) {
        let pb = ProgressBar::new(total_steps);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message("Starting...");

        let mut progress_guard = self.progress_bar.write().await;
        *progress_guard = Some(pb);
    }

    pub async fn update_progress(&self, message: &str) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.set_message(message.to_string());
        }
    }

    pub async fn advance_progress(&self, steps: u64) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.inc(steps);
        }
    }

    pub async fn finish_progress(&self, final_message: &str) {
        let mut progress_guard = self.progress_bar.write().await;
        if let Some(pb) = progress_guard.take() {
            pb.finish_and_clear();
        }
        drop(progress_guard);

        self.info(final_message);
    }

    pub fn log_run_start(&self, rows: usize, sources: &[SourceId]) {
        let names: Vec<&str> = sources.iter().map(|s| s.as_str()).collect();
        self.info(&format!("Reconciling {} rows using sources: {}", rows, names.join(", ")));
    }

    pub fn log_entity_result(&self, report: &EntityReport) {
        let calls: Vec<String> = report
            .invocations
            .iter()
            .map(|(source, outcome)| format!("{}={}", source, outcome))
            .collect();
        if calls.is_empty() {
            self.debug(&format!("{}: {} (no sources consulted)", report.identity, report.status));
        } else {
            self.info(&format!("{}: {} [{}]", report.identity, report.status, calls.join(", ")));
        }
        for source in &report.skipped {
            self.warn(&format!("{}: skipped circuit-broken source {}", report.identity, source));
        }
    }

    pub fn log_unidentifiable_row(&self, row_index: usize) {
        self.warn(&format!("Row {} has no name, website or profile; marked Failed", row_index + 1));
    }

    pub fn log_duplicate_identity(&self, identity: &str) {
        self.debug(&format!("{}: duplicate row, reusing earlier result", identity));
    }

    pub fn log_persist_failure(&self, identity: &str, reason: &str) {
        self.error(&format!("Failed to persist {}: {}", identity, reason));
    }

    pub fn log_circuit_broken(&self, source: SourceId) {
        self.warn(&format!("Source {} is circuit-broken for the rest of this run", source));
    }

    pub fn log_cancelled(&self, processed: usize, total: usize) {
        self.error(&format!(
            "Run cancelled after {} of {} rows; reconciled rows were persisted",
            processed, total
        ));
    }

    pub fn log_export_success(&self, path: &str) {
        if let Ok(mut output) = self.output_file.lock() {
            *output = Some(path.to_string());
        }
        self.info(&format!("Export completed: {}", path));
    }

    /// Final summary, always printed
    pub fn print_final_summary(&self, summary: &RunSummary) {
        print!("\x1b[2K\r");
        let _ = io::stdout().flush();

        println!("\n=== RUN SUMMARY ===");
        println!("Run Status: {}", summary.run_status);
        println!("Duration: {:.2}s", summary.duration_secs);
        println!("Rows: {} ({} processed, {} pending)", summary.total_rows, summary.processed, summary.pending);

        println!("By Status:");
        for (status, count) in &summary.by_status {
            println!("  {:<20} {}", status, count);
        }
        if !summary.by_outcome.is_empty() {
            println!("Adapter Outcomes:");
            for (outcome, count) in &summary.by_outcome {
                println!("  {:<20} {}", outcome, count);
            }
        }
        println!("By Field (populated / missing):");
        for (field, counts) in &summary.by_field {
            println!("  {:<20} {} / {}", field, counts.populated, counts.missing);
        }
        if !summary.circuit_broken_sources.is_empty() {
            println!("Circuit-Broken Sources: {}", summary.circuit_broken_sources.join(", "));
        }
        if summary.overrides_applied > 0 {
            println!("Manual Overrides Applied: {}", summary.overrides_applied);
        }
        println!("Persisted: {} ({} failures)", summary.persisted, summary.persist_failures);

        if let Ok(output) = self.output_file.lock() {
            if let Some(path) = output.as_ref() {
                println!("Results Exported: {}", path);
            }
        }
        println!("===================\n");
    }

    /// Export all collected log lines to the configured file
    pub fn export_logs(&self) -> Result<()> {
        let Some(ref log_file_path) = self.log_file_path else {
            return Ok(());
        };
        let Ok(buffer) = self.log_buffer.lock() else {
            return Ok(());
        };

        if let Some(parent) = Path::new(log_file_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_file_path)?;

        for log_entry in buffer.iter() {
            writeln!(file, "{}", log_entry)?;
        }

        file.flush()?;
        Ok(())
    }

    pub fn is_log_export_enabled(&self) -> bool {
        self.log_file_path.is_some()
    }

    pub fn get_log_count(&self) -> usize {
        self.log_buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}
