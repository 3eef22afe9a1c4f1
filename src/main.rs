use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

use firmographer::batch::{export_run_summary, load_input};
use firmographer::cli::{Cli, Commands};
use firmographer::config::{AppConfig, ConfigError};
use firmographer::export::{export_csv, export_json, OutputFormat};
use firmographer::governor::SharedGovernor;
use firmographer::logger::{RunLogger, VerbosityLevel};
use firmographer::normalizer::{HeaderRole, SchemaNormalizer};
use firmographer::pipeline::{Pipeline, EXIT_CONFIGURATION_ERROR, EXIT_RUNTIME_ERROR};
use firmographer::sink::{JsonFileStore, MemorySink, PersistenceSink};

/// Cooperative cancellation flag, checked by the pipeline between entities
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "firmographer=warn",
        1 => "firmographer=info",
        _ => "firmographer=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load configuration, offering to create it when missing on an interactive terminal
fn load_config(path: &Path) -> AppConfig {
    match AppConfig::load_from_path(path) {
        Ok(cfg) => cfg,
        Err(ConfigError::FileNotFound(path)) => match AppConfig::prompt_create_config(&path) {
            Ok(Some(created_path)) => {
                println!("Created default configuration file at: {}", created_path.display());
                println!("   Edit this file to customize settings, then run firmographer again.");
                std::process::exit(0);
            }
            Ok(None) => {
                eprintln!("Configuration file not found at: {}", path.display());
                eprintln!("   Run with --init to create a default configuration file.");
                std::process::exit(EXIT_RUNTIME_ERROR);
            }
            Err(e) => {
                eprintln!("Failed to create configuration file: {}", e);
                std::process::exit(EXIT_RUNTIME_ERROR);
            }
        },
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(EXIT_CONFIGURATION_ERROR);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.init {
        let path = cli.config_path();
        match AppConfig::create_default_config_at(&path) {
            Ok(path) => {
                println!("Created default configuration file at: {}", path.display());
                println!("   Edit this file to customize settings, then run firmographer again.");
                return Ok(());
            }
            Err(e) => {
                eprintln!("Failed to create configuration file: {}", e);
                std::process::exit(EXIT_RUNTIME_ERROR);
            }
        }
    }

    if let Err(e) = cli.validate() {
        eprintln!("Invalid arguments: {}", e);
        std::process::exit(EXIT_RUNTIME_ERROR);
    }

    let mut config = load_config(&cli.config_path());
    if let Some(overrides) = &cli.overrides {
        config.overrides.path = Some(overrides.clone());
    }

    match &cli.command {
        Some(Commands::CheckConfig) => return check_config(&config).await,
        Some(Commands::Headers { file }) => return show_headers(&config, Path::new(file)),
        None => {}
    }

    let verbosity = VerbosityLevel::from_verbose_count(cli.verbose);
    let logger = match &cli.log_file {
        Some(log_file_path) => RunLogger::with_log_file(verbosity, log_file_path.clone()),
        None => RunLogger::new(verbosity),
    };

    ctrlc::set_handler(move || {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            eprintln!("\nSecond interrupt received, exiting immediately.");
            std::process::exit(130);
        }
        eprintln!("\nInterrupt received. Finishing the current company, then stopping...");
    })
    .unwrap_or_else(|e| {
        eprintln!("Warning: Failed to set Ctrl-C handler: {}. Interrupt signals may not be handled gracefully.", e);
    });

    match run_batch(&cli, &config, &logger).await {
        Ok(()) => Ok(()),
        Err(e) => {
            logger.error(&format!("{:#}", e));
            let _ = logger.export_logs();
            std::process::exit(EXIT_RUNTIME_ERROR);
        }
    }
}

async fn run_batch(cli: &Cli, config: &AppConfig, logger: &RunLogger) -> Result<()> {
    let input_path = PathBuf::from(cli.input.as_deref().unwrap_or_default());
    let table = load_input(&input_path)?;
    logger.debug(&format!("Loaded {} rows from {}", table.len(), input_path.display()));

    let pipeline = Pipeline::from_config(config)?;
    pipeline.governor().log_config().await;

    let mut sink: Box<dyn PersistenceSink> = match &cli.store {
        Some(store) => Box::new(JsonFileStore::open(Path::new(store))?),
        None => Box::new(MemorySink::new()),
    };

    let output = match pipeline.run(&table, sink.as_mut(), &INTERRUPTED, Some(logger)).await {
        Ok(output) => output,
        Err(e) => {
            logger.error(&format!("{} ({})", e, e.outcome()));
            let _ = logger.export_logs();
            std::process::exit(e.exit_code());
        }
    };

    let format = cli.format().unwrap_or(OutputFormat::Csv);
    let output_path = cli.output_path().context("Could not derive an output path from --input")?;
    match format {
        OutputFormat::Csv => export_csv(&output.records, pipeline.normalizer(), &output_path)?,
        OutputFormat::Json => export_json(&output.records, &output.summary, pipeline.normalizer(), &output_path)?,
    }
    logger.log_export_success(&output_path.display().to_string());

    if let Some(summary_path) = &cli.summary {
        export_run_summary(&output.summary, Path::new(summary_path))?;
        logger.debug(&format!("Run summary written to {}", summary_path));
    }

    logger.print_final_summary(&output.summary);

    if logger.is_log_export_enabled() {
        logger.export_logs().context("Failed to export logs")?;
        eprintln!("Exported {} log entries", logger.get_log_count());
    }

    Ok(())
}

async fn check_config(config: &AppConfig) -> Result<()> {
    let governor = SharedGovernor::from_config(&config.throttle);
    let sources = config.sources.enabled_sources()?;

    println!("Configuration OK");
    println!(
        "Enabled sources (precedence order): {}",
        sources.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
    );
    println!(
        "Escalation factor {} (cap {} ms), circuit breaker after {} hostile responses",
        config.throttle.escalation_factor, config.throttle.max_delay_ms, config.throttle.circuit_breaker_threshold
    );
    for status in governor.snapshot().await {
        println!(
            "  {:<22} {} ms - {} ms",
            status.source.as_str(),
            status.baseline.min.as_millis(),
            status.baseline.max.as_millis()
        );
    }
    match &config.overrides.path {
        Some(path) => println!("Manual overrides: {}", path),
        None => println!("Manual overrides: none"),
    }
    Ok(())
}

fn show_headers(config: &AppConfig, file: &Path) -> Result<()> {
    let table = load_input(file)?;
    let normalizer = SchemaNormalizer::from_config(&config.schema);

    println!("{} ({} rows)", file.display(), table.len());
    for mapping in normalizer.describe_headers(&table.headers) {
        let note = match (mapping.role, mapping.shadowed) {
            (HeaderRole::Alias(..), true) => "  [dropped: a higher-tier column supplies this field]",
            (HeaderRole::Passthrough, _) => "  [copied through unchanged]",
            _ => "",
        };
        println!("  {:<30} -> {}{}", mapping.header, mapping.role, note);
    }

    if let Err(e) = normalizer.validate_headers(&table.headers) {
        eprintln!("{}", e);
        std::process::exit(EXIT_CONFIGURATION_ERROR);
    }
    Ok(())
}
