//! Run driver
//!
//! Normalizes the input table, reconciles entities strictly one after another,
//! persists each reconciled identity once and builds the run summary. A
//! caller-supplied flag is checked between entities for cooperative
//! cancellation.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::batch::{finalize_run_summary, new_run_summary, InputTable, RunStatus, RunSummary};
use crate::config::AppConfig;
use crate::fabricator::RequestFabricator;
use crate::governor::SharedGovernor;
use crate::logger::RunLogger;
use crate::normalizer::{NormalizeError, SchemaNormalizer};
use crate::outcome::Outcome;
use crate::overrides::{JsonOverrideTable, NoOverrides, OverrideLookup};
use crate::reconcile::Reconciler;
use crate::record::{CompanyRecord, ProcessingStatus};
use crate::sink::{PersistenceSink, UpsertResult};
use crate::sources::{
    CompanyWebsiteAdapter, FetchContext, ProfessionalNetworkAdapter, PublicDirectoryAdapter, SourceAdapter, SourceId,
};

/// Exit code for runtime failures
pub const EXIT_RUNTIME_ERROR: i32 = 1;
/// Exit code for configuration errors that make the run impossible
pub const EXIT_CONFIGURATION_ERROR: i32 = 2;

/// Errors that abort a whole run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input is unusable: {0}")]
    Configuration(#[from] NormalizeError),
}

impl PipelineError {
    pub fn outcome(&self) -> Outcome {
        match self {
            PipelineError::Configuration(_) => Outcome::ConfigurationError,
        }
    }

    /// Process exit code for a run that ended with this error
    pub fn exit_code(&self) -> i32 {
        if self.outcome().is_fatal() {
            EXIT_CONFIGURATION_ERROR
        } else {
            EXIT_RUNTIME_ERROR
        }
    }
}

/// Augmented batch plus aggregate summary
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub records: Vec<CompanyRecord>,
    pub summary: RunSummary,
}

pub struct Pipeline {
    normalizer: SchemaNormalizer,
    reconciler: Reconciler,
}

impl Pipeline {
    pub fn new(normalizer: SchemaNormalizer, reconciler: Reconciler) -> Self {
        Self { normalizer, reconciler }
    }

    /// Production wiring: real sleeps, entropy-seeded randomness, overrides from config
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let overrides = load_overrides(config)?;
        Self::build(config, SharedGovernor::from_config(&config.throttle), overrides)
    }

    /// Wire the enabled adapters around an existing governor
    pub fn build(config: &AppConfig, governor: SharedGovernor, overrides: Arc<dyn OverrideLookup>) -> Result<Self> {
        let ctx = FetchContext::new(Arc::new(RequestFabricator::from_config(&config.http)), governor.clone());

        let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
        for source in config.sources.enabled_sources()? {
            let adapter: Arc<dyn SourceAdapter> = match source {
                SourceId::ProfessionalNetwork => Arc::new(ProfessionalNetworkAdapter::new(ctx.clone())),
                SourceId::CompanyWebsite => Arc::new(CompanyWebsiteAdapter::new(
                    ctx.clone(),
                    config.sources.company_website.sub_paths.clone(),
                )),
                SourceId::PublicDirectory => Arc::new(PublicDirectoryAdapter::new(
                    ctx.clone(),
                    config.sources.public_directory.clone(),
                )),
            };
            adapters.push(adapter);
        }

        Ok(Self::new(
            SchemaNormalizer::from_config(&config.schema),
            Reconciler::new(overrides, adapters, governor),
        ))
    }

    pub fn normalizer(&self) -> &SchemaNormalizer {
        &self.normalizer
    }

    pub fn governor(&self) -> &SharedGovernor {
        self.reconciler.governor()
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.reconciler.sources()
    }

    pub async fn run(
        &self,
        table: &InputTable,
        sink: &mut dyn PersistenceSink,
        cancel: &AtomicBool,
        logger: Option<&RunLogger>,
    ) -> Result<RunOutput, PipelineError> {
        self.normalizer.validate_headers(&table.headers)?;

        let started = Instant::now();
        let total = table.len();
        let mut summary = new_run_summary(total);
        let mut records: Vec<CompanyRecord> = table.rows.iter().map(|row| self.normalizer.normalize_in(row)).collect();

        if let Some(logger) = logger {
            logger.log_run_start(total, &self.sources());
            logger.start_progress(total as u64).await;
        }

        let mut first_seen: HashMap<String, usize> = HashMap::new();
        let mut broken: HashSet<SourceId> = HashSet::new();
        let mut run_status = RunStatus::Completed;

        for i in 0..records.len() {
            if cancel.load(Ordering::SeqCst) {
                run_status = RunStatus::Cancelled;
                warn!("Cancellation requested, stopping after {} of {} rows", i, total);
                if let Some(logger) = logger {
                    logger.log_cancelled(i, total);
                }
                break;
            }

            if !records[i].has_identity() {
                records[i].processing_status = ProcessingStatus::Failed;
                summary.processed += 1;
                if let Some(logger) = logger {
                    logger.log_unidentifiable_row(i);
                    logger.advance_progress(1).await;
                }
                continue;
            }

            let identity = records[i].identity.clone();
            if let Some(&first) = first_seen.get(&identity) {
                let earlier = records[first].clone();
                let duplicate = &mut records[i];
                duplicate.fill_missing_from(&earlier);
                duplicate.skipped_sources = earlier.skipped_sources.clone();
                duplicate.processing_status = duplicate.compute_status();
                summary.processed += 1;
                if let Some(logger) = logger {
                    logger.log_duplicate_identity(&identity);
                    logger.advance_progress(1).await;
                }
                continue;
            }
            first_seen.insert(identity.clone(), i);

            if let Some(stored) = sink.existing(&identity) {
                let hydrated = records[i].fill_missing_from(&stored);
                if !hydrated.is_empty() {
                    debug!("{}: hydrated {:?} from the store", identity, hydrated);
                }
            }

            if let Some(logger) = logger {
                logger.update_progress(&identity).await;
            }
            let report = self.reconciler.reconcile(&mut records[i]).await;
            summary.record_entity(&report);

            match sink.upsert(&records[i]) {
                UpsertResult::Success => summary.persisted += 1,
                UpsertResult::Failure(reason) => {
                    warn!("Failed to persist {}: {}", identity, reason);
                    summary.persist_failures += 1;
                    if let Some(logger) = logger {
                        logger.log_persist_failure(&identity, &reason);
                    }
                }
            }

            for source in self.governor().circuit_broken_sources().await {
                if broken.insert(source) {
                    if let Some(logger) = logger {
                        logger.log_circuit_broken(source);
                    }
                }
            }

            if let Some(logger) = logger {
                logger.log_entity_result(&report);
                logger.advance_progress(1).await;
            }
        }

        let mut circuit_broken: Vec<SourceId> = broken.into_iter().collect();
        circuit_broken.sort();
        finalize_run_summary(
            &mut summary,
            &records,
            run_status,
            &circuit_broken,
            started.elapsed().as_secs_f64(),
        );

        if let Some(logger) = logger {
            logger
                .finish_progress(&format!("Run {}: {} of {} rows processed", run_status, summary.processed, total))
                .await;
        }
        info!(
            "Run {} ({} processed, {} persisted, {} persist failures)",
            run_status, summary.processed, summary.persisted, summary.persist_failures
        );

        Ok(RunOutput { records, summary })
    }
}

/// Override table named in config; a missing file means no overrides
pub fn load_overrides(config: &AppConfig) -> Result<Arc<dyn OverrideLookup>> {
    let Some(path) = config.overrides.path.as_deref().filter(|p| !p.trim().is_empty()) else {
        return Ok(Arc::new(NoOverrides));
    };

    let path = Path::new(path);
    if !path.exists() {
        warn!("Manual override file {} not found, continuing without overrides", path.display());
        return Ok(Arc::new(NoOverrides));
    }
    Ok(Arc::new(JsonOverrideTable::load(path)?))
}
