//! Reconciliation Orchestrator
//!
//! Resolves one entity at a time: manual overrides first, then each enabled
//! source in precedence order until nothing is missing. Populated fields are
//! never overwritten by an automated source.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::extraction::validate;
use crate::governor::SharedGovernor;
use crate::outcome::Outcome;
use crate::overrides::{find_override, OverrideLookup};
use crate::record::{Attribute, CompanyRecord, FieldProvenance, ProcessingStatus, SOURCE_MANUAL_OVERRIDE};
use crate::sources::{AdapterResult, SourceAdapter, SourceId};

/// Per-entity lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Pending,
    Resolving,
    Querying(SourceId),
    Merging(SourceId),
    Complete,
    PartiallyComplete,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::Pending => write!(f, "Pending"),
            EntityState::Resolving => write!(f, "Resolving"),
            EntityState::Querying(source) => write!(f, "Querying({})", source),
            EntityState::Merging(source) => write!(f, "Merging({})", source),
            EntityState::Complete => write!(f, "Complete"),
            EntityState::PartiallyComplete => write!(f, "PartiallyComplete"),
        }
    }
}

/// What happened while reconciling one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityReport {
    pub identity: String,
    /// Every adapter invocation with its outcome, in call order
    pub invocations: Vec<(SourceId, Outcome)>,
    /// Sources passed over because they were circuit-broken
    pub skipped: Vec<SourceId>,
    /// Fields set from the manual-override table
    pub overridden: Vec<Attribute>,
    pub final_state: EntityState,
    pub status: ProcessingStatus,
}

pub struct Reconciler {
    overrides: Arc<dyn OverrideLookup>,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    governor: SharedGovernor,
}

impl Reconciler {
    pub fn new(
        overrides: Arc<dyn OverrideLookup>,
        mut adapters: Vec<Arc<dyn SourceAdapter>>,
        governor: SharedGovernor,
    ) -> Self {
        adapters.sort_by_key(|adapter| adapter.source());
        adapters.dedup_by_key(|adapter| adapter.source());
        Self {
            overrides,
            adapters,
            governor,
        }
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.adapters.iter().map(|a| a.source()).collect()
    }

    pub fn governor(&self) -> &SharedGovernor {
        &self.governor
    }

    pub async fn reconcile(&self, record: &mut CompanyRecord) -> EntityReport {
        let mut report = EntityReport {
            identity: record.identity.clone(),
            invocations: Vec::new(),
            skipped: Vec::new(),
            overridden: Vec::new(),
            final_state: EntityState::Pending,
            status: record.processing_status,
        };
        transition(&mut report, EntityState::Resolving);

        report.overridden = self.apply_overrides(record);

        let mut missing = record.missing_fields();
        // fields some source answered for during this reconciliation
        let mut attempted: Vec<Attribute> = Vec::new();
        if missing.is_empty() {
            debug!("{}: nothing missing, no sources consulted", record.identity);
        }

        for adapter in &self.adapters {
            if missing.is_empty() {
                break;
            }
            let source = adapter.source();
            if adapter.requested(&missing).is_empty() {
                continue;
            }

            if let Some(outcome) = self.governor.circuit_outcome(source).await {
                debug!("{}: skipping circuit-broken source {}", record.identity, source);
                report.skipped.push(source);
                if !record.skipped_sources.contains(&source) {
                    record.skipped_sources.push(source);
                }
                for attr in adapter.requested(&missing) {
                    if !attempted.contains(&attr) {
                        record.note_attempt(attr, FieldProvenance::new(source.as_str(), None, outcome));
                    }
                }
                continue;
            }

            transition(&mut report, EntityState::Querying(source));
            let Some(result) = adapter.fetch_and_extract(record, &missing).await else {
                debug!("{}: {} had nothing to look up", record.identity, source);
                continue;
            };
            report.invocations.push((source, result.outcome));

            transition(&mut report, EntityState::Merging(source));
            merge_result(record, &missing, &result);
            attempted.extend(result.field_outcomes.keys().copied());
            missing = record.missing_fields();
        }

        record.processing_status = record.compute_status();
        report.status = record.processing_status;
        let final_state = if missing.is_empty() {
            EntityState::Complete
        } else {
            EntityState::PartiallyComplete
        };
        transition(&mut report, final_state);

        info!(
            "{} -> {} ({} invocations, {} skipped, {} overridden)",
            record.identity,
            report.status,
            report.invocations.len(),
            report.skipped.len(),
            report.overridden.len()
        );
        report
    }

    /// Apply manual overrides; a valid override always replaces the current value
    fn apply_overrides(&self, record: &mut CompanyRecord) -> Vec<Attribute> {
        let Some(fields) = find_override(self.overrides.as_ref(), record) else {
            return Vec::new();
        };

        let mut applied = Vec::new();
        for attr in Attribute::ALL {
            let Some(raw) = fields.get(attr) else {
                continue;
            };
            let value = match validate::validate(attr, raw) {
                Ok(value) => value,
                Err(rejection) => {
                    warn!("Ignoring manual override for {} {}: {}", record.identity, attr, rejection);
                    continue;
                }
            };

            let provenance = FieldProvenance::new(SOURCE_MANUAL_OVERRIDE, None, Outcome::Success);
            let unchanged = record.get(attr) == Some(value.as_str()) && record.provenance(attr) == Some(&provenance);
            if !unchanged {
                debug!("{}: manual override sets {} = {}", record.identity, attr, value);
                record.set(attr, value, provenance);
            }
            applied.push(attr);
        }
        applied
    }
}

fn transition(report: &mut EntityReport, next: EntityState) {
    debug!("{}: {} -> {}", report.identity, report.final_state, next);
    report.final_state = next;
}

/// Fill only still-missing fields; record why the rest stayed empty
fn merge_result(record: &mut CompanyRecord, missing: &[Attribute], result: &AdapterResult) {
    let source = result.source.as_str();

    for (attr, value) in &result.fields {
        if missing.contains(attr) && !record.is_populated(*attr) {
            record.set(
                *attr,
                value.clone(),
                FieldProvenance::new(source, result.evidence_url.clone(), Outcome::Success),
            );
        }
    }

    for (attr, outcome) in &result.field_outcomes {
        if *outcome != Outcome::Success {
            record.note_attempt(
                *attr,
                FieldProvenance::new(source, result.evidence_url.clone(), *outcome),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::governor::{RecordingSleeper, SharedGovernor};
    use crate::overrides::{JsonOverrideTable, NoOverrides, PartialFields};
    use crate::record::SOURCE_INPUT;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Adapter returning a canned result and counting invocations
    struct StubAdapter {
        source: SourceId,
        fields: &'static [Attribute],
        outcome: Outcome,
        values: Vec<(Attribute, &'static str)>,
        calls: AtomicUsize,
        /// Outcomes are reported here the way a real fetch reports them
        governor: Option<SharedGovernor>,
    }

    impl StubAdapter {
        fn new(source: SourceId, outcome: Outcome, values: Vec<(Attribute, &'static str)>) -> Arc<Self> {
            Arc::new(Self {
                source,
                fields: &[Attribute::Size, Attribute::Industry, Attribute::Revenue],
                outcome,
                values,
                calls: AtomicUsize::new(0),
                governor: None,
            })
        }

        fn reporting(source: SourceId, outcome: Outcome, governor: SharedGovernor) -> Arc<Self> {
            Arc::new(Self {
                source,
                fields: &[Attribute::Size, Attribute::Industry, Attribute::Revenue],
                outcome,
                values: vec![],
                calls: AtomicUsize::new(0),
                governor: Some(governor),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn source(&self) -> SourceId {
            self.source
        }

        fn relevant_fields(&self) -> &'static [Attribute] {
            self.fields
        }

        async fn fetch_and_extract(&self, _entity: &CompanyRecord, missing: &[Attribute]) -> Option<AdapterResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(governor) = &self.governor {
                governor.on_outcome(self.source, self.outcome).await;
            }
            let fields: BTreeMap<Attribute, String> = self
                .values
                .iter()
                .filter(|(a, _)| missing.contains(a))
                .map(|(a, v)| (*a, v.to_string()))
                .collect();
            let field_outcomes = missing
                .iter()
                .map(|a| (*a, if fields.contains_key(a) { Outcome::Success } else { self.outcome }))
                .collect();
            Some(AdapterResult {
                source: self.source,
                outcome: self.outcome,
                fields,
                evidence_url: Some(format!("https://{}.test/acme", self.source)),
                field_outcomes,
            })
        }
    }

    fn governor(threshold: u32) -> SharedGovernor {
        let mut config = AppConfig::from_toml_str(crate::config::DEFAULT_CONFIG).unwrap();
        config.throttle.circuit_breaker_threshold = threshold;
        SharedGovernor::with_sleeper(&config.throttle, Arc::new(RecordingSleeper::new()), 7)
    }

    fn acme() -> CompanyRecord {
        CompanyRecord::new(Some("Acme".into()), Some("https://acme.com".into()), None)
    }

    #[tokio::test]
    async fn test_sources_consulted_in_precedence_until_complete() {
        let directory = StubAdapter::new(SourceId::PublicDirectory, Outcome::Success, vec![(Attribute::Revenue, "$5 Million")]);
        let network = StubAdapter::new(
            SourceId::ProfessionalNetwork,
            Outcome::Success,
            vec![(Attribute::Size, "51-200"), (Attribute::Industry, "Logistics")],
        );
        let website = StubAdapter::new(SourceId::CompanyWebsite, Outcome::Success, vec![(Attribute::Revenue, "$9 Million")]);

        let reconciler = Reconciler::new(
            Arc::new(NoOverrides),
            vec![directory.clone(), network.clone(), website.clone()],
            governor(3),
        );
        assert_eq!(reconciler.sources(), SourceId::PRECEDENCE.to_vec());

        let mut record = acme();
        let report = reconciler.reconcile(&mut record).await;

        assert_eq!(record.revenue_estimate.as_deref(), Some("$9 Million"));
        assert_eq!(record.provenance(Attribute::Revenue).unwrap().source_name, "company_website");
        assert_eq!(directory.calls(), 0);
        assert_eq!(report.invocations.len(), 2);
        assert_eq!(report.final_state, EntityState::Complete);
        assert_eq!(record.processing_status, ProcessingStatus::Resolved);
    }

    #[tokio::test]
    async fn test_resolved_record_is_untouched() {
        let network = StubAdapter::new(SourceId::ProfessionalNetwork, Outcome::Success, vec![(Attribute::Size, "11-50")]);
        let reconciler = Reconciler::new(Arc::new(NoOverrides), vec![network.clone()], governor(3));

        let mut record = acme();
        record.set(Attribute::Size, "51-200", FieldProvenance::input());
        record.set(Attribute::Industry, "Logistics", FieldProvenance::input());
        record.set(Attribute::Revenue, "$5 Million", FieldProvenance::input());
        record.processing_status = ProcessingStatus::Resolved;
        let before = serde_json::to_string(&record).unwrap();

        let report = reconciler.reconcile(&mut record).await;
        assert!(report.invocations.is_empty());
        assert_eq!(network.calls(), 0);
        assert_eq!(serde_json::to_string(&record).unwrap(), before);
    }

    #[tokio::test]
    async fn test_override_wins_over_adapter_and_input() {
        let table = JsonOverrideTable::from_entries([(
            "acme.com".to_string(),
            PartialFields {
                revenue_estimate: Some("$55.2 million".into()),
                ..Default::default()
            },
        )]);
        let website = StubAdapter::new(
            SourceId::CompanyWebsite,
            Outcome::Success,
            vec![(Attribute::Revenue, "$80 Million"), (Attribute::Size, "201-500")],
        );
        let reconciler = Reconciler::new(Arc::new(table), vec![website], governor(3));

        let mut record = acme();
        record.set(Attribute::Revenue, "$1 Million", FieldProvenance::input());
        let report = reconciler.reconcile(&mut record).await;

        assert_eq!(record.revenue_estimate.as_deref(), Some("$55.2 Million"));
        assert_eq!(record.provenance(Attribute::Revenue).unwrap().source_name, SOURCE_MANUAL_OVERRIDE);
        assert_eq!(record.size_bucket.as_deref(), Some("201-500"));
        assert_eq!(report.overridden, vec![Attribute::Revenue]);
    }

    #[tokio::test]
    async fn test_circuit_broken_source_is_skipped_for_later_entities() {
        let governor = governor(2);
        let website = StubAdapter::reporting(SourceId::CompanyWebsite, Outcome::Blocked, governor.clone());
        let reconciler = Reconciler::new(Arc::new(NoOverrides), vec![website.clone()], governor);

        for _ in 0..2 {
            let mut record = acme();
            let report = reconciler.reconcile(&mut record).await;
            assert_eq!(report.invocations, vec![(SourceId::CompanyWebsite, Outcome::Blocked)]);
            assert_eq!(record.provenance(Attribute::Size).unwrap().outcome, Outcome::Blocked);
        }

        let mut third = acme();
        third.set(Attribute::Industry, "Logistics", FieldProvenance::input());
        let report = reconciler.reconcile(&mut third).await;

        assert_eq!(website.calls(), 2);
        assert!(report.invocations.is_empty());
        assert_eq!(report.skipped, vec![SourceId::CompanyWebsite]);
        assert_eq!(third.skipped_sources, vec![SourceId::CompanyWebsite]);
        for attr in [Attribute::Size, Attribute::Revenue] {
            let prov = third.provenance(attr).unwrap();
            assert_eq!(prov.source_name, "company_website");
            assert_eq!(prov.source_url, None);
            assert_eq!(prov.outcome, Outcome::Blocked);
        }
        assert_eq!(third.provenance(Attribute::Industry).unwrap().source_name, SOURCE_INPUT);
        assert_eq!(third.processing_status, ProcessingStatus::PartiallyResolved);
        assert_eq!(report.final_state, EntityState::PartiallyComplete);
    }

    #[tokio::test]
    async fn test_skip_keeps_outcomes_from_sources_already_consulted() {
        let governor = governor(2);
        governor.on_outcome(SourceId::CompanyWebsite, Outcome::RateLimited).await;
        governor.on_outcome(SourceId::CompanyWebsite, Outcome::RateLimited).await;

        let network = StubAdapter::new(SourceId::ProfessionalNetwork, Outcome::NotFound, vec![]);
        let website = StubAdapter::new(SourceId::CompanyWebsite, Outcome::Success, vec![]);
        let reconciler = Reconciler::new(Arc::new(NoOverrides), vec![network.clone(), website.clone()], governor);

        let mut record = acme();
        let report = reconciler.reconcile(&mut record).await;

        assert_eq!(website.calls(), 0);
        assert_eq!(report.skipped, vec![SourceId::CompanyWebsite]);
        let size = record.provenance(Attribute::Size).unwrap();
        assert_eq!(size.source_name, "professional_network");
        assert_eq!(size.outcome, Outcome::NotFound);
        assert_eq!(record.processing_status, ProcessingStatus::Failed);
    }

    #[tokio::test]
    async fn test_nothing_found_marks_failed_with_outcomes() {
        let website = StubAdapter::new(SourceId::CompanyWebsite, Outcome::NotFound, vec![]);
        let reconciler = Reconciler::new(Arc::new(NoOverrides), vec![website], governor(3));

        let mut record = acme();
        reconciler.reconcile(&mut record).await;
        assert_eq!(record.processing_status, ProcessingStatus::Failed);
        assert_eq!(record.size_bucket, None);
        assert_eq!(record.provenance(Attribute::Revenue).unwrap().outcome, Outcome::NotFound);
    }

    #[tokio::test]
    async fn test_invalid_override_is_ignored() {
        let table = JsonOverrideTable::from_entries([(
            "acme.com".to_string(),
            PartialFields {
                industry: Some("42".into()),
                ..Default::default()
            },
        )]);
        let reconciler = Reconciler::new(Arc::new(table), vec![], governor(3));
        let mut record = acme();
        let report = reconciler.reconcile(&mut record).await;
        assert!(report.overridden.is_empty());
        assert_eq!(record.industry, None);
    }
}
