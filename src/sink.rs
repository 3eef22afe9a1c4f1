// sink.rs - Persistence Sink contract and implementations
//
// The pipeline only relies on an idempotent upsert keyed by identity. The
// JSON file store rewrites the whole file on every upsert through a temp file
// and rename, so an interrupted run never leaves a half-written store behind.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::record::{Attribute, CompanyRecord};

const STORE_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertResult {
    Success,
    Failure(String),
}

impl UpsertResult {
    pub fn is_success(&self) -> bool {
        matches!(self, UpsertResult::Success)
    }
}

pub trait PersistenceSink {
    /// Insert or update the record stored under `record.identity`
    fn upsert(&mut self, record: &CompanyRecord) -> UpsertResult;

    /// Previously stored copy of an identity, used to skip fields already resolved
    fn existing(&self, _identity: &str) -> Option<CompanyRecord> {
        None
    }
}

/// Incoming populated fields win; stored values fill the gaps
pub fn merge_records(stored: &CompanyRecord, incoming: &CompanyRecord) -> CompanyRecord {
    let mut merged = incoming.clone();
    merged.fill_missing_from(stored);
    for source in &stored.skipped_sources {
        if !merged.skipped_sources.contains(source) && Attribute::ALL.iter().any(|a| !merged.is_populated(*a)) {
            merged.skipped_sources.push(*source);
        }
    }
    merged.processing_status = merged.compute_status();
    merged
}

/// In-process sink
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: BTreeMap<String, CompanyRecord>,
    pub upserts: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceSink for MemorySink {
    fn upsert(&mut self, record: &CompanyRecord) -> UpsertResult {
        if !record.has_identity() {
            return UpsertResult::Failure("record has no identity".to_string());
        }
        self.upserts += 1;
        let merged = match self.records.get(&record.identity) {
            Some(stored) => merge_records(stored, record),
            None => record.clone(),
        };
        self.records.insert(record.identity.clone(), merged);
        UpsertResult::Success
    }

    fn existing(&self, identity: &str) -> Option<CompanyRecord> {
        self.records.get(identity).cloned()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: String,
    updated: String,
    records: BTreeMap<String, CompanyRecord>,
}

/// Records persisted as one JSON document keyed by identity
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: BTreeMap<String, CompanyRecord>,
}

impl JsonFileStore {
    /// Open an existing store or start an empty one at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let records = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read record store: {}", path.display()))?;
            let file: StoreFile = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse record store: {}", path.display()))?;
            info!("Loaded {} stored records from {}", file.records.len(), path.display());
            file.records
        } else {
            debug!("No record store at {}, starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the store atomically (temp file, fsync, rename)
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store directory: {}", parent.display()))?;
        }

        let file = StoreFile {
            version: STORE_VERSION.to_string(),
            updated: chrono::Utc::now().to_rfc3339(),
            records: self.records.clone(),
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize record store")?;

        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut out = fs::File::create(&temp_path)
                .with_context(|| format!("Failed to create {}", temp_path.display()))?;
            out.write_all(json.as_bytes())?;
            out.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to replace record store: {}", self.path.display()))?;
        Ok(())
    }
}

impl PersistenceSink for JsonFileStore {
    fn upsert(&mut self, record: &CompanyRecord) -> UpsertResult {
        if !record.has_identity() {
            return UpsertResult::Failure("record has no identity".to_string());
        }

        let merged = match self.records.get(&record.identity) {
            Some(stored) => merge_records(stored, record),
            None => record.clone(),
        };
        let previous = self.records.insert(record.identity.clone(), merged);

        match self.save() {
            Ok(()) => UpsertResult::Success,
            Err(e) => {
                // keep memory consistent with disk
                match previous {
                    Some(previous) => self.records.insert(record.identity.clone(), previous),
                    None => self.records.remove(&record.identity),
                };
                UpsertResult::Failure(format!("{:#}", e))
            }
        }
    }

    fn existing(&self, identity: &str) -> Option<CompanyRecord> {
        self.records.get(identity).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Outcome;
    use crate::record::{FieldProvenance, ProcessingStatus};
    use tempfile::TempDir;

    fn acme() -> CompanyRecord {
        CompanyRecord::new(Some("Acme".into()), Some("https://acme.com".into()), None)
    }

    #[test]
    fn test_merge_keeps_stored_fields_incoming_lacks() {
        let mut stored = acme();
        stored.set(Attribute::Size, "51-200", FieldProvenance::new("company_website", None, Outcome::Success));
        stored.set(Attribute::Industry, "Retail", FieldProvenance::input());

        let mut incoming = acme();
        incoming.set(Attribute::Industry, "Logistics", FieldProvenance::new("manual_override", None, Outcome::Success));

        let merged = merge_records(&stored, &incoming);
        assert_eq!(merged.size_bucket.as_deref(), Some("51-200"));
        assert_eq!(merged.industry.as_deref(), Some("Logistics"));
        assert_eq!(merged.processing_status, ProcessingStatus::PartiallyResolved);
    }

    #[test]
    fn test_memory_sink_rejects_missing_identity() {
        let mut sink = MemorySink::new();
        let nameless = CompanyRecord::new(None, None, None);
        assert!(!sink.upsert(&nameless).is_success());
        assert!(sink.upsert(&acme()).is_success());
        assert_eq!(sink.upserts, 1);
        assert!(sink.existing("acme.com").is_some());
    }

    #[test]
    fn test_json_store_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");

        let mut store = JsonFileStore::open(&path).unwrap();
        assert!(store.is_empty());
        let mut record = acme();
        record.set(Attribute::Revenue, "$5 Million", FieldProvenance::input());
        assert_eq!(store.upsert(&record), UpsertResult::Success);
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(
            reopened.existing("acme.com").unwrap().revenue_estimate.as_deref(),
            Some("$5 Million")
        );
    }

    #[test]
    fn test_json_store_upsert_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        let mut store = JsonFileStore::open(&path).unwrap();

        let record = acme();
        store.upsert(&record);
        store.upsert(&record);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
    }
}
