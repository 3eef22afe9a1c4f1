//! Manual override table
//!
//! Hand-verified attribute values keyed by company identity. Overrides are
//! consulted before any network source and always win over fetched values.
//!
//! Lookup order for a record: identity → website base domain → profile key →
//! lowercased name.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::domain_utils::{extract_base_domain, host_of, normalize_identity_key};
use crate::record::{Attribute, CompanyRecord};

/// Attribute values supplied by an override entry; absent means "no opinion"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue_estimate: Option<String>,
    /// Free-form reviewer note, never copied into records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl PartialFields {
    pub fn get(&self, attr: Attribute) -> Option<&str> {
        let value = match attr {
            Attribute::Size => self.size_bucket.as_deref(),
            Attribute::Industry => self.industry.as_deref(),
            Attribute::Revenue => self.revenue_estimate.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        Attribute::ALL.iter().all(|a| self.get(*a).is_none())
    }
}

/// Read-only override source
pub trait OverrideLookup: Send + Sync {
    fn lookup(&self, identity_key: &str) -> Option<PartialFields>;
}

/// No overrides configured
pub struct NoOverrides;

impl OverrideLookup for NoOverrides {
    fn lookup(&self, _identity_key: &str) -> Option<PartialFields> {
        None
    }
}

/// On-disk override file layout
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OverridesDatabase {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub updated: String,
    pub overrides: HashMap<String, PartialFields>,
}

/// Override table loaded from a JSON file
#[derive(Debug, Clone, Default)]
pub struct JsonOverrideTable {
    entries: HashMap<String, PartialFields>,
}

impl JsonOverrideTable {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manual overrides from {:?}", path))?;
        let table = Self::from_json_str(&content)
            .with_context(|| format!("Failed to parse manual overrides from {:?}", path))?;
        info!("Loaded {} manual overrides from {:?}", table.len(), path);
        Ok(table)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let db: OverridesDatabase = serde_json::from_str(content)?;
        Ok(Self::from_entries(db.overrides))
    }

    /// Keys are normalized the same way record identities are
    pub fn from_entries(entries: impl IntoIterator<Item = (String, PartialFields)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(key, fields)| (normalize_identity_key(&key), fields))
            .filter(|(key, fields)| !key.is_empty() && !fields.is_empty())
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl OverrideLookup for JsonOverrideTable {
    fn lookup(&self, identity_key: &str) -> Option<PartialFields> {
        let hit = self.entries.get(&normalize_identity_key(identity_key)).cloned();
        if hit.is_some() {
            debug!("Manual override hit for {}", identity_key);
        }
        hit
    }
}

/// Keys a record may be overridden under, most specific first
pub fn lookup_keys(record: &CompanyRecord) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    let mut push = |key: String| {
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    };

    push(record.identity.clone());
    if let Some(host) = record.website_url.as_deref().and_then(host_of) {
        push(extract_base_domain(&host));
    }
    if let Some(profile) = record.network_profile_url.as_deref() {
        push(normalize_identity_key(profile));
    }
    if let Some(name) = record.name.as_deref() {
        push(normalize_identity_key(name));
    }

    keys
}

/// First override entry matching any of the record's keys
pub fn find_override(table: &dyn OverrideLookup, record: &CompanyRecord) -> Option<PartialFields> {
    lookup_keys(record).iter().find_map(|key| table.lookup(key))
}
