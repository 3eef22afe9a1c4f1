//! Company record data model
//!
//! A `CompanyRecord` is created from one normalized input row, filled in
//! field-by-field during reconciliation and persisted once per run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::domain_utils::normalize_identity_key;
use crate::extraction::validate::validate;
use crate::outcome::Outcome;
use crate::sources::SourceId;

/// Canonical employee-count buckets
pub const CANONICAL_SIZE_BUCKETS: &[&str] = &[
    "1-10",
    "11-50",
    "51-200",
    "201-500",
    "501-1,000",
    "1,001-5,000",
    "5,001-10,000",
    "10,001+",
];

/// Finer-grained buckets some professional networks publish instead of "1-10"
pub const NETWORK_SIZE_BUCKETS: &[&str] = &["0-1", "2-10"];

/// Values older spreadsheets wrote into attribute cells instead of leaving them empty
const PLACEHOLDER_VALUES: &[&str] = &[
    "not found", "n/a", "na", "none", "null", "nil", "error", "unknown", "-", "--", "nan", "?", "tbd", "tba",
];

pub const SOURCE_INPUT: &str = "input";
pub const SOURCE_MANUAL_OVERRIDE: &str = "manual_override";

/// True for empty cells and placeholder markers such as "Not Found"
pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || PLACEHOLDER_VALUES.contains(&trimmed.to_lowercase().as_str())
}

/// The three attributes resolved per company
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Size,
    Industry,
    Revenue,
}

impl Attribute {
    pub const ALL: [Attribute; 3] = [Attribute::Size, Attribute::Industry, Attribute::Revenue];

    /// Canonical column name
    pub fn column(&self) -> &'static str {
        match self {
            Attribute::Size => "size_bucket",
            Attribute::Industry => "industry",
            Attribute::Revenue => "revenue_estimate",
        }
    }

    pub fn from_column(column: &str) -> Option<Self> {
        Attribute::ALL.into_iter().find(|a| a.column() == column)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// Which source, URL and outcome produced (or failed to produce) a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldProvenance {
    pub source_name: String,
    #[serde(default)]
    pub source_url: Option<String>,
    pub outcome: Outcome,
}

impl FieldProvenance {
    pub fn new(source_name: impl Into<String>, source_url: Option<String>, outcome: Outcome) -> Self {
        Self {
            source_name: source_name.into(),
            source_url,
            outcome,
        }
    }

    pub fn input() -> Self {
        Self::new(SOURCE_INPUT, None, Outcome::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum ProcessingStatus {
    #[default]
    Pending,
    PartiallyResolved,
    Resolved,
    Failed,
}

impl ProcessingStatus {
    pub const ALL: [ProcessingStatus; 4] = [
        ProcessingStatus::Pending,
        ProcessingStatus::PartiallyResolved,
        ProcessingStatus::Resolved,
        ProcessingStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "Pending",
            ProcessingStatus::PartiallyResolved => "PartiallyResolved",
            ProcessingStatus::Resolved => "Resolved",
            ProcessingStatus::Failed => "Failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let wanted = value.trim();
        ProcessingStatus::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(wanted))
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derive the persistence key: network profile URL, else website URL, else name
pub fn derive_identity(
    name: Option<&str>,
    website_url: Option<&str>,
    network_profile_url: Option<&str>,
) -> Option<String> {
    [network_profile_url, website_url, name]
        .into_iter()
        .flatten()
        .map(normalize_identity_key)
        .find(|key| !key.is_empty())
}

/// One company row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CompanyRecord {
    /// Empty when the row carries no name, website or profile
    pub identity: String,
    pub name: Option<String>,
    pub website_url: Option<String>,
    pub network_profile_url: Option<String>,
    pub size_bucket: Option<String>,
    pub industry: Option<String>,
    pub revenue_estimate: Option<String>,
    #[serde(default)]
    pub field_provenance: BTreeMap<Attribute, FieldProvenance>,
    /// Sources not invoked because they were circuit-broken
    #[serde(default)]
    pub skipped_sources: Vec<SourceId>,
    #[serde(default)]
    pub processing_status: ProcessingStatus,
    /// Unrecognized input columns, carried through in input order
    #[serde(default)]
    pub passthrough: Vec<(String, String)>,
}

impl CompanyRecord {
    pub fn new(
        name: Option<String>,
        website_url: Option<String>,
        network_profile_url: Option<String>,
    ) -> Self {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let name = clean(name);
        let website_url = clean(website_url);
        let network_profile_url = clean(network_profile_url);
        let identity = derive_identity(
            name.as_deref(),
            website_url.as_deref(),
            network_profile_url.as_deref(),
        )
        .unwrap_or_default();

        Self {
            identity,
            name,
            website_url,
            network_profile_url,
            ..Default::default()
        }
    }

    pub fn has_identity(&self) -> bool {
        !self.identity.is_empty()
    }

    /// Current value of an attribute, `None` when empty or a placeholder
    pub fn get(&self, attr: Attribute) -> Option<&str> {
        let value = match attr {
            Attribute::Size => self.size_bucket.as_deref(),
            Attribute::Industry => self.industry.as_deref(),
            Attribute::Revenue => self.revenue_estimate.as_deref(),
        };
        value.filter(|v| !is_placeholder(v))
    }

    pub fn is_populated(&self, attr: Attribute) -> bool {
        self.get(attr).is_some()
    }

    fn slot_mut(&mut self, attr: Attribute) -> &mut Option<String> {
        match attr {
            Attribute::Size => &mut self.size_bucket,
            Attribute::Industry => &mut self.industry,
            Attribute::Revenue => &mut self.revenue_estimate,
        }
    }

    /// Store a value together with its provenance
    pub fn set(&mut self, attr: Attribute, value: impl Into<String>, provenance: FieldProvenance) {
        *self.slot_mut(attr) = Some(value.into());
        self.field_provenance.insert(attr, provenance);
    }

    /// Record why an attribute is still empty without touching its value
    pub fn note_attempt(&mut self, attr: Attribute, provenance: FieldProvenance) {
        if !self.is_populated(attr) {
            self.field_provenance.insert(attr, provenance);
        }
    }

    pub fn provenance(&self, attr: Attribute) -> Option<&FieldProvenance> {
        self.field_provenance.get(&attr)
    }

    /// Canonical attributes that are empty or hold a placeholder
    pub fn missing_fields(&self) -> Vec<Attribute> {
        Attribute::ALL
            .into_iter()
            .filter(|a| !self.is_populated(*a))
            .collect()
    }

    /// Aggregate status from field population
    pub fn compute_status(&self) -> ProcessingStatus {
        let populated = Attribute::ALL.iter().filter(|a| self.is_populated(**a)).count();
        if populated == Attribute::ALL.len() {
            ProcessingStatus::Resolved
        } else if populated > 0 {
            ProcessingStatus::PartiallyResolved
        } else {
            ProcessingStatus::Failed
        }
    }

    /// Copy fields this record lacks from an earlier copy of the same company.
    /// Stored values go through the same validation as fresh candidates.
    pub fn fill_missing_from(&mut self, other: &CompanyRecord) -> Vec<Attribute> {
        let mut filled = Vec::new();
        for attr in self.missing_fields() {
            let Some(value) = other.get(attr) else {
                continue;
            };
            match validate(attr, value) {
                Ok(cleaned) => {
                    let provenance = other
                        .provenance(attr)
                        .cloned()
                        .unwrap_or_else(FieldProvenance::input);
                    self.set(attr, cleaned, provenance);
                    filled.push(attr);
                }
                Err(rejection) => debug!("Not copying stored {} for '{}': {}", attr, self.identity, rejection),
            }
        }
        filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_prefers_profile_then_website_then_name() {
        let r = CompanyRecord::new(
            Some("Acme Corp".into()),
            Some("https://acme.com".into()),
            Some("https://www.linkedin.com/company/acme".into()),
        );
        assert_eq!(r.identity, "linkedin.com/company/acme");

        let r = CompanyRecord::new(Some("Acme Corp".into()), Some("https://acme.com/".into()), None);
        assert_eq!(r.identity, "acme.com");

        let r = CompanyRecord::new(Some("Acme Corp".into()), Some("  ".into()), None);
        assert_eq!(r.identity, "acme corp");

        let r = CompanyRecord::new(None, None, None);
        assert!(!r.has_identity());
    }

    #[test]
    fn test_placeholders_count_as_missing() {
        let mut r = CompanyRecord::new(Some("Acme".into()), None, None);
        r.size_bucket = Some("Not Found".into());
        r.industry = Some("Error".into());
        r.revenue_estimate = Some("$5M".into());
        assert_eq!(r.missing_fields(), vec![Attribute::Size, Attribute::Industry]);
        assert_eq!(r.get(Attribute::Size), None);
        assert_eq!(r.compute_status(), ProcessingStatus::PartiallyResolved);
    }

    #[test]
    fn test_compute_status() {
        let mut r = CompanyRecord::new(Some("Acme".into()), None, None);
        assert_eq!(r.compute_status(), ProcessingStatus::Failed);
        r.set(Attribute::Size, "11-50", FieldProvenance::input());
        assert_eq!(r.compute_status(), ProcessingStatus::PartiallyResolved);
        r.set(Attribute::Industry, "Software", FieldProvenance::input());
        r.set(Attribute::Revenue, "$2 Million", FieldProvenance::input());
        assert_eq!(r.compute_status(), ProcessingStatus::Resolved);
    }

    #[test]
    fn test_note_attempt_never_touches_populated_field() {
        let mut r = CompanyRecord::new(Some("Acme".into()), None, None);
        r.set(Attribute::Industry, "Software", FieldProvenance::input());
        r.note_attempt(
            Attribute::Industry,
            FieldProvenance::new("company_website", None, Outcome::Blocked),
        );
        assert_eq!(r.provenance(Attribute::Industry).unwrap().source_name, SOURCE_INPUT);

        r.note_attempt(
            Attribute::Size,
            FieldProvenance::new("company_website", None, Outcome::Blocked),
        );
        assert_eq!(r.provenance(Attribute::Size).unwrap().outcome, Outcome::Blocked);
        assert_eq!(r.size_bucket, None);
    }

    #[test]
    fn test_fill_missing_from_keeps_existing_values() {
        let mut stored = CompanyRecord::new(Some("Acme".into()), None, None);
        stored.set(Attribute::Size, "51-200", FieldProvenance::new("professional_network", None, Outcome::Success));
        stored.set(Attribute::Industry, "Retail", FieldProvenance::input());

        let mut fresh = CompanyRecord::new(Some("Acme".into()), None, None);
        fresh.set(Attribute::Industry, "Software", FieldProvenance::input());

        let filled = fresh.fill_missing_from(&stored);
        assert_eq!(filled, vec![Attribute::Size]);
        assert_eq!(fresh.industry.as_deref(), Some("Software"));
        assert_eq!(fresh.size_bucket.as_deref(), Some("51-200"));
        assert_eq!(fresh.provenance(Attribute::Size).unwrap().source_name, "professional_network");
    }

    #[test]
    fn test_fill_missing_from_skips_invalid_stored_values() {
        let mut stored = CompanyRecord::new(Some("Acme".into()), None, None);
        stored.set(Attribute::Size, "lots of people", FieldProvenance::input());
        stored.set(Attribute::Industry, "42", FieldProvenance::input());
        stored.set(Attribute::Revenue, "$55.2 million", FieldProvenance::input());

        let mut fresh = CompanyRecord::new(Some("Acme".into()), None, None);
        let filled = fresh.fill_missing_from(&stored);

        assert_eq!(filled, vec![Attribute::Revenue]);
        assert_eq!(fresh.size_bucket, None);
        assert_eq!(fresh.industry, None);
        assert_eq!(fresh.revenue_estimate.as_deref(), Some("$55.2 Million"));
    }

    #[test]
    fn test_tbd_is_a_placeholder() {
        assert!(is_placeholder("TBD "));
        assert!(is_placeholder("tba"));
        assert!(!is_placeholder("Retail"));
    }

    #[test]
    fn test_record_serializes_provenance_by_attribute_name() {
        let mut r = CompanyRecord::new(Some("Acme".into()), None, None);
        r.set(Attribute::Revenue, "$55.2 Million", FieldProvenance::new(SOURCE_MANUAL_OVERRIDE, None, Outcome::Success));
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"revenue\""));
        let back: CompanyRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
