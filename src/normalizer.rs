//! Canonical Schema Normalizer
//!
//! Maps the many historical spellings of input headers onto one canonical
//! column set. Aliases carry a tier; when several alias columns for the same
//! canonical key are present, the highest-tier non-empty column wins and its
//! siblings never reach the output.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{AliasConfig, SchemaConfig};
use crate::extraction::validate;
use crate::outcome::Outcome;
use crate::record::{is_placeholder, Attribute, CompanyRecord, FieldProvenance, ProcessingStatus, SOURCE_INPUT};
use crate::sources::SourceId;

pub const SKIPPED_SOURCES_COLUMN: &str = "skipped_sources";
pub const PROCESSING_STATUS_COLUMN: &str = "processing_status";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("Input has no company name column (headers: {headers}). Expected one of: {expected}")]
    MissingNameColumn { headers: String, expected: String },

    #[error("Input has no header row")]
    NoHeaders,
}

/// Alias precedence, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AliasTier {
    Legacy,
    Standardized,
    Enhanced,
}

impl AliasTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AliasTier::Legacy => "legacy",
            AliasTier::Standardized => "standardized",
            AliasTier::Enhanced => "enhanced",
        }
    }
}

impl fmt::Display for AliasTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AliasTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Ok(AliasTier::Legacy),
            "standardized" | "standardised" | "standard" => Ok(AliasTier::Standardized),
            "enhanced" => Ok(AliasTier::Enhanced),
            other => Err(format!("unknown alias tier '{}'", other)),
        }
    }
}

/// Canonical input/output columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalKey {
    Name,
    WebsiteUrl,
    NetworkProfileUrl,
    SizeBucket,
    Industry,
    RevenueEstimate,
}

impl CanonicalKey {
    pub const ALL: [CanonicalKey; 6] = [
        CanonicalKey::Name,
        CanonicalKey::WebsiteUrl,
        CanonicalKey::NetworkProfileUrl,
        CanonicalKey::SizeBucket,
        CanonicalKey::Industry,
        CanonicalKey::RevenueEstimate,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            CanonicalKey::Name => "name",
            CanonicalKey::WebsiteUrl => "website_url",
            CanonicalKey::NetworkProfileUrl => "network_profile_url",
            CanonicalKey::SizeBucket => Attribute::Size.column(),
            CanonicalKey::Industry => Attribute::Industry.column(),
            CanonicalKey::RevenueEstimate => Attribute::Revenue.column(),
        }
    }

    pub fn from_column(column: &str) -> Option<Self> {
        let wanted = column.trim().to_lowercase();
        Self::ALL.into_iter().find(|key| key.column() == wanted)
    }

    /// The enrichable attribute behind this column, if any
    pub fn attribute(&self) -> Option<Attribute> {
        match self {
            CanonicalKey::SizeBucket => Some(Attribute::Size),
            CanonicalKey::Industry => Some(Attribute::Industry),
            CanonicalKey::RevenueEstimate => Some(Attribute::Revenue),
            _ => None,
        }
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// Built-in header spellings seen across historical exports
const BUILTIN_ALIASES: &[(CanonicalKey, &str, AliasTier)] = &[
    (CanonicalKey::Name, "name", AliasTier::Standardized),
    (CanonicalKey::Name, "company_name", AliasTier::Standardized),
    (CanonicalKey::Name, "enhanced_company_name", AliasTier::Enhanced),
    (CanonicalKey::Name, "company", AliasTier::Legacy),
    (CanonicalKey::Name, "organization", AliasTier::Legacy),
    (CanonicalKey::Name, "organisation", AliasTier::Legacy),
    (CanonicalKey::Name, "account name", AliasTier::Legacy),
    (CanonicalKey::Name, "business name", AliasTier::Legacy),
    (CanonicalKey::WebsiteUrl, "website_url", AliasTier::Standardized),
    (CanonicalKey::WebsiteUrl, "enhanced_website", AliasTier::Enhanced),
    (CanonicalKey::WebsiteUrl, "website", AliasTier::Legacy),
    (CanonicalKey::WebsiteUrl, "company website", AliasTier::Legacy),
    (CanonicalKey::WebsiteUrl, "url", AliasTier::Legacy),
    (CanonicalKey::WebsiteUrl, "domain", AliasTier::Legacy),
    (CanonicalKey::WebsiteUrl, "homepage", AliasTier::Legacy),
    (CanonicalKey::NetworkProfileUrl, "network_profile_url", AliasTier::Standardized),
    (CanonicalKey::NetworkProfileUrl, "enhanced_linkedin_url", AliasTier::Enhanced),
    (CanonicalKey::NetworkProfileUrl, "linkedin_url", AliasTier::Legacy),
    (CanonicalKey::NetworkProfileUrl, "linkedin", AliasTier::Legacy),
    (CanonicalKey::NetworkProfileUrl, "company linkedin url", AliasTier::Legacy),
    (CanonicalKey::NetworkProfileUrl, "linkedin profile", AliasTier::Legacy),
    (CanonicalKey::NetworkProfileUrl, "profile url", AliasTier::Legacy),
    (CanonicalKey::SizeBucket, "size_bucket", AliasTier::Standardized),
    (CanonicalKey::SizeBucket, "company_size", AliasTier::Standardized),
    (CanonicalKey::SizeBucket, "enhanced_company_size", AliasTier::Enhanced),
    (CanonicalKey::SizeBucket, "enhanced_size_bucket", AliasTier::Enhanced),
    (CanonicalKey::SizeBucket, "size", AliasTier::Legacy),
    (CanonicalKey::SizeBucket, "employees", AliasTier::Legacy),
    (CanonicalKey::SizeBucket, "employee count", AliasTier::Legacy),
    (CanonicalKey::SizeBucket, "headcount", AliasTier::Legacy),
    (CanonicalKey::SizeBucket, "linkedin company size", AliasTier::Legacy),
    (CanonicalKey::Industry, "industry", AliasTier::Standardized),
    (CanonicalKey::Industry, "enhanced_industry", AliasTier::Enhanced),
    (CanonicalKey::Industry, "sector", AliasTier::Legacy),
    (CanonicalKey::Industry, "company industry", AliasTier::Legacy),
    (CanonicalKey::Industry, "linkedin industry", AliasTier::Legacy),
    (CanonicalKey::RevenueEstimate, "revenue_estimate", AliasTier::Standardized),
    (CanonicalKey::RevenueEstimate, "enhanced_revenue", AliasTier::Enhanced),
    (CanonicalKey::RevenueEstimate, "enhanced_revenue_estimate", AliasTier::Enhanced),
    (CanonicalKey::RevenueEstimate, "revenue", AliasTier::Legacy),
    (CanonicalKey::RevenueEstimate, "annual revenue", AliasTier::Legacy),
    (CanonicalKey::RevenueEstimate, "estimated revenue", AliasTier::Legacy),
    (CanonicalKey::RevenueEstimate, "revenue range", AliasTier::Legacy),
];

/// Lowercase and drop separators so "Company Size", "company_size" and
/// "company-size" compare equal
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Which part of the provenance summary a column carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvenancePart {
    SourceName,
    SourceUrl,
    Outcome,
}

/// How one input header is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderRole {
    Alias(CanonicalKey, AliasTier),
    Provenance(Attribute, ProvenancePart),
    SkippedSources,
    ProcessingStatus,
    Passthrough,
}

impl fmt::Display for HeaderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderRole::Alias(key, tier) => write!(f, "{} ({})", key, tier),
            HeaderRole::Provenance(attr, part) => {
                let suffix = match part {
                    ProvenancePart::SourceName => "source",
                    ProvenancePart::SourceUrl => "source_url",
                    ProvenancePart::Outcome => "outcome",
                };
                write!(f, "{}_{} (provenance)", attr.column(), suffix)
            }
            HeaderRole::SkippedSources => write!(f, "{}", SKIPPED_SOURCES_COLUMN),
            HeaderRole::ProcessingStatus => write!(f, "{}", PROCESSING_STATUS_COLUMN),
            HeaderRole::Passthrough => write!(f, "passthrough"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMapping {
    pub header: String,
    pub role: HeaderRole,
    /// A higher-tier (or earlier same-tier) column supplies this key
    pub shadowed: bool,
}

/// Alias lookup table keyed by normalized header
#[derive(Debug, Clone)]
pub struct AliasTable {
    entries: HashMap<String, (CanonicalKey, AliasTier)>,
}

impl AliasTable {
    pub fn builtin() -> Self {
        let entries = BUILTIN_ALIASES
            .iter()
            .map(|(key, header, tier)| (normalize_header(header), (*key, *tier)))
            .collect();
        Self { entries }
    }

    /// Built-in table plus configured extras; extras replace built-ins with the same spelling
    pub fn with_extras(extras: &[AliasConfig]) -> Self {
        let mut table = Self::builtin();
        for alias in extras {
            let (Some(key), Ok(tier)) = (CanonicalKey::from_column(&alias.canonical), alias.tier.parse::<AliasTier>())
            else {
                warn!("Ignoring alias '{}' -> '{}' ({})", alias.header, alias.canonical, alias.tier);
                continue;
            };
            table.entries.insert(normalize_header(&alias.header), (key, tier));
        }
        table
    }

    pub fn resolve(&self, header: &str) -> Option<(CanonicalKey, AliasTier)> {
        self.entries.get(&normalize_header(header)).copied()
    }

    /// Known spellings for a canonical key, for error messages
    pub fn spellings(&self, key: CanonicalKey) -> Vec<String> {
        let mut spellings: Vec<String> = BUILTIN_ALIASES
            .iter()
            .filter(|(k, _, _)| *k == key)
            .map(|(_, header, _)| header.to_string())
            .collect();
        spellings.dedup();
        spellings
    }
}

pub struct SchemaNormalizer {
    aliases: AliasTable,
}

impl Default for SchemaNormalizer {
    fn default() -> Self {
        Self::new(AliasTable::builtin())
    }
}

impl SchemaNormalizer {
    pub fn new(aliases: AliasTable) -> Self {
        Self { aliases }
    }

    pub fn from_config(schema: &SchemaConfig) -> Self {
        Self::new(AliasTable::with_extras(&schema.aliases))
    }

    pub fn classify(&self, header: &str) -> HeaderRole {
        let normalized = normalize_header(header);

        for attr in Attribute::ALL {
            let base = normalize_header(attr.column());
            let part = match normalized.strip_prefix(&base) {
                Some("source") => Some(ProvenancePart::SourceName),
                Some("sourceurl") => Some(ProvenancePart::SourceUrl),
                Some("outcome") => Some(ProvenancePart::Outcome),
                _ => None,
            };
            if let Some(part) = part {
                return HeaderRole::Provenance(attr, part);
            }
        }
        if normalized == normalize_header(SKIPPED_SOURCES_COLUMN) {
            return HeaderRole::SkippedSources;
        }
        if normalized == normalize_header(PROCESSING_STATUS_COLUMN) {
            return HeaderRole::ProcessingStatus;
        }

        match self.aliases.resolve(header) {
            Some((key, tier)) => HeaderRole::Alias(key, tier),
            None => HeaderRole::Passthrough,
        }
    }

    /// Fail fast when the input cannot yield a company name
    pub fn validate_headers(&self, headers: &[String]) -> Result<(), NormalizeError> {
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(NormalizeError::NoHeaders);
        }

        let has_name = headers
            .iter()
            .any(|h| matches!(self.classify(h), HeaderRole::Alias(CanonicalKey::Name, _)));
        if !has_name {
            return Err(NormalizeError::MissingNameColumn {
                headers: headers.join(", "),
                expected: self.aliases.spellings(CanonicalKey::Name).join(", "),
            });
        }
        Ok(())
    }

    /// Header-level view of a mapping: which alias column would win for each
    /// canonical key when every cell is filled
    pub fn describe_headers(&self, headers: &[String]) -> Vec<HeaderMapping> {
        let roles: Vec<HeaderRole> = headers.iter().map(|h| self.classify(h)).collect();
        let mut best: HashMap<CanonicalKey, (AliasTier, usize)> = HashMap::new();
        for (i, role) in roles.iter().enumerate() {
            if let HeaderRole::Alias(key, tier) = role {
                let replace = best.get(key).map(|(t, _)| tier > t).unwrap_or(true);
                if replace {
                    best.insert(*key, (*tier, i));
                }
            }
        }

        headers
            .iter()
            .zip(roles)
            .enumerate()
            .map(|(i, (header, role))| {
                let shadowed = match role {
                    HeaderRole::Alias(key, _) => best.get(&key).map(|(_, winner)| *winner != i).unwrap_or(false),
                    _ => false,
                };
                HeaderMapping {
                    header: header.clone(),
                    role,
                    shadowed,
                }
            })
            .collect()
    }

    /// Build a record from one input row of `(header, value)` pairs
    pub fn normalize_in(&self, row: &[(String, String)]) -> CompanyRecord {
        let mut winners: HashMap<CanonicalKey, (AliasTier, String)> = HashMap::new();
        let mut rejected: HashSet<Attribute> = HashSet::new();
        let mut provenance: HashMap<Attribute, (Option<String>, Option<String>, Option<String>)> = HashMap::new();
        let mut skipped_sources = Vec::new();
        let mut status = None;
        let mut passthrough = Vec::new();

        for (header, raw) in row {
            let value = raw.trim();
            match self.classify(header) {
                HeaderRole::Alias(key, tier) => {
                    if value.is_empty() || is_placeholder(value) {
                        continue;
                    }
                    // attribute cells hold the cleaned value; an invalid cell counts as empty
                    let value = match key.attribute() {
                        Some(attr) => match validate::validate(attr, value) {
                            Ok(cleaned) => cleaned,
                            Err(rejection) => {
                                debug!("Ignoring input {} in column '{}': {}", attr, header, rejection);
                                rejected.insert(attr);
                                continue;
                            }
                        },
                        None => value.to_string(),
                    };
                    // highest tier wins, first column wins ties
                    let replace = winners.get(&key).map(|(t, _)| tier > *t).unwrap_or(true);
                    if replace {
                        winners.insert(key, (tier, value));
                    }
                }
                HeaderRole::Provenance(attr, part) => {
                    let value = Some(value.to_string()).filter(|v| !v.is_empty());
                    let entry = provenance.entry(attr).or_default();
                    match part {
                        ProvenancePart::SourceName => entry.0 = value,
                        ProvenancePart::SourceUrl => entry.1 = value,
                        ProvenancePart::Outcome => entry.2 = value,
                    }
                }
                HeaderRole::SkippedSources => {
                    skipped_sources = value
                        .split(';')
                        .filter_map(|s| s.trim().parse::<SourceId>().ok())
                        .collect();
                }
                HeaderRole::ProcessingStatus => status = ProcessingStatus::parse(value),
                HeaderRole::Passthrough => passthrough.push((header.clone(), raw.clone())),
            }
        }

        let mut take = |key: CanonicalKey| winners.remove(&key).map(|(_, v)| v);
        let mut record = CompanyRecord::new(
            take(CanonicalKey::Name),
            take(CanonicalKey::WebsiteUrl),
            take(CanonicalKey::NetworkProfileUrl),
        );

        for key in [CanonicalKey::SizeBucket, CanonicalKey::Industry, CanonicalKey::RevenueEstimate] {
            let Some(attr) = key.attribute() else {
                continue;
            };
            let Some(value) = take(key) else {
                if rejected.contains(&attr) {
                    provenance.remove(&attr);
                    record.note_attempt(attr, FieldProvenance::new(SOURCE_INPUT, None, Outcome::ValidationRejected));
                }
                continue;
            };
            let prov = match provenance.remove(&attr) {
                Some((Some(source), url, outcome)) => FieldProvenance::new(
                    source,
                    url,
                    outcome.and_then(|o| o.parse().ok()).unwrap_or(Outcome::Success),
                ),
                _ => FieldProvenance::input(),
            };
            record.set(attr, value, prov);
        }

        // provenance of fields still empty (e.g. "blocked") survives a round trip
        for (attr, (source, url, outcome)) in provenance {
            if let (Some(source), Some(outcome)) = (source, outcome.and_then(|o| o.parse::<Outcome>().ok())) {
                record.note_attempt(attr, FieldProvenance::new(source, url, outcome));
            }
        }

        record.skipped_sources = skipped_sources;
        record.passthrough = passthrough;
        if let Some(status) = status {
            record.processing_status = status;
        }

        debug!(
            "Normalized row into '{}' (missing: {:?})",
            record.identity,
            record.missing_fields()
        );
        record
    }

    /// Flatten a record into output columns; every canonical column is present
    pub fn normalize_out(&self, record: &CompanyRecord) -> Vec<(String, String)> {
        let mut row: Vec<(String, String)> = record.passthrough.clone();
        let text = |v: &Option<String>| v.clone().unwrap_or_default();

        row.push((CanonicalKey::Name.column().to_string(), text(&record.name)));
        row.push((CanonicalKey::WebsiteUrl.column().to_string(), text(&record.website_url)));
        row.push((
            CanonicalKey::NetworkProfileUrl.column().to_string(),
            text(&record.network_profile_url),
        ));
        for attr in Attribute::ALL {
            row.push((attr.column().to_string(), record.get(attr).unwrap_or_default().to_string()));
        }
        for attr in Attribute::ALL {
            let prov = record.provenance(attr);
            row.push((
                format!("{}_source", attr.column()),
                prov.map(|p| p.source_name.clone()).unwrap_or_default(),
            ));
            row.push((
                format!("{}_source_url", attr.column()),
                prov.and_then(|p| p.source_url.clone()).unwrap_or_default(),
            ));
            row.push((
                format!("{}_outcome", attr.column()),
                prov.map(|p| p.outcome.to_string()).unwrap_or_default(),
            ));
        }
        row.push((
            SKIPPED_SOURCES_COLUMN.to_string(),
            record
                .skipped_sources
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(";"),
        ));
        row.push((
            PROCESSING_STATUS_COLUMN.to_string(),
            record.processing_status.to_string(),
        ));
        row
    }

    /// Output header set after the passthrough columns
    pub fn output_headers() -> Vec<String> {
        let mut headers: Vec<String> = CanonicalKey::ALL.iter().map(|k| k.column().to_string()).collect();
        for attr in Attribute::ALL {
            headers.push(format!("{}_source", attr.column()));
            headers.push(format!("{}_source_url", attr.column()));
            headers.push(format!("{}_outcome", attr.column()));
        }
        headers.push(SKIPPED_SOURCES_COLUMN.to_string());
        headers.push(PROCESSING_STATUS_COLUMN.to_string());
        headers
    }
}
