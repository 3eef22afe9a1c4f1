//! Source adapters
//!
//! One adapter per data source. Every adapter fetches through a
//! Governor-gated, freshly fabricated client, classifies the response into
//! the outcome taxonomy and only runs extraction on a successful fetch.

pub mod directory;
pub mod network;
pub mod website;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::domain_utils::origin_of;
use crate::extraction::Page;
use crate::fabricator::RequestFabricator;
use crate::governor::SharedGovernor;
use crate::outcome::Outcome;
use crate::record::{Attribute, CompanyRecord};

pub use directory::PublicDirectoryAdapter;
pub use network::ProfessionalNetworkAdapter;
pub use website::CompanyWebsiteAdapter;

/// Data sources, declared in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    ProfessionalNetwork,
    CompanyWebsite,
    PublicDirectory,
}

impl SourceId {
    pub const PRECEDENCE: [SourceId; 3] = [
        SourceId::ProfessionalNetwork,
        SourceId::CompanyWebsite,
        SourceId::PublicDirectory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::ProfessionalNetwork => "professional_network",
            SourceId::CompanyWebsite => "company_website",
            SourceId::PublicDirectory => "public_directory",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        SourceId::PRECEDENCE
            .into_iter()
            .find(|source| source.as_str() == wanted)
            .ok_or_else(|| format!("unknown source '{}'", s))
    }
}

/// What one adapter invocation produced
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterResult {
    pub source: SourceId,
    pub outcome: Outcome,
    /// Only positively extracted, validated values
    pub fields: BTreeMap<Attribute, String>,
    pub evidence_url: Option<String>,
    /// Per requested attribute outcome
    pub field_outcomes: BTreeMap<Attribute, Outcome>,
}

impl AdapterResult {
    /// Result carrying the same outcome for every requested attribute
    pub fn failed(source: SourceId, outcome: Outcome, requested: &[Attribute], evidence_url: Option<String>) -> Self {
        Self {
            source,
            outcome,
            fields: BTreeMap::new(),
            evidence_url,
            field_outcomes: requested.iter().map(|a| (*a, outcome)).collect(),
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceId;

    /// Attributes this source can supply
    fn relevant_fields(&self) -> &'static [Attribute];

    /// Fetch and extract the requested attributes.
    ///
    /// Returns `None` without any I/O when no requested attribute is relevant
    /// or the entity has nothing this source can look up.
    async fn fetch_and_extract(&self, entity: &CompanyRecord, missing_fields: &[Attribute]) -> Option<AdapterResult>;

    /// Requested attributes this source can supply
    fn requested(&self, missing_fields: &[Attribute]) -> Vec<Attribute> {
        missing_fields
            .iter()
            .copied()
            .filter(|a| self.relevant_fields().contains(a))
            .collect()
    }
}

/// Shared fabricator and governor handed to every adapter
#[derive(Clone)]
pub struct FetchContext {
    pub fabricator: Arc<RequestFabricator>,
    pub governor: SharedGovernor,
}

/// Classified result of one HTTP fetch
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub outcome: Outcome,
    pub requested_url: String,
    pub final_url: String,
    pub status: Option<u16>,
    /// Present only when `outcome` is Success
    pub page: Option<Page>,
}

/// Body phrases served by anti-automation interstitials
const BLOCK_MARKERS: &[&str] = &[
    "verify you are human",
    "are you a robot",
    "unusual traffic from your",
    "complete the security check",
    "access denied",
    "please enable cookies",
    "captcha",
    "sign in to see",
    "join now to see",
];

/// Final URL paths that mean the source redirected to a login wall
const LOGIN_PATH_MARKERS: &[&str] = &["/authwall", "/login", "/signin", "/sign-in", "/uas/login", "/checkpoint/challenge"];

/// Interstitials are short; longer pages mentioning these words are real content
const BLOCK_PAGE_MAX_TEXT: usize = 3000;

impl FetchContext {
    pub fn new(fabricator: Arc<RequestFabricator>, governor: SharedGovernor) -> Self {
        Self { fabricator, governor }
    }

    /// One Governor-gated GET, classified and reported back to the Governor
    pub async fn fetch(&self, source: SourceId, url: &str) -> FetchedPage {
        self.governor.wait_before(source).await;

        let fetched = self.fetch_unpaced(url).await;
        debug!(
            "{} GET {} -> {} (status {:?})",
            source, url, fetched.outcome, fetched.status
        );

        self.governor.on_outcome(source, fetched.outcome).await;
        fetched
    }

    async fn fetch_unpaced(&self, url: &str) -> FetchedPage {
        let mut fetched = FetchedPage {
            outcome: Outcome::NetworkError,
            requested_url: url.to_string(),
            final_url: url.to_string(),
            status: None,
            page: None,
        };

        let client = match self.fabricator.create_client(origin_of(url).as_deref()) {
            Ok(client) => client,
            Err(e) => {
                debug!("Could not build client for {}: {:#}", url, e);
                return fetched;
            }
        };

        let response = match client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                fetched.outcome = classify_error(&e);
                return fetched;
            }
        };

        let status = response.status();
        fetched.status = Some(status.as_u16());
        fetched.final_url = response.url().to_string();

        let has_retry_after = response.headers().contains_key(RETRY_AFTER);
        if let Some(outcome) = classify_status(status, has_retry_after) {
            fetched.outcome = outcome;
            return fetched;
        }

        if is_login_redirect(&fetched.final_url, url) {
            fetched.outcome = Outcome::Blocked;
            return fetched;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                fetched.outcome = classify_error(&e);
                return fetched;
            }
        };

        let page = Page::from_html(fetched.final_url.clone(), body);
        if looks_like_block_page(&page) {
            fetched.outcome = Outcome::Blocked;
            return fetched;
        }

        fetched.outcome = Outcome::Success;
        fetched.page = Some(page);
        fetched
    }
}

/// Map a non-success HTTP status onto the taxonomy; `None` means fetch succeeded
pub fn classify_status(status: StatusCode, has_retry_after: bool) -> Option<Outcome> {
    if status.is_success() {
        return None;
    }

    let outcome = match status.as_u16() {
        429 => Outcome::RateLimited,
        503 if has_retry_after => Outcome::RateLimited,
        401 | 403 | 999 => Outcome::Blocked,
        400..=499 => Outcome::NotFound,
        _ if status.is_redirection() => Outcome::NotFound,
        _ => Outcome::NetworkError,
    };
    Some(outcome)
}

pub fn classify_error(error: &reqwest::Error) -> Outcome {
    if let Some(status) = error.status() {
        return classify_status(status, false).unwrap_or(Outcome::NetworkError);
    }
    Outcome::NetworkError
}

fn is_login_redirect(final_url: &str, requested_url: &str) -> bool {
    if final_url == requested_url {
        return false;
    }
    let path = url::Url::parse(final_url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_default();
    LOGIN_PATH_MARKERS.iter().any(|marker| path.starts_with(marker))
}

/// Short pages carrying captcha/auth-wall phrases
pub fn looks_like_block_page(page: &Page) -> bool {
    let markup = page.markup.to_lowercase();
    if markup.contains("authwall") && page.text.len() < BLOCK_PAGE_MAX_TEXT {
        return true;
    }
    if page.text.len() >= BLOCK_PAGE_MAX_TEXT {
        return false;
    }
    let text = page.text.to_lowercase();
    BLOCK_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Run the extraction chain on a fetched page for the requested attributes
pub fn extract_from_page(source: SourceId, page: &Page, requested: &[Attribute]) -> AdapterResult {
    let mut fields = BTreeMap::new();
    let mut field_outcomes = BTreeMap::new();

    for attr in requested {
        let trace = page.extract_traced(*attr);
        let outcome = if let Some(candidate) = trace.accepted {
            fields.insert(*attr, candidate.value);
            Outcome::Success
        } else if !trace.rejected.is_empty() {
            Outcome::ValidationRejected
        } else {
            Outcome::NotFound
        };
        field_outcomes.insert(*attr, outcome);
    }

    AdapterResult {
        source,
        outcome: aggregate_outcome(&field_outcomes),
        fields,
        evidence_url: Some(page.url.clone()),
        field_outcomes,
    }
}

/// Success if any field was extracted, else ValidationRejected if any
/// candidate was refused, else NotFound
pub fn aggregate_outcome(field_outcomes: &BTreeMap<Attribute, Outcome>) -> Outcome {
    if field_outcomes.values().any(|o| *o == Outcome::Success) {
        Outcome::Success
    } else if field_outcomes.values().any(|o| *o == Outcome::ValidationRejected) {
        Outcome::ValidationRejected
    } else {
        Outcome::NotFound
    }
}
