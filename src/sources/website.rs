//! Company website adapter
//!
//! Walks the configured sub-paths (about, company, careers, ...) of the
//! entity's own website in order and stops at the first page yielding any
//! requested attribute. A hostile or network outcome ends the walk at once.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

use super::{aggregate_outcome, extract_from_page, AdapterResult, FetchContext, SourceAdapter, SourceId};
use crate::domain_utils::parse_loose_url;
use crate::outcome::Outcome;
use crate::record::{Attribute, CompanyRecord};

const FIELDS: &[Attribute] = &[Attribute::Size, Attribute::Industry, Attribute::Revenue];

pub struct CompanyWebsiteAdapter {
    ctx: FetchContext,
    sub_paths: Vec<String>,
}

impl CompanyWebsiteAdapter {
    pub fn new(ctx: FetchContext, sub_paths: Vec<String>) -> Self {
        Self { ctx, sub_paths }
    }

    /// Candidate page URLs, deduplicated, in configured order
    pub fn candidate_urls(&self, website: &Url) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for path in &self.sub_paths {
            let Ok(joined) = website.join(path) else {
                continue;
            };
            let joined = joined.to_string();
            if !urls.contains(&joined) {
                urls.push(joined);
            }
        }
        urls
    }
}

#[async_trait]
impl SourceAdapter for CompanyWebsiteAdapter {
    fn source(&self) -> SourceId {
        SourceId::CompanyWebsite
    }

    fn relevant_fields(&self) -> &'static [Attribute] {
        FIELDS
    }

    async fn fetch_and_extract(&self, entity: &CompanyRecord, missing_fields: &[Attribute]) -> Option<AdapterResult> {
        let requested = self.requested(missing_fields);
        if requested.is_empty() {
            return None;
        }

        let website = parse_loose_url(entity.website_url.as_deref()?)?;
        let urls = self.candidate_urls(&website);
        if urls.is_empty() {
            return None;
        }

        let mut field_outcomes: BTreeMap<Attribute, Outcome> =
            requested.iter().map(|a| (*a, Outcome::NotFound)).collect();

        for url in urls {
            let fetched = self.ctx.fetch(self.source(), &url).await;

            match fetched.outcome {
                Outcome::Success => {}
                Outcome::NotFound => continue,
                hostile_or_transient => {
                    debug!(
                        "Stopping website walk for {} at {}: {}",
                        entity.identity, url, hostile_or_transient
                    );
                    return Some(AdapterResult::failed(
                        self.source(),
                        hostile_or_transient,
                        &requested,
                        Some(fetched.final_url),
                    ));
                }
            }

            let Some(page) = fetched.page.as_ref() else {
                continue;
            };
            let result = extract_from_page(self.source(), page, &requested);
            if !result.fields.is_empty() {
                return Some(result);
            }
            for (attr, outcome) in result.field_outcomes {
                // a rejection on one page outranks a plain miss on another
                if outcome == Outcome::ValidationRejected {
                    field_outcomes.insert(attr, outcome);
                }
            }
        }

        Some(AdapterResult {
            source: self.source(),
            outcome: aggregate_outcome(&field_outcomes),
            fields: BTreeMap::new(),
            evidence_url: Some(website.to_string()),
            field_outcomes,
        })
    }
}
