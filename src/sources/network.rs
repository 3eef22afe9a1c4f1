//! Professional-network company profile adapter

use async_trait::async_trait;
use tracing::debug;

use super::{extract_from_page, AdapterResult, FetchContext, SourceAdapter, SourceId};
use crate::domain_utils::{ensure_scheme, parse_loose_url};
use crate::outcome::Outcome;
use crate::record::{Attribute, CompanyRecord};

const FIELDS: &[Attribute] = &[Attribute::Size, Attribute::Industry];

/// Reads size and industry from the entity's profile page
pub struct ProfessionalNetworkAdapter {
    ctx: FetchContext,
}

impl ProfessionalNetworkAdapter {
    pub fn new(ctx: FetchContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl SourceAdapter for ProfessionalNetworkAdapter {
    fn source(&self) -> SourceId {
        SourceId::ProfessionalNetwork
    }

    fn relevant_fields(&self) -> &'static [Attribute] {
        FIELDS
    }

    async fn fetch_and_extract(&self, entity: &CompanyRecord, missing_fields: &[Attribute]) -> Option<AdapterResult> {
        let requested = self.requested(missing_fields);
        if requested.is_empty() {
            return None;
        }

        let profile = entity.network_profile_url.as_deref()?;
        let url = parse_loose_url(profile)
            .map(|u| u.to_string())
            .unwrap_or_else(|| ensure_scheme(profile));

        let fetched = self.ctx.fetch(self.source(), &url).await;
        let Some(page) = fetched.page.as_ref().filter(|_| fetched.outcome == Outcome::Success) else {
            debug!("Profile fetch for {} ended with {}", entity.identity, fetched.outcome);
            return Some(AdapterResult::failed(
                self.source(),
                fetched.outcome,
                &requested,
                Some(fetched.final_url),
            ));
        };

        Some(extract_from_page(self.source(), page, &requested))
    }
}
