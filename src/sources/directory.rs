//! Public business-directory adapter
//!
//! Runs a web search for the company, follows the first result hosted on a
//! known directory domain and extracts from that listing page.

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::{extract_from_page, AdapterResult, FetchContext, SourceAdapter, SourceId};
use crate::config::DirectorySourceConfig;
use crate::domain_utils::{host_matches, host_of};
use crate::outcome::Outcome;
use crate::record::{Attribute, CompanyRecord};

const FIELDS: &[Attribute] = &[Attribute::Size, Attribute::Industry, Attribute::Revenue];

pub struct PublicDirectoryAdapter {
    ctx: FetchContext,
    config: DirectorySourceConfig,
}

impl PublicDirectoryAdapter {
    pub fn new(ctx: FetchContext, config: DirectorySourceConfig) -> Self {
        Self { ctx, config }
    }

    /// Search terms for an entity: its name, else its website host
    pub fn search_terms(&self, entity: &CompanyRecord) -> Option<String> {
        let subject = entity
            .name
            .clone()
            .or_else(|| entity.website_url.as_deref().and_then(host_of))?;
        let suffix = self.config.query_suffix.trim();
        Some(if suffix.is_empty() {
            subject
        } else {
            format!("{} {}", subject, suffix)
        })
    }

    pub fn search_url(&self, terms: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(terms.as_bytes()).collect();
        self.config.search_url_template.replace("{query}", &encoded)
    }

    /// First result link pointing at a configured directory domain
    pub fn find_listing(&self, search_url: &str, markup: &str) -> Option<String> {
        let base = Url::parse(search_url).ok()?;
        let document = Html::parse_document(markup);
        let links = Selector::parse("a[href]").ok()?;

        document
            .select(&links)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| resolve_result_link(&base, href))
            .find(|url| {
                url.host_str()
                    .map(|host| {
                        self.config
                            .directory_domains
                            .iter()
                            .any(|domain| host_matches(host, domain))
                    })
                    .unwrap_or(false)
                    && url.as_str() != base.as_str()
            })
            .map(|url| url.to_string())
    }
}

/// Resolve a result href, unwrapping redirect links that carry the target
/// in a `uddg` or `u` query parameter
fn resolve_result_link(base: &Url, href: &str) -> Option<Url> {
    let url = base.join(href).ok()?;
    let wrapped = url
        .query_pairs()
        .find(|(key, _)| key == "uddg" || key == "u")
        .map(|(_, value)| value.into_owned());

    match wrapped {
        Some(target) if target.starts_with("http") => Url::parse(&target).ok(),
        _ => Some(url),
    }
}

#[async_trait]
impl SourceAdapter for PublicDirectoryAdapter {
    fn source(&self) -> SourceId {
        SourceId::PublicDirectory
    }

    fn relevant_fields(&self) -> &'static [Attribute] {
        FIELDS
    }

    async fn fetch_and_extract(&self, entity: &CompanyRecord, missing_fields: &[Attribute]) -> Option<AdapterResult> {
        let requested = self.requested(missing_fields);
        if requested.is_empty() {
            return None;
        }

        let terms = self.search_terms(entity)?;
        let search_url = self.search_url(&terms);

        let search = self.ctx.fetch(self.source(), &search_url).await;
        let Some(results) = search.page.as_ref().filter(|_| search.outcome == Outcome::Success) else {
            return Some(AdapterResult::failed(
                self.source(),
                search.outcome,
                &requested,
                Some(search.final_url),
            ));
        };

        let Some(listing_url) = self.find_listing(&search_url, &results.markup) else {
            debug!("No directory listing in search results for '{}'", terms);
            return Some(AdapterResult::failed(
                self.source(),
                Outcome::NotFound,
                &requested,
                Some(search_url),
            ));
        };

        let listing = self.ctx.fetch(self.source(), &listing_url).await;
        let Some(page) = listing.page.as_ref().filter(|_| listing.outcome == Outcome::Success) else {
            return Some(AdapterResult::failed(
                self.source(),
                listing.outcome,
                &requested,
                Some(listing.final_url),
            ));
        };

        Some(extract_from_page(self.source(), page, &requested))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::fabricator::RequestFabricator;
    use crate::governor::{RecordingSleeper, SharedGovernor};
    use std::sync::Arc;

    fn adapter() -> PublicDirectoryAdapter {
        let config = AppConfig::from_toml_str(crate::config::DEFAULT_CONFIG).unwrap();
        let ctx = FetchContext::new(
            Arc::new(RequestFabricator::with_seed(&config.http, 1)),
            SharedGovernor::with_sleeper(&config.throttle, Arc::new(RecordingSleeper::new()), 1),
        );
        PublicDirectoryAdapter::new(ctx, config.sources.public_directory)
    }

    #[test]
    fn test_search_url_encodes_terms() {
        let a = adapter();
        let entity = CompanyRecord::new(Some("Acme & Sons".into()), None, None);
        let terms = a.search_terms(&entity).unwrap();
        assert_eq!(terms, "Acme & Sons company revenue employees");
        assert_eq!(
            a.search_url(&terms),
            "https://html.duckduckgo.com/html/?q=Acme+%26+Sons+company+revenue+employees"
        );
    }

    #[test]
    fn test_search_terms_fall_back_to_website_host() {
        let a = adapter();
        let entity = CompanyRecord::new(None, Some("https://www.acme.com/".into()), None);
        assert_eq!(a.search_terms(&entity).unwrap(), "acme.com company revenue employees");
    }

    #[test]
    fn test_find_listing_unwraps_redirect_links() {
        let a = adapter();
        let markup = r#"<html><body>
            <a href="https://example.org/acme">Acme blog</a>
            <a href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.zoominfo.com%2Fc%2Facme%2F123&rut=x">Acme | ZoomInfo</a>
            <a href="https://www.crunchbase.com/organization/acme">Acme | Crunchbase</a>
        </body></html>"#;
        assert_eq!(
            a.find_listing("https://html.duckduckgo.com/html/?q=acme", markup).as_deref(),
            Some("https://www.zoominfo.com/c/acme/123")
        );
    }

    #[test]
    fn test_find_listing_none_when_no_directory_hit() {
        let a = adapter();
        let markup = r#"<a href="https://example.org/acme">Acme</a>"#;
        assert!(a.find_listing("https://html.duckduckgo.com/html/?q=acme", markup).is_none());
    }
}
