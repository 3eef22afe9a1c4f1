//! Request Fabricator
//!
//! Builds a disposable client identity for every outbound call: a user agent
//! drawn uniformly from the configured pool, a referrer present with a fixed
//! probability, and browser-like accept headers. Clients are never reused.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::config::HttpConfig;

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Headers chosen for one request
#[derive(Debug, Clone, PartialEq)]
pub struct ClientIdentity {
    pub user_agent: String,
    pub referrer: Option<String>,
    pub accept_language: String,
}

impl ClientIdentity {
    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent).context("user agent is not a valid header value")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&self.accept_language).context("accept-language is not a valid header value")?,
        );
        headers.insert(
            HeaderName::from_static("upgrade-insecure-requests"),
            HeaderValue::from_static("1"),
        );
        if let Some(referrer) = &self.referrer {
            headers.insert(
                REFERER,
                HeaderValue::from_str(referrer).context("referrer is not a valid header value")?,
            );
        }
        Ok(headers)
    }
}

pub struct RequestFabricator {
    user_agents: Vec<String>,
    search_referrers: Vec<String>,
    referrer_probability: f64,
    accept_language: String,
    timeout: Duration,
    max_redirects: usize,
    rng: Mutex<StdRng>,
}

impl RequestFabricator {
    pub fn from_config(http: &HttpConfig) -> Self {
        Self::with_rng(http, StdRng::from_entropy())
    }

    /// Deterministic fabricator for tests
    pub fn with_seed(http: &HttpConfig, seed: u64) -> Self {
        Self::with_rng(http, StdRng::seed_from_u64(seed))
    }

    fn with_rng(http: &HttpConfig, rng: StdRng) -> Self {
        Self {
            user_agents: http
                .user_agents
                .iter()
                .filter(|ua| !ua.trim().is_empty())
                .cloned()
                .collect(),
            search_referrers: http.search_referrers.clone(),
            referrer_probability: http.referrer_probability,
            accept_language: http.accept_language.clone(),
            timeout: http.request_timeout(),
            max_redirects: http.max_redirects,
            rng: Mutex::new(rng),
        }
    }

    /// Draw a fresh identity. `platform_origin` is the target's own origin,
    /// one of the referrer candidates.
    pub fn fabricate(&self, platform_origin: Option<&str>) -> ClientIdentity {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let user_agent = self
            .user_agents
            .choose(&mut *rng)
            .cloned()
            .unwrap_or_default();

        let referrer = if rng.gen_bool(self.referrer_probability) {
            let mut candidates: Vec<String> = self.search_referrers.clone();
            if let Some(origin) = platform_origin {
                candidates.push(format!("{}/", origin.trim_end_matches('/')));
            }
            candidates.choose(&mut *rng).cloned()
        } else {
            None
        };

        ClientIdentity {
            user_agent,
            referrer,
            accept_language: self.accept_language.clone(),
        }
    }

    /// Build a new client carrying a freshly fabricated identity.
    ///
    /// Connection pooling is disabled so no keep-alive session links two calls.
    pub fn create_client(&self, platform_origin: Option<&str>) -> Result<reqwest::Client> {
        let identity = self.fabricate(platform_origin);
        debug!(
            "Fabricated client: ua={:?} referrer={:?}",
            identity.user_agent, identity.referrer
        );

        reqwest::Client::builder()
            .default_headers(identity.header_map()?)
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::limited(self.max_redirects))
            .pool_max_idle_per_host(0)
            .build()
            .context("Failed to build HTTP client")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn http_config(probability: f64) -> HttpConfig {
        HttpConfig {
            user_agents: vec!["ua-one/1.0".into(), "ua-two/2.0".into(), "ua-three/3.0".into()],
            request_timeout_secs: 5,
            max_redirects: 3,
            referrer_probability: probability,
            search_referrers: vec!["https://www.google.com/".into(), "https://www.bing.com/".into()],
            accept_language: "en-US,en;q=0.9".into(),
        }
    }

    #[test]
    fn test_user_agents_drawn_from_pool() {
        let fabricator = RequestFabricator::with_seed(&http_config(0.7), 7);
        let pool: HashSet<_> = ["ua-one/1.0", "ua-two/2.0", "ua-three/3.0"].into_iter().collect();
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let id = fabricator.fabricate(None);
            assert!(pool.contains(id.user_agent.as_str()));
            seen.insert(id.user_agent);
        }
        assert_eq!(seen.len(), 3, "every agent should appear over 200 draws");
    }

    #[test]
    fn test_referrer_frequency_tracks_probability() {
        let fabricator = RequestFabricator::with_seed(&http_config(0.7), 42);
        let with_referrer = (0..2000)
            .filter(|_| fabricator.fabricate(Some("https://www.linkedin.com")).referrer.is_some())
            .count();
        let ratio = with_referrer as f64 / 2000.0;
        assert!((0.62..0.78).contains(&ratio), "ratio was {}", ratio);
    }

    #[test]
    fn test_referrer_candidates_include_platform_origin() {
        let fabricator = RequestFabricator::with_seed(&http_config(1.0), 3);
        let referrers: HashSet<_> = (0..300)
            .filter_map(|_| fabricator.fabricate(Some("https://www.linkedin.com")).referrer)
            .collect();
        assert!(referrers.contains("https://www.linkedin.com/"));
        assert!(referrers.contains("https://www.google.com/"));
        assert!(referrers.iter().all(|r| r.starts_with("https://")));
    }

    #[test]
    fn test_zero_probability_never_sets_referrer() {
        let fabricator = RequestFabricator::with_seed(&http_config(0.0), 1);
        assert!((0..100).all(|_| fabricator.fabricate(Some("https://acme.com")).referrer.is_none()));
    }

    #[test]
    fn test_header_map_has_browser_headers() {
        let id = ClientIdentity {
            user_agent: "ua-one/1.0".into(),
            referrer: Some("https://www.google.com/".into()),
            accept_language: "en-US".into(),
        };
        let headers = id.header_map().unwrap();
        assert_eq!(headers.get(USER_AGENT).unwrap(), "ua-one/1.0");
        assert_eq!(headers.get(REFERER).unwrap(), "https://www.google.com/");
        assert!(headers.get(ACCEPT).unwrap().to_str().unwrap().starts_with("text/html"));
    }

    #[test]
    fn test_create_client_builds() {
        let fabricator = RequestFabricator::with_seed(&http_config(0.7), 11);
        assert!(fabricator.create_client(Some("https://acme.com")).is_ok());
    }
}
