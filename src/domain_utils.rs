use url::Url;

const COMPOUND_TLDS: &[&str] = &[
    "co.uk", "co.au", "com.au", "co.nz", "co.jp", "co.kr",
    "com.br", "com.mx", "com.cn", "org.uk", "net.au",
];

/// Prefix `https://` when the value carries no scheme
pub fn ensure_scheme(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed.trim_start_matches('/'))
    }
}

/// Parse a loosely written URL ("acme.com/about", "https://acme.com")
pub fn parse_loose_url(raw: &str) -> Option<Url> {
    if raw.trim().is_empty() {
        return None;
    }
    Url::parse(&ensure_scheme(raw)).ok()
}

/// Key used for identity and override lookups.
///
/// Lowercases and strips scheme, `www.`, query, fragment and trailing slash so
/// that "https://www.Acme.com/" and "acme.com" compare equal.
pub fn normalize_identity_key(raw: &str) -> String {
    let mut key = raw.trim().to_lowercase();

    for scheme in ["https://", "http://"] {
        if let Some(rest) = key.strip_prefix(scheme) {
            key = rest.to_string();
            break;
        }
    }
    if let Some(rest) = key.strip_prefix("www.") {
        key = rest.to_string();
    }
    if let Some(idx) = key.find(|c| c == '?' || c == '#') {
        key.truncate(idx);
    }
    while key.ends_with('/') {
        key.pop();
    }

    key
}

/// Lowercased host without a leading `www.`
pub fn host_of(raw: &str) -> Option<String> {
    let url = parse_loose_url(raw)?;
    let host = url.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// `scheme://host[:port]` of a URL, used as the platform's own referrer
pub fn origin_of(raw: &str) -> Option<String> {
    let url = parse_loose_url(raw)?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

/// Registrable domain of a host (eu.acme.com -> acme.com, shop.acme.co.uk -> acme.co.uk)
pub fn extract_base_domain(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_lowercase();
    let parts: Vec<&str> = host.split('.').collect();

    if parts.len() <= 2 {
        return host;
    }

    let last_two = format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1]);
    if COMPOUND_TLDS.contains(&last_two.as_str()) {
        if parts.len() > 3 {
            format!("{}.{}", parts[parts.len() - 3], last_two)
        } else {
            host
        }
    } else {
        last_two
    }
}

/// True when `host` is `domain` or one of its subdomains
pub fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.to_lowercase();
    let domain = domain.trim().to_lowercase();
    host == domain || host.ends_with(&format!(".{}", domain))
}
