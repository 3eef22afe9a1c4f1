//! Attribute-specific extraction procedures
//!
//! Each function returns the raw candidate text for one strategy, or `None`
//! when the strategy found nothing. Validation happens in the chain.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use super::element_text;
use super::validate::{canonical_size_bucket, humanize_amount, parse_headcount, title_case, validate_revenue};
use crate::record::Attribute;

const SIZE_LABELS: &[&str] = &[
    "company size", "number of employees", "employee count", "employees count",
    "company headcount", "headcount", "team size", "size",
];
const INDUSTRY_LABELS: &[&str] = &["industry", "industries", "sector"];
const REVENUE_LABELS: &[&str] = &[
    "annual revenue", "estimated revenue", "revenue range", "revenue", "annual sales", "turnover",
];
/// Labels of neighbouring profile facts; a captured value stops at these
const OTHER_LABELS: &[&str] = &[
    "headquarters", "founded", "company type", "type", "specialties", "website", "phone",
    "locations", "location", "ownership", "funding", "followers", "ceo", "stock symbol",
];

/// Industry names published verbatim by professional networks
const CANONICAL_INDUSTRIES: &[&str] = &[
    "Accounting", "Airlines and Aviation", "Apparel & Fashion", "Automotive", "Banking",
    "Biotechnology", "Broadcast Media", "Building Materials", "Chemicals", "Civil Engineering",
    "Computer & Network Security", "Computer Software", "Construction", "Consumer Electronics",
    "Consumer Goods", "Defense & Space", "E-Learning", "Education Management",
    "Electrical/Electronic Manufacturing", "Entertainment", "Environmental Services",
    "Financial Services", "Food & Beverages", "Government Administration",
    "Health, Wellness and Fitness", "Higher Education", "Hospital & Health Care", "Hospitality",
    "Human Resources", "Information Technology and Services", "Insurance", "Internet",
    "Investment Banking", "Investment Management", "Legal Services",
    "Logistics and Supply Chain", "Machinery", "Management Consulting",
    "Marketing and Advertising", "Mechanical or Industrial Engineering", "Media Production",
    "Medical Devices", "Mining & Metals", "Non-profit Organization Management", "Oil & Energy",
    "Pharmaceuticals", "Real Estate", "Renewables & Environment", "Retail", "Semiconductors",
    "Software Development", "Staffing and Recruiting", "Telecommunications",
    "Transportation/Trucking/Railroad", "Utilities", "Venture Capital & Private Equity",
    "Wholesale",
];

/// Revenue bands as directory sites print them
const REVENUE_BANDS: &[&str] = &[
    "$1M-$10M", "$10M-$50M", "$50M-$100M", "$100M-$250M", "$250M-$500M", "$500M-$1B",
    "$1B-$10B",
];

const NUMBER: &str = r"(\d{1,3}(?:,\d{3})+|\d+)";
const HEDGE: &str = r"(?:over |more than |about |around |approximately |nearly |almost |roughly )?";
const AMOUNT: &str = r"(?:[$€£¥]\s?\d[\d,]*(?:\.\d+)?(?:\s?(?:million|billion|thousand|mn|bn|[mbk]))?\b|\d[\d,]*(?:\.\d+)?\s(?:million|billion|thousand)\b)";

static SIZE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b{n}\s*(?:-|–|—|to)\s*{n}(\s+employees)?",
        n = NUMBER
    ))
    .unwrap()
});

static SIZE_PLUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\b{}\s*\+(\s+employees)?", NUMBER)).unwrap());

/// Words that make a bare range read as a headcount
static SIZE_CONTEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:employees?|staff|headcount|size|people|workforce|team members)\b").unwrap()
});

const SIZE_CONTEXT_BEFORE: usize = 40;
const SIZE_CONTEXT_AFTER: usize = 20;

static REVENUE_BAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([$€£])\s?(\d+(?:\.\d+)?)\s?([kmb])\s*(?:-|–|to)\s*[$€£]?\s?(\d+(?:\.\d+)?)\s?([kmb])\b").unwrap()
});

static REVENUE_OPEN_BAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:less than|under|<)\s*\$1\s?m\b|\$10\s?b\s?\+").unwrap()
});

static SIZE_LABEL: Lazy<Regex> = Lazy::new(|| label_regex(SIZE_LABELS));
static INDUSTRY_LABEL: Lazy<Regex> = Lazy::new(|| label_regex(INDUSTRY_LABELS));
static REVENUE_LABEL: Lazy<Regex> = Lazy::new(|| label_regex(REVENUE_LABELS));

static SIZE_STOP: Lazy<Regex> = Lazy::new(|| stop_regex(&[INDUSTRY_LABELS, REVENUE_LABELS, OTHER_LABELS]));
static INDUSTRY_STOP: Lazy<Regex> = Lazy::new(|| stop_regex(&[SIZE_LABELS, REVENUE_LABELS, OTHER_LABELS]));
static REVENUE_STOP: Lazy<Regex> = Lazy::new(|| stop_regex(&[SIZE_LABELS, INDUSTRY_LABELS, OTHER_LABELS]));

static ANY_LABEL_LINE: Lazy<Regex> = Lazy::new(|| {
    let all: Vec<&str> = [SIZE_LABELS, INDUSTRY_LABELS, REVENUE_LABELS, OTHER_LABELS].concat();
    label_regex(&all)
});

static SIZE_KEYWORDS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(&format!(r"(?i)\b(?:team|staff|workforce) of {}{}\+?", HEDGE, NUMBER)).unwrap(),
        Regex::new(&format!(
            r"(?i)\b{}{}\+?\s+(?:full[- ]time\s+)?(?:employees|staff members|team members|staff|workers)\b",
            HEDGE, NUMBER
        ))
        .unwrap(),
        Regex::new(&format!(r"(?i)\bemploys\s+{}{}", HEDGE, NUMBER)).unwrap(),
    ]
});

static INDUSTRY_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:in|within|across|serving) the ([a-z][a-z&/,\- ]{2,60}?) (?:industry|sector|market|space)\b").unwrap()
});

static REVENUE_AFTER_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:revenues?|sales|turnover)\b[^.\n]{{0,40}}?({})",
        AMOUNT
    ))
    .unwrap()
});

static REVENUE_BEFORE_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)({})\s+(?:in\s+)?(?:annual\s+|yearly\s+)?(?:revenues?|sales|turnover)\b",
        AMOUNT
    ))
    .unwrap()
});

static SECTION_SIZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b{}\+?\s+(?:[a-z\-]+\s+){{0,3}}(?:people|employees|colleagues|team members|professionals|engineers|experts|associates|staff|teammates)\b",
        NUMBER
    ))
    .unwrap()
});

static SECTION_INDUSTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:we are|we're|is) an? (?:(?:leading|global|innovative|independent|trusted|fast-growing|privately held|family-owned|international)\s+)*([a-z][a-z&\- ]{2,40}?) (?:company|firm|provider|business|group|manufacturer|agency)\b").unwrap()
});

static SECTION_REVENUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([$€£¥]\s?\d[\d,]*(?:\.\d+)?\s?(?:million|billion|thousand|mn|bn|[mbk])\b)").unwrap()
});

const SECTION_HINTS: &[&str] = &[
    "about", "company", "team", "careers", "jobs", "who-we-are", "our-story", "overview", "facts",
];

fn alternation(labels: &[&str]) -> String {
    let mut sorted: Vec<&str> = labels.to_vec();
    sorted.sort_by_key(|l| std::cmp::Reverse(l.len()));
    sorted
        .iter()
        .map(|l| regex::escape(l))
        .collect::<Vec<_>>()
        .join("|")
}

fn label_regex(labels: &[&str]) -> Regex {
    Regex::new(&format!(r"(?i)^\s*(?:{})\b\s*([:\-–|]?)\s*(.*)$", alternation(labels))).unwrap()
}

fn stop_regex(groups: &[&[&str]]) -> Regex {
    let all: Vec<&str> = groups.concat();
    Regex::new(&format!(r"(?i)\b(?:{})\b\s*:|\s[·|]\s", alternation(&all))).unwrap()
}

fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

// ============ Canonical-range exact match ============

pub fn canonical_range(attr: Attribute, text: &str) -> Option<String> {
    match attr {
        Attribute::Size => canonical_size(text),
        Attribute::Industry => canonical_industry(text),
        Attribute::Revenue => canonical_revenue_band(text),
    }
}

fn canonical_size(text: &str) -> Option<String> {
    let mut first_plain: Option<String> = None;

    for re in [&*SIZE_RANGE, &*SIZE_PLUS] {
        for caps in re.captures_iter(text) {
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            let Some(bucket) = canonical_size_bucket(whole) else {
                continue;
            };
            let described = caps.iter().flatten().any(|m| m.as_str().trim().eq_ignore_ascii_case("employees"));
            if described {
                return Some(format!("{} employees", bucket));
            }
            // a bare range only counts with headcount wording nearby
            let (start, end) = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
            if first_plain.is_none() && SIZE_CONTEXT.is_match(surrounding(text, start, end)) {
                first_plain = Some(bucket.to_string());
            }
        }
    }

    first_plain
}

/// Text within a few dozen characters of `start..end`, on char boundaries
fn surrounding(text: &str, start: usize, end: usize) -> &str {
    let mut lo = start.saturating_sub(SIZE_CONTEXT_BEFORE);
    while !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (end + SIZE_CONTEXT_AFTER).min(text.len());
    while !text.is_char_boundary(hi) {
        hi += 1;
    }
    &text[lo..hi]
}

fn canonical_industry(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let line = line.trim();
        CANONICAL_INDUSTRIES
            .iter()
            .find(|industry| industry.eq_ignore_ascii_case(line))
            .map(|industry| industry.to_string())
    })
}

fn canonical_revenue_band(text: &str) -> Option<String> {
    for caps in REVENUE_BAND.captures_iter(text) {
        let band = format!(
            "{}{}{}-{}{}{}",
            &caps[1],
            &caps[2],
            caps[3].to_uppercase(),
            &caps[1],
            &caps[4],
            caps[5].to_uppercase()
        );
        if let Some(known) = REVENUE_BANDS.iter().find(|b| **b == band) {
            return Some(known.to_string());
        }
    }

    REVENUE_OPEN_BAND.find(text).map(|m| {
        if m.as_str().to_lowercase().contains("10") {
            "$10B+".to_string()
        } else {
            "Less than $1M".to_string()
        }
    })
}

// ============ Labeled-section match ============

pub fn labeled_section(attr: Attribute, text: &str) -> Option<String> {
    let (label, stop) = match attr {
        Attribute::Size => (&*SIZE_LABEL, &*SIZE_STOP),
        Attribute::Industry => (&*INDUSTRY_LABEL, &*INDUSTRY_STOP),
        Attribute::Revenue => (&*REVENUE_LABEL, &*REVENUE_STOP),
    };

    let lines: Vec<&str> = text.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        let Some(caps) = label.captures(line) else {
            continue;
        };
        let separator = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();

        if rest.is_empty() {
            // label on its own line, value on the next
            let next = lines.get(i + 1).map(|l| l.trim()).unwrap_or_default();
            if next.is_empty() || ANY_LABEL_LINE.is_match(next) {
                continue;
            }
            return Some(cut_at_stop(next, stop));
        }

        let value = cut_at_stop(rest, stop);
        if value.is_empty() {
            continue;
        }
        // "Industry News" is a heading, not a fact; without a separator the
        // value must already be a recognised one
        if separator.is_empty() && !is_known_value(attr, &value) {
            continue;
        }
        return Some(value);
    }

    None
}

fn is_known_value(attr: Attribute, value: &str) -> bool {
    match attr {
        Attribute::Size => canonical_size_bucket(value).is_some() || parse_headcount(value).is_some(),
        Attribute::Industry => CANONICAL_INDUSTRIES.iter().any(|i| i.eq_ignore_ascii_case(value)),
        Attribute::Revenue => validate_revenue(value).is_ok(),
    }
}

fn cut_at_stop(value: &str, stop: &Regex) -> String {
    match stop.find(value) {
        Some(m) if m.start() > 0 => value[..m.start()].trim().to_string(),
        _ => value.trim().to_string(),
    }
}

// ============ Keyword-proximity match ============

pub fn keyword_proximity(attr: Attribute, text: &str) -> Option<String> {
    match attr {
        Attribute::Size => SIZE_KEYWORDS
            .iter()
            .find_map(|re| re.captures(text).and_then(|c| c.get(1)).map(|m| digits_only(m.as_str()))),
        Attribute::Industry => INDUSTRY_KEYWORD
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| title_case(m.as_str())),
        Attribute::Revenue => REVENUE_AFTER_KEYWORD
            .captures(text)
            .or_else(|| REVENUE_BEFORE_KEYWORD.captures(text))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string()),
    }
}

// ============ Structured metadata ============

const SIZE_META: &[&str] = &["numberofemployees", "employees", "company-size", "company_size", "employee-count"];
const INDUSTRY_META: &[&str] = &["industry", "company-industry", "company_industry"];
const REVENUE_META: &[&str] = &["revenue", "annual-revenue", "annualrevenue", "annual_revenue"];

pub fn structured_metadata(attr: Attribute, markup: &str) -> Option<String> {
    if markup.trim().is_empty() {
        return None;
    }
    let document = Html::parse_document(markup);

    if let Some(value) = from_json_ld(&document, attr) {
        return Some(value);
    }

    let wanted = match attr {
        Attribute::Size => SIZE_META,
        Attribute::Industry => INDUSTRY_META,
        Attribute::Revenue => REVENUE_META,
    };
    if let Some(value) = meta_content(&document, wanted) {
        return Some(value);
    }

    let description = meta_content(&document, &["description", "og:description", "twitter:description"])?;
    canonical_range(attr, &description).or_else(|| keyword_proximity(attr, &description))
}

/// Content of the first meta tag whose name or property is in `keys`
fn meta_content(document: &Html, keys: &[&str]) -> Option<String> {
    let selector = Selector::parse("meta[content]").ok()?;
    document.select(&selector).find_map(|el| {
        let key = el
            .value()
            .attr("name")
            .or_else(|| el.value().attr("property"))
            .or_else(|| el.value().attr("itemprop"))?
            .to_lowercase();
        if keys.contains(&key.as_str()) {
            el.value()
                .attr("content")
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
        } else {
            None
        }
    })
}

fn from_json_ld(document: &Html, attr: Attribute) -> Option<String> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;

    for element in document.select(&selector) {
        let json_text = element.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<Value>(&json_text) else {
            continue;
        };
        if let Some(found) = find_in_json(&value, attr) {
            return Some(found);
        }
    }

    None
}

fn find_in_json(value: &Value, attr: Attribute) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(|item| find_in_json(item, attr)),
        Value::Object(map) => {
            let direct = match attr {
                Attribute::Size => map.get("numberOfEmployees").and_then(json_headcount),
                Attribute::Industry => map.get("industry").and_then(json_text),
                Attribute::Revenue => map
                    .get("annualRevenue")
                    .or_else(|| map.get("revenue"))
                    .and_then(json_amount),
            };
            direct.or_else(|| {
                ["@graph", "publisher", "author", "organization", "mainEntity", "brand"]
                    .iter()
                    .filter_map(|key| map.get(*key))
                    .find_map(|nested| find_in_json(nested, attr))
            })
        }
        _ => None,
    }
}

fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => items.iter().find_map(json_text),
        Value::Object(map) => map.get("name").and_then(json_text),
        _ => None,
    }
}

fn json_headcount(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.trim().to_string()),
        Value::Object(map) => {
            let bound = |key: &str| map.get(key).and_then(|v| match v {
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) => Some(s.trim().to_string()),
                _ => None,
            });
            match (bound("minValue"), bound("maxValue")) {
                (Some(min), Some(max)) => Some(format!("{}-{}", min, max)),
                _ => bound("value"),
            }
        }
        _ => None,
    }
}

fn currency_symbol(code: &str) -> Option<&'static str> {
    match code.trim().to_uppercase().as_str() {
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "JPY" | "CNY" => Some("¥"),
        _ => None,
    }
}

fn json_amount(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => n.as_f64().map(humanize_amount),
        Value::Object(map) => {
            let amount = match map.get("value")? {
                Value::Number(n) => humanize_amount(n.as_f64()?),
                Value::String(s) => s.trim().to_string(),
                _ => return None,
            };
            let currency = map.get("currency").and_then(|c| c.as_str()).unwrap_or_default();
            Some(match currency_symbol(currency) {
                Some(symbol) => format!("{}{}", symbol, amount),
                None if currency.is_empty() => amount,
                None => format!("{} {}", amount, currency.trim().to_uppercase()),
            })
        }
        _ => None,
    }
}

// ============ Heuristic section scan ============

pub fn section_scan(attr: Attribute, markup: &str) -> Option<String> {
    if markup.trim().is_empty() {
        return None;
    }
    let text = section_text(markup)?;

    match attr {
        Attribute::Size => SECTION_SIZE
            .captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| digits_only(m.as_str())),
        Attribute::Industry => SECTION_INDUSTRY
            .captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| title_case(m.as_str())),
        Attribute::Revenue => SECTION_REVENUE
            .captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string()),
    }
}

/// Text of elements that look like about/company/team/careers sections
fn section_text(markup: &str) -> Option<String> {
    let document = Html::parse_document(markup);
    let containers = Selector::parse("section, article, div, aside, footer, main").ok()?;
    let headings = Selector::parse("h1, h2, h3, h4").ok()?;

    let mut parts: Vec<String> = Vec::new();

    for el in document.select(&containers) {
        let marker = format!(
            "{} {}",
            el.value().attr("id").unwrap_or_default(),
            el.value().attr("class").unwrap_or_default()
        )
        .to_lowercase();
        if SECTION_HINTS.iter().any(|hint| marker.contains(hint)) {
            parts.push(element_text(el));
        }
    }

    for heading in document.select(&headings) {
        let title = heading.text().collect::<String>().to_lowercase();
        let hinted = ["about", "company", "team", "careers", "who we are", "our story"]
            .iter()
            .any(|hint| title.contains(hint));
        if !hinted {
            continue;
        }
        if let Some(parent) = heading.parent().and_then(scraper::ElementRef::wrap) {
            parts.push(element_text(parent));
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_size_prefers_described_match() {
        let text = "Founded 2001-2005 era. Sizes 11-50. We are 51-200 employees.";
        assert_eq!(canonical_size(text).as_deref(), Some("51-200 employees"));
        assert_eq!(canonical_size("Team size: 11-50").as_deref(), Some("11-50"));
        assert_eq!(canonical_size("Employees\n51-200").as_deref(), Some("51-200"));
        assert_eq!(canonical_size("10,001+ employees worldwide").as_deref(), Some("10,001+ employees"));
        assert_eq!(canonical_size("Call 555-1234"), None);
    }

    #[test]
    fn test_canonical_size_ignores_ranges_without_headcount_wording() {
        assert_eq!(canonical_size("Call us 1-10 business days"), None);
        assert_eq!(canonical_size("Ranges: 11-50"), None);
        let text = "Orders ship in 2-10 days, always on time. Our staff of 11-50 helps";
        assert_eq!(canonical_size(text).as_deref(), Some("11-50"));
    }

    #[test]
    fn test_canonical_industry_requires_whole_line() {
        assert_eq!(
            canonical_industry("Acme\nfinancial services\nNew York").as_deref(),
            Some("Financial Services")
        );
        assert_eq!(canonical_industry("We love Financial Services firms"), None);
    }

    #[test]
    fn test_canonical_revenue_band() {
        assert_eq!(canonical_revenue_band("Revenue: $10M - $50M").as_deref(), Some("$10M-$50M"));
        assert_eq!(canonical_revenue_band("less than $1M").as_deref(), Some("Less than $1M"));
        assert_eq!(canonical_revenue_band("$3M-$7M"), None);
    }

    #[test]
    fn test_labeled_section_same_line() {
        let text = "Acme Corp\nIndustry: Financial Services Headquarters: New York\nCompany size: 201-500";
        assert_eq!(labeled_section(Attribute::Industry, text).as_deref(), Some("Financial Services"));
        assert_eq!(labeled_section(Attribute::Size, text).as_deref(), Some("201-500"));
    }

    #[test]
    fn test_labeled_section_value_on_next_line() {
        let text = "Company size\n51-200 employees\nIndustry\nSoftware Development\nHeadquarters\nBerlin";
        assert_eq!(labeled_section(Attribute::Size, text).as_deref(), Some("51-200 employees"));
        assert_eq!(labeled_section(Attribute::Industry, text).as_deref(), Some("Software Development"));
        assert_eq!(labeled_section(Attribute::Revenue, text), None);
    }

    #[test]
    fn test_labeled_section_without_separator() {
        assert_eq!(
            labeled_section(Attribute::Industry, "Industry Financial Services").as_deref(),
            Some("Financial Services")
        );
        // "industrial" is not the "industry" label
        assert_eq!(labeled_section(Attribute::Industry, "Industrial design studio"), None);
        assert_eq!(
            labeled_section(Attribute::Size, "Company size 201-500 employees").as_deref(),
            Some("201-500 employees")
        );
    }

    #[test]
    fn test_labeled_section_skips_navigation_headings() {
        let nav = "Home\nIndustry News\nRevenue Cycle Management\nSize Guide\nContact";
        assert_eq!(labeled_section(Attribute::Industry, nav), None);
        assert_eq!(labeled_section(Attribute::Revenue, nav), None);
        assert_eq!(labeled_section(Attribute::Size, nav), None);

        // a separator still marks a real value
        assert_eq!(labeled_section(Attribute::Industry, "Industry - Retail").as_deref(), Some("Retail"));
        assert_eq!(labeled_section(Attribute::Industry, "Industry | Logistics").as_deref(), Some("Logistics"));
    }

    #[test]
    fn test_labeled_section_cuts_at_middle_dot() {
        assert_eq!(
            labeled_section(Attribute::Industry, "Industry: Retail · Seattle, WA").as_deref(),
            Some("Retail")
        );
    }

    #[test]
    fn test_keyword_proximity_size() {
        assert_eq!(keyword_proximity(Attribute::Size, "We are a team of 45 makers").as_deref(), Some("45"));
        assert_eq!(
            keyword_proximity(Attribute::Size, "Today we have more than 1,200 employees worldwide").as_deref(),
            Some("1200")
        );
        assert_eq!(keyword_proximity(Attribute::Size, "Acme employs approximately 300 people").as_deref(), Some("300"));
        assert_eq!(keyword_proximity(Attribute::Size, "Founded in 1999"), None);
    }

    #[test]
    fn test_keyword_proximity_industry() {
        assert_eq!(
            keyword_proximity(Attribute::Industry, "A trusted partner in the financial services industry.").as_deref(),
            Some("Financial Services")
        );
    }

    #[test]
    fn test_keyword_proximity_revenue() {
        assert_eq!(
            keyword_proximity(Attribute::Revenue, "Annual revenue reached $55.2 million in 2023.").as_deref(),
            Some("$55.2 million")
        );
        assert_eq!(
            keyword_proximity(Attribute::Revenue, "The firm booked €12M in sales last year").as_deref(),
            Some("€12M")
        );
        assert_eq!(keyword_proximity(Attribute::Revenue, "Revenue growth is strong"), None);
    }

    #[test]
    fn test_structured_metadata_json_ld() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@context":"https://schema.org","@graph":[{"@type":"WebSite","name":"Acme"},
             {"@type":"Organization","name":"Acme","industry":"Logistics",
              "numberOfEmployees":{"@type":"QuantitativeValue","minValue":51,"maxValue":200},
              "annualRevenue":{"@type":"MonetaryAmount","value":55200000,"currency":"USD"}}]}
            </script></head><body></body></html>"#;
        assert_eq!(structured_metadata(Attribute::Industry, html).as_deref(), Some("Logistics"));
        assert_eq!(structured_metadata(Attribute::Size, html).as_deref(), Some("51-200"));
        assert_eq!(structured_metadata(Attribute::Revenue, html).as_deref(), Some("$55.2 Million"));
    }

    #[test]
    fn test_structured_metadata_meta_tags_and_description() {
        let html = r#"<html><head>
            <meta name="industry" content="Insurance">
            <meta name="description" content="Acme is a team of 80 specialists.">
            </head><body></body></html>"#;
        assert_eq!(structured_metadata(Attribute::Industry, html).as_deref(), Some("Insurance"));
        assert_eq!(structured_metadata(Attribute::Size, html).as_deref(), Some("80"));
        assert_eq!(structured_metadata(Attribute::Revenue, html), None);
    }

    #[test]
    fn test_section_scan_only_reads_hinted_sections() {
        let html = r#"<html><body>
            <div class="hero">Trusted by 5000 happy customers</div>
            <section id="about-us"><p>We are a leading logistics company with 320 passionate people
            and $40 million in bookings.</p></section>
            </body></html>"#;
        assert_eq!(section_scan(Attribute::Size, html).as_deref(), Some("320"));
        assert_eq!(section_scan(Attribute::Industry, html).as_deref(), Some("Logistics"));
        assert_eq!(section_scan(Attribute::Revenue, html).as_deref(), Some("$40 million"));
    }

    #[test]
    fn test_section_scan_uses_heading_parent() {
        let html = r#"<html><body><div><h2>Our Team</h2><p>Over 75 engineers and designers.</p></div></body></html>"#;
        assert_eq!(section_scan(Attribute::Size, html).as_deref(), Some("75"));
        assert_eq!(section_scan(Attribute::Size, "<html><body><p>75 engineers</p></body></html>"), None);
    }
}
