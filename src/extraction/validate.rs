//! Candidate validation and value cleanup

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::record::{is_placeholder, Attribute, CANONICAL_SIZE_BUCKETS, NETWORK_SIZE_BUCKETS};

/// Upper bound for a plain headcount
pub const MAX_HEADCOUNT: u64 = 10_000_000;

const MAX_INDUSTRY_LEN: usize = 100;
const MAX_INDUSTRY_WORDS: usize = 10;
const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];

static MAGNITUDE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(million|billion|thousand)\b").unwrap());

static EMPLOYEE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\b(?:employees?|staff|people)\s*$").unwrap());

/// Why a candidate was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("'{0}' is neither a canonical size bucket nor a headcount between 1 and 10,000,000")]
    Size(String),

    #[error("industry '{0}' is shorter than three characters")]
    IndustryTooShort(String),

    #[error("industry '{0}' starts with a digit")]
    IndustryNumericLeading(String),

    #[error("industry '{0}' is not descriptive text")]
    IndustryNotDescriptive(String),

    #[error("revenue '{0}' carries no currency symbol or magnitude word")]
    RevenueUnqualified(String),
}

/// Validate a raw candidate, returning the cleaned value to store
pub fn validate(attr: Attribute, raw: &str) -> Result<String, Rejection> {
    match attr {
        Attribute::Size => validate_size(raw),
        Attribute::Industry => validate_industry(raw),
        Attribute::Revenue => validate_revenue(raw),
    }
}

/// Collapse whitespace and trim trailing separators
pub fn clean_value(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '|' | '·' | '-' | '–' | '"' | '\''))
        .trim()
        .to_string()
}

/// Format with thousands separators (1001 -> "1,001")
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn parse_number(raw: &str) -> Option<u64> {
    let digits: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn strip_employee_suffix(raw: &str) -> (String, bool) {
    let stripped = EMPLOYEE_SUFFIX.replace(raw.trim(), "");
    let had_suffix = stripped.len() != raw.trim().len();
    (stripped.trim().to_string(), had_suffix)
}

/// Map a range like "501-1000 employees" onto its canonical bucket
pub fn canonical_size_bucket(raw: &str) -> Option<&'static str> {
    let (core, _) = strip_employee_suffix(raw);
    let normalized = core
        .to_lowercase()
        .replace(" to ", "-")
        .replace(['–', '—'], "-")
        .replace(' ', "");

    let formatted = if let Some(lower) = normalized.strip_suffix('+') {
        format!("{}+", format_thousands(parse_number(lower)?))
    } else {
        let (lower, upper) = normalized.split_once('-')?;
        format!(
            "{}-{}",
            format_thousands(parse_number(lower)?),
            format_thousands(parse_number(upper)?)
        )
    };

    CANONICAL_SIZE_BUCKETS
        .iter()
        .chain(NETWORK_SIZE_BUCKETS.iter())
        .find(|bucket| **bucket == formatted)
        .copied()
}

/// Plain headcount such as "250", "1,200" or "300+"
pub fn parse_headcount(raw: &str) -> Option<u64> {
    let (core, _) = strip_employee_suffix(raw);
    parse_number(core.trim_end_matches('+'))
}

pub fn validate_size(raw: &str) -> Result<String, Rejection> {
    let cleaned = clean_value(raw);

    if let Some(bucket) = canonical_size_bucket(&cleaned) {
        let (_, had_suffix) = strip_employee_suffix(&cleaned);
        return Ok(if had_suffix {
            format!("{} employees", bucket)
        } else {
            bucket.to_string()
        });
    }

    match parse_headcount(&cleaned) {
        Some(n) if (1..=MAX_HEADCOUNT).contains(&n) => Ok(n.to_string()),
        _ => Err(Rejection::Size(cleaned)),
    }
}

pub fn validate_industry(raw: &str) -> Result<String, Rejection> {
    let cleaned = clean_value(raw);

    if cleaned.chars().count() < 3 {
        return Err(Rejection::IndustryTooShort(cleaned));
    }
    if cleaned.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        return Err(Rejection::IndustryNumericLeading(cleaned));
    }
    if is_placeholder(&cleaned)
        || cleaned.len() > MAX_INDUSTRY_LEN
        || cleaned.split_whitespace().count() > MAX_INDUSTRY_WORDS
        || !cleaned.chars().any(|c| c.is_alphabetic())
    {
        return Err(Rejection::IndustryNotDescriptive(cleaned));
    }

    Ok(cleaned)
}

pub fn validate_revenue(raw: &str) -> Result<String, Rejection> {
    let cleaned = clean_value(raw);

    let qualified = cleaned.contains(CURRENCY_SYMBOLS) || MAGNITUDE_WORD.is_match(&cleaned);
    let has_digit = cleaned.chars().any(|c| c.is_ascii_digit());
    if !qualified || !has_digit || is_placeholder(&cleaned) {
        return Err(Rejection::RevenueUnqualified(cleaned));
    }

    Ok(format_revenue(&cleaned))
}

/// Title-case magnitude words ("$55.2 million" -> "$55.2 Million")
pub fn format_revenue(raw: &str) -> String {
    MAGNITUDE_WORD
        .replace_all(raw, |caps: &regex::Captures| title_case(&caps[1]))
        .into_owned()
}

/// Capitalize each word, keeping short joining words lowercase
pub fn title_case(raw: &str) -> String {
    const LOWER: &[&str] = &["and", "of", "the", "for", "in", "&", "or"];

    raw.split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if i > 0 && LOWER.contains(&lower.as_str()) {
                return lower;
            }
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Human-readable amount (55_200_000 -> "55.2 Million")
pub fn humanize_amount(amount: f64) -> String {
    let (scaled, word) = if amount >= 1e9 {
        (amount / 1e9, " Billion")
    } else if amount >= 1e6 {
        (amount / 1e6, " Million")
    } else if amount >= 1e3 {
        (amount / 1e3, " Thousand")
    } else {
        (amount, "")
    };
    let mut number = format!("{:.1}", scaled);
    if number.ends_with(".0") {
        number.truncate(number.len() - 2);
    }
    format!("{}{}", number, word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_size_bucket_normalization() {
        assert_eq!(canonical_size_bucket("201-500"), Some("201-500"));
        assert_eq!(canonical_size_bucket("201 - 500 employees"), Some("201-500"));
        assert_eq!(canonical_size_bucket("501-1000"), Some("501-1,000"));
        assert_eq!(canonical_size_bucket("1001 to 5000"), Some("1,001-5,000"));
        assert_eq!(canonical_size_bucket("10001+"), Some("10,001+"));
        assert_eq!(canonical_size_bucket("10,001+ employees"), Some("10,001+"));
        assert_eq!(canonical_size_bucket("2-10"), Some("2-10"));
        assert_eq!(canonical_size_bucket("2019-2021"), None);
        assert_eq!(canonical_size_bucket("12-40"), None);
    }

    #[test]
    fn test_validate_size() {
        assert_eq!(validate_size("201-500 employees").unwrap(), "201-500 employees");
        assert_eq!(validate_size("501-1000").unwrap(), "501-1,000");
        assert_eq!(validate_size("1,200").unwrap(), "1200");
        assert_eq!(validate_size("300+ employees").unwrap(), "300");
        assert_eq!(validate_size("10000000").unwrap(), "10000000");
        assert!(validate_size("0").is_err());
        assert!(validate_size("10000001").is_err());
        assert!(validate_size("lots").is_err());
        assert!(validate_size("Not Found").is_err());
    }

    #[test]
    fn test_accepted_sizes_are_canonical_or_in_range() {
        let inputs = [
            "1-10", "11 - 50", "51-200 employees", "250", "7", "9,999,999", "20000000",
            "-3", "abc", "2-10", "0-1", "5001-10000", "1.5", "",
        ];
        for input in inputs {
            if let Ok(value) = validate_size(input) {
                let core = value.trim_end_matches(" employees");
                let canonical = CANONICAL_SIZE_BUCKETS.contains(&core) || NETWORK_SIZE_BUCKETS.contains(&core);
                let numeric = core
                    .parse::<u64>()
                    .map(|n| (1..=MAX_HEADCOUNT).contains(&n))
                    .unwrap_or(false);
                assert!(canonical || numeric, "accepted {:?} from {:?}", value, input);
            }
        }
    }

    #[test]
    fn test_validate_industry() {
        assert_eq!(validate_industry(" Financial  Services. ").unwrap(), "Financial Services");
        assert!(matches!(validate_industry("IT"), Err(Rejection::IndustryTooShort(_))));
        assert!(matches!(validate_industry("3D Printing"), Err(Rejection::IndustryNumericLeading(_))));
        assert!(matches!(validate_industry("Not Found"), Err(Rejection::IndustryNotDescriptive(_))));
        assert!(validate_industry("---").is_err());
    }

    #[test]
    fn test_validate_revenue() {
        assert_eq!(validate_revenue("$55.2 million").unwrap(), "$55.2 Million");
        assert_eq!(validate_revenue("€12M").unwrap(), "€12M");
        assert_eq!(validate_revenue("40 billion").unwrap(), "40 Billion");
        assert_eq!(validate_revenue("Less than $1M").unwrap(), "Less than $1M");
        assert!(validate_revenue("55.2").is_err());
        assert!(validate_revenue("Undisclosed").is_err());
        assert!(validate_revenue("$").is_err());
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("financial services"), "Financial Services");
        assert_eq!(title_case("oil and gas"), "Oil and Gas");
        assert_eq!(title_case("FOOD & beverages"), "Food & Beverages");
    }

    #[test]
    fn test_humanize_amount() {
        assert_eq!(humanize_amount(55_200_000.0), "55.2 Million");
        assert_eq!(humanize_amount(3_000_000_000.0), "3 Billion");
        assert_eq!(humanize_amount(750_000.0), "750 Thousand");
        assert_eq!(humanize_amount(12.0), "12");
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(1), "1");
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(10001), "10,001");
        assert_eq!(format_thousands(1234567), "1,234,567");
    }
}
