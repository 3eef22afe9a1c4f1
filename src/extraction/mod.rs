//! Extraction Strategy Chain
//!
//! Each attribute is tried against a fixed, ordered list of strategies:
//! - Canonical-range exact match
//! - Labeled-section match ("Company size", "Industry", ...)
//! - Keyword-proximity match ("team of 40", "$12M in revenue")
//! - Structured metadata (JSON-LD, meta tags)
//! - Heuristic scan of about/company/team/careers sections
//!
//! The chain stops at the first candidate that passes validation. A rejected
//! candidate moves the chain on to the next strategy.

pub mod strategies;
pub mod validate;

use scraper::{ElementRef, Html};
use std::fmt;
use tracing::debug;

use crate::record::Attribute;
pub use validate::Rejection;

/// Extraction procedures, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtractionStrategy {
    CanonicalRange,
    LabeledSection,
    KeywordProximity,
    StructuredMetadata,
    SectionScan,
}

impl ExtractionStrategy {
    pub const ORDER: [ExtractionStrategy; 5] = [
        ExtractionStrategy::CanonicalRange,
        ExtractionStrategy::LabeledSection,
        ExtractionStrategy::KeywordProximity,
        ExtractionStrategy::StructuredMetadata,
        ExtractionStrategy::SectionScan,
    ];

    /// Run this strategy for one attribute, returning the raw candidate text
    pub fn apply(&self, attr: Attribute, text: &str, markup: &str) -> Option<String> {
        match self {
            ExtractionStrategy::CanonicalRange => strategies::canonical_range(attr, text),
            ExtractionStrategy::LabeledSection => strategies::labeled_section(attr, text),
            ExtractionStrategy::KeywordProximity => strategies::keyword_proximity(attr, text),
            ExtractionStrategy::StructuredMetadata => strategies::structured_metadata(attr, markup),
            ExtractionStrategy::SectionScan => strategies::section_scan(attr, markup),
        }
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionStrategy::CanonicalRange => write!(f, "canonical_range"),
            ExtractionStrategy::LabeledSection => write!(f, "labeled_section"),
            ExtractionStrategy::KeywordProximity => write!(f, "keyword_proximity"),
            ExtractionStrategy::StructuredMetadata => write!(f, "structured_metadata"),
            ExtractionStrategy::SectionScan => write!(f, "section_scan"),
        }
    }
}

/// A validated value and the strategy that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub value: String,
    pub strategy: ExtractionStrategy,
}

/// Full record of one chain run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionTrace {
    pub accepted: Option<Candidate>,
    pub rejected: Vec<(ExtractionStrategy, Rejection)>,
}

impl ExtractionTrace {
    /// A candidate was seen but none passed validation
    pub fn only_rejections(&self) -> bool {
        self.accepted.is_none() && !self.rejected.is_empty()
    }
}

/// Run the chain and return the first valid candidate
pub fn extract(attr: Attribute, page_text: &str, page_markup: &str) -> Option<Candidate> {
    extract_traced(attr, page_text, page_markup).accepted
}

/// Run the chain, keeping rejected candidates for outcome classification
pub fn extract_traced(attr: Attribute, page_text: &str, page_markup: &str) -> ExtractionTrace {
    let mut trace = ExtractionTrace::default();

    for strategy in ExtractionStrategy::ORDER {
        let Some(raw) = strategy.apply(attr, page_text, page_markup) else {
            continue;
        };

        match validate::validate(attr, &raw) {
            Ok(value) => {
                debug!("Found {} via {}: {}", attr, strategy, value);
                trace.accepted = Some(Candidate { value, strategy });
                return trace;
            }
            Err(rejection) => {
                debug!("Rejected {} candidate from {}: {}", attr, strategy, rejection);
                trace.rejected.push((strategy, rejection));
            }
        }
    }

    trace
}

/// A fetched page: final URL, visible text and raw markup
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub url: String,
    pub text: String,
    pub markup: String,
}

impl Page {
    pub fn from_html(url: impl Into<String>, html: impl Into<String>) -> Self {
        let markup = html.into();
        let text = visible_text(&markup);
        Self {
            url: url.into(),
            text,
            markup,
        }
    }

    pub fn extract_traced(&self, attr: Attribute) -> ExtractionTrace {
        extract_traced(attr, &self.text, &self.markup)
    }
}

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "svg", "head"];

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "tr", "td", "th", "dt", "dd", "dl",
    "h1", "h2", "h3", "h4", "h5", "h6", "section", "article", "header", "footer",
    "main", "aside", "nav", "table", "title", "blockquote", "address", "hr",
];

/// Visible text of an HTML document, one block element per line
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    element_text(document.root_element())
}

/// Visible text below one element, one block element per line
pub fn element_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(element, &mut raw);

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_ELEMENTS.contains(&name) {
        return;
    }
    let block = BLOCK_ELEMENTS.contains(&name);
    if block {
        out.push('\n');
    }

    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(&text.replace('\u{a0}', " "));
        } else if let Some(child_element) = ElementRef::wrap(child) {
            collect_text(child_element, out);
        }
    }

    if block {
        out.push('\n');
    } else {
        out.push(' ');
    }
}
