//! Citation curation
//!
//! Deduplicates citations by `(source, url)` and ranks them by a source
//! quality heuristic. Sources below the quality floor are dropped even when
//! nothing better is available: a short list of credible sources is shown
//! rather than a long list of unknown ones.

use std::collections::HashSet;

use serde_json::Value;

use super::extract::read_text;
use crate::state::Citation;

/// Maximum number of citations returned by [`curate_citations`].
pub const MAX_CURATED_CITATIONS: usize = 3;

/// Citations scoring below this are excluded.
pub const MIN_QUALITY_SCORE: f64 = 2.0;

/// Bonus for citations that carry a description.
const DESCRIPTION_BONUS: f64 = 0.5;

/// Established news outlets ranked above unknown hosts.
const NEWS_DOMAINS: &[&str] = &[
    "reuters.com",
    "apnews.com",
    "bbc.com",
    "bbc.co.uk",
    "nytimes.com",
    "washingtonpost.com",
    "theguardian.com",
    "wsj.com",
    "bloomberg.com",
    "ft.com",
    "npr.org",
    "economist.com",
];

/// Source-quality tier derived from the citation host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceTier {
    Government,
    Educational,
    NonProfit,
    News,
    Unranked,
}

impl SourceTier {
    pub fn base_score(&self) -> f64 {
        match self {
            Self::Government => 5.0,
            Self::Educational => 4.0,
            Self::NonProfit => 3.0,
            Self::News => 2.0,
            Self::Unranked => 0.0,
        }
    }
}

fn is_country_code(label: &str) -> bool {
    label.len() == 2 && label.bytes().all(|b| b.is_ascii_alphabetic())
}

/// True when `label` is the public suffix of `host`: the last label
/// (`cdc.gov`) or the second-to-last ahead of a country code (`gov.uk`).
/// A bare `label` with nothing else is not a host.
fn has_suffix_label(host: &str, label: &str) -> bool {
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    match labels.as_slice() {
        [.., second, last] if *second == label && is_country_code(last) => true,
        [_, .., last] => *last == label,
        _ => false,
    }
}

/// Like [`has_suffix_label`], but only in the `<label>.<cc>` form (`ac.uk`).
fn has_country_suffix(host: &str, label: &str) -> bool {
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    matches!(labels.as_slice(), [.., second, last] if *second == label && is_country_code(last))
}

/// Classify a lowercased host (leading `www.` already removed).
pub fn classify_host(host: &str) -> SourceTier {
    if has_suffix_label(host, "gov") || has_suffix_label(host, "mil") {
        SourceTier::Government
    } else if has_suffix_label(host, "edu") || has_country_suffix(host, "ac") {
        SourceTier::Educational
    } else if has_suffix_label(host, "org") {
        SourceTier::NonProfit
    } else if NEWS_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    {
        SourceTier::News
    } else {
        SourceTier::Unranked
    }
}

/// Quality score for one citation. Citations without a URL are unranked.
pub fn quality_score(citation: &Citation) -> f64 {
    let tier = citation
        .host()
        .map(|h| classify_host(&h))
        .unwrap_or(SourceTier::Unranked);

    let bonus = if citation.description().is_some() {
        DESCRIPTION_BONUS
    } else {
        0.0
    };

    tier.base_score() + bonus
}

/// Drop repeated `(source, url)` pairs, keeping the first occurrence.
pub fn dedupe_citations<I>(citations: I) -> Vec<Citation>
where
    I: IntoIterator<Item = Citation>,
{
    let mut seen: HashSet<(String, Option<String>)> = HashSet::new();
    citations
        .into_iter()
        .filter(|c| {
            let (source, url) = c.dedup_key();
            seen.insert((source.to_string(), url.map(String::from)))
        })
        .collect()
}

/// Deduplicate, drop low-quality sources, rank, and keep the top three.
///
/// Ties keep their input order. Curating an already-curated list returns
/// it unchanged.
pub fn curate_citations<I>(citations: I) -> Vec<Citation>
where
    I: IntoIterator<Item = Citation>,
{
    let mut scored: Vec<(f64, Citation)> = dedupe_citations(citations)
        .into_iter()
        .map(|c| (quality_score(&c), c))
        .filter(|(score, _)| *score >= MIN_QUALITY_SCORE)
        .collect();

    // sort_by is stable, so equal scores keep input order
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .take(MAX_CURATED_CITATIONS)
        .map(|(_, c)| c)
        .collect()
}

/// Normalize a miner's `citations` field.
///
/// Accepts objects (`source`/`name`/`title`, `url`/`link`, `description`/
/// `snippet`) and bare URL strings. Entries with invalid URLs are dropped.
pub fn citations_from_json(value: Option<&Value>) -> Vec<Citation> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Object(obj) => {
                let source = read_text(obj.get("source"))
                    .or_else(|| read_text(obj.get("name")))
                    .or_else(|| read_text(obj.get("title")))
                    .unwrap_or("");
                let url = read_text(obj.get("url")).or_else(|| read_text(obj.get("link")));
                let description = read_text(obj.get("description"))
                    .or_else(|| read_text(obj.get("snippet")));
                Citation::new(source, url, description)
            }
            Value::String(url) => Citation::new("", Some(url), None),
            _ => None,
        })
        .collect()
}
