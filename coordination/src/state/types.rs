//! Core types for claim-check consensus
//!
//! These types describe one claim-check call: the per-miner assessments
//! recovered from raw output, the curated citations, and the assembled
//! consensus response returned to the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Identifier returned by the inference dispatcher for one dispatched prompt
pub type TaskId = String;

/// Identifier of the miner that produced a payload
pub type WorkerId = String;

/// Claim-check outcome category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    True,
    False,
    Uncertain,
}

impl Verdict {
    /// Case-insensitive match against `true` / `false` / `uncertain`.
    ///
    /// Anything else maps to `Uncertain`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Self::True,
            "false" => Self::False,
            _ => Self::Uncertain,
        }
    }

    /// Numeric position used for the inter-miner spread.
    pub fn score(&self) -> f64 {
        match self {
            Self::True => 1.0,
            Self::Uncertain => 0.5,
            Self::False => 0.0,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::Uncertain => write!(f, "uncertain"),
        }
    }
}

/// Rejection of a citation whose URL is not a valid http/https URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid citation url: {0:?}")]
pub struct InvalidCitationUrl(pub String);

/// Wire shape accepted when deserializing a [`Citation`].
#[derive(Debug, Clone, Deserialize)]
struct CitationWire {
    source: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// A single evidence source.
///
/// Construction validates the URL: anything that is not a parseable
/// http/https URL is rejected, so every `Citation` in circulation carries
/// either no URL or a valid one. Fields are read-only after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CitationWire")]
pub struct Citation {
    source: String,
    url: Option<String>,
    description: Option<String>,
}

impl Citation {
    /// Build a citation, returning `None` when the URL is present but invalid.
    ///
    /// A blank source name falls back to the URL host (or `"Unknown source"`);
    /// blank URL and description strings are treated as absent.
    pub fn new(source: &str, url: Option<&str>, description: Option<&str>) -> Option<Self> {
        let url = match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(raw) => Some(validate_url(raw)?),
            None => None,
        };

        let source = source.trim();
        let source = if source.is_empty() {
            url.as_ref()
                .and_then(|u| u.host_str())
                .map(|h| h.trim_start_matches("www.").to_string())
                .unwrap_or_else(|| "Unknown source".to_string())
        } else {
            source.to_string()
        };

        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from);

        Some(Self {
            source,
            url: url.map(String::from),
            description,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Lowercased host without a leading `www.`.
    pub fn host(&self) -> Option<String> {
        let parsed = Url::parse(self.url.as_deref()?).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        Some(host.trim_start_matches("www.").to_string())
    }

    /// Identity used for deduplication: `(source name, url)`.
    pub fn dedup_key(&self) -> (&str, Option<&str>) {
        (self.source.as_str(), self.url.as_deref())
    }
}

impl TryFrom<CitationWire> for Citation {
    type Error = InvalidCitationUrl;

    fn try_from(wire: CitationWire) -> Result<Self, Self::Error> {
        Citation::new(&wire.source, wire.url.as_deref(), wire.description.as_deref())
            .ok_or_else(|| InvalidCitationUrl(wire.url.clone().unwrap_or_default()))
    }
}

fn validate_url(raw: &str) -> Option<Url> {
    let parsed = Url::parse(raw).ok()?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Some(parsed),
        _ => None,
    }
}

/// One miner's parsed output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerAssessment {
    pub worker_id: WorkerId,
    pub verdict: Verdict,
    /// Confidence in the verdict (0.0–1.0)
    pub confidence: f64,
    /// Miner's self-reported disagreement estimate, if it gave one
    pub disagreement: Option<f64>,
    pub reasoning: String,
    pub citations: Vec<Citation>,
    /// `false` marks a degraded assessment produced from unparseable output
    pub parsed: bool,
}

/// One entry of the vote record attached to a consensus response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub worker_id: WorkerId,
    pub verdict: Verdict,
    pub confidence: f64,
    pub reasoning: String,
    pub citations: Vec<Citation>,
    pub parsed: bool,
}

impl From<&WorkerAssessment> for Vote {
    fn from(assessment: &WorkerAssessment) -> Self {
        Self {
            worker_id: assessment.worker_id.clone(),
            verdict: assessment.verdict,
            confidence: assessment.confidence,
            reasoning: assessment.reasoning.clone(),
            citations: assessment.citations.clone(),
            parsed: assessment.parsed,
        }
    }
}

/// Audit outcome from the validation agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationVerdict {
    /// The consensus looks sound
    Normal,
    /// The consensus looks wrong or suspicious
    Abnormal,
    /// The auditor could not decide (or never answered)
    Inconclusive,
}

impl ValidationVerdict {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "normal" => Self::Normal,
            "abnormal" => Self::Abnormal,
            _ => Self::Inconclusive,
        }
    }
}

impl std::fmt::Display for ValidationVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Abnormal => write!(f, "abnormal"),
            Self::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

/// How the validation pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// The auditor answered (its answer may still be inconclusive)
    Ok,
    /// The wall-clock budget ran out first
    Timeout,
    /// Dispatch or polling failed
    Error,
    /// No validation channel is configured
    Skipped,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Timeout => write!(f, "timeout"),
            Self::Error => write!(f, "error"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of the second-pass audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub verdict: ValidationVerdict,
    /// Audit score (0–10)
    pub score: u8,
    pub notes: String,
    pub status: ValidationStatus,
    /// Correlation id the audit was dispatched under (`{call}-audit`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Dispatcher task id of the audit, once the dispatch was accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

impl ValidationResult {
    fn inconclusive(status: ValidationStatus, notes: impl Into<String>) -> Self {
        Self {
            verdict: ValidationVerdict::Inconclusive,
            score: 0,
            notes: notes.into(),
            status,
            correlation_id: None,
            task_id: None,
        }
    }

    /// No validation channel configured.
    pub fn skipped() -> Self {
        Self::inconclusive(
            ValidationStatus::Skipped,
            "Validation channel not configured",
        )
    }

    /// The audit did not finish inside its budget.
    pub fn timed_out(budget_secs: u64) -> Self {
        Self::inconclusive(
            ValidationStatus::Timeout,
            format!("Validation did not finish within {budget_secs}s"),
        )
    }

    /// Dispatch or polling of the audit task failed.
    pub fn failed(notes: impl Into<String>) -> Self {
        Self::inconclusive(ValidationStatus::Error, notes)
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

/// Final structured output of one claim-check call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResponse {
    pub verdict: Verdict,
    pub confidence: f64,
    pub disagreement: f64,
    pub reasoning: String,
    /// Curated evidence list (at most three entries)
    pub citations: Vec<Citation>,
    /// Every miner's vote, primary first
    pub votes: Vec<Vote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub miners_requested: u32,
    #[serde(default)]
    pub miners_responded: usize,
}

impl ConsensusResponse {
    pub fn with_task(mut self, task_id: impl Into<TaskId>, correlation_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_validation(mut self, validation: Option<ValidationResult>) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_miners_requested(mut self, requested: u32) -> Self {
        self.miners_requested = requested;
        self
    }
}

/// Round to two decimals after clamping into `[0, 1]`.
pub fn unit_interval(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    (value.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_parse_is_case_insensitive() {
        assert_eq!(Verdict::parse("TRUE"), Verdict::True);
        assert_eq!(Verdict::parse(" False "), Verdict::False);
        assert_eq!(Verdict::parse("Uncertain"), Verdict::Uncertain);
        assert_eq!(Verdict::parse("mostly true"), Verdict::Uncertain);
        assert_eq!(Verdict::parse(""), Verdict::Uncertain);
    }

    #[test]
    fn test_verdict_scores() {
        assert_eq!(Verdict::True.score(), 1.0);
        assert_eq!(Verdict::Uncertain.score(), 0.5);
        assert_eq!(Verdict::False.score(), 0.0);
    }

    #[test]
    fn test_citation_rejects_non_http_urls() {
        assert!(Citation::new("x", Some("ftp://example.gov/a"), None).is_none());
        assert!(Citation::new("x", Some("not a url"), None).is_none());
        assert!(Citation::new("x", Some("javascript:alert(1)"), None).is_none());
        assert!(Citation::new("x", Some("https://cdc.gov/a"), None).is_some());
    }

    #[test]
    fn test_citation_without_url_is_kept() {
        let c = Citation::new("Encyclopedia", None, Some("  ")).unwrap();
        assert_eq!(c.url(), None);
        assert_eq!(c.description(), None);
        assert_eq!(c.host(), None);

        let blank = Citation::new("Encyclopedia", Some("   "), None).unwrap();
        assert_eq!(blank.url(), None);
    }

    #[test]
    fn test_citation_source_falls_back_to_host() {
        let c = Citation::new("", Some("https://www.nasa.gov/moon"), None).unwrap();
        assert_eq!(c.source(), "nasa.gov");
        assert_eq!(c.host().as_deref(), Some("nasa.gov"));
    }

    #[test]
    fn test_citation_deserialize_validates() {
        let ok: Result<Citation, _> =
            serde_json::from_str(r#"{"source":"CDC","url":"https://www.cdc.gov/flu"}"#);
        assert!(ok.is_ok());

        let bad: Result<Citation, _> =
            serde_json::from_str(r#"{"source":"CDC","url":"cdc dot gov"}"#);
        let err = bad.unwrap_err().to_string();
        assert!(err.contains("invalid citation url: \"cdc dot gov\""), "{err}");
    }

    #[test]
    fn test_validation_verdict_parse() {
        assert_eq!(ValidationVerdict::parse("NORMAL"), ValidationVerdict::Normal);
        assert_eq!(
            ValidationVerdict::parse("abnormal"),
            ValidationVerdict::Abnormal
        );
        assert_eq!(
            ValidationVerdict::parse("suspicious"),
            ValidationVerdict::Inconclusive
        );
    }

    #[test]
    fn test_validation_constructors() {
        let t = ValidationResult::timed_out(45);
        assert_eq!(t.status, ValidationStatus::Timeout);
        assert_eq!(t.verdict, ValidationVerdict::Inconclusive);
        assert_eq!(t.score, 0);
        assert!(t.notes.contains("45s"));

        let s = ValidationResult::skipped();
        assert_eq!(s.status, ValidationStatus::Skipped);
        assert_eq!(s.correlation_id, None);
    }

    #[test]
    fn test_unit_interval_clamps_and_rounds() {
        assert_eq!(unit_interval(1.7), 1.0);
        assert_eq!(unit_interval(-0.2), 0.0);
        assert_eq!(unit_interval(0.456), 0.46);
        assert_eq!(unit_interval(f64::NAN), 0.0);
    }

    #[test]
    fn test_verdict_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Verdict::True).unwrap(), "\"true\"");
        assert_eq!(
            serde_json::to_string(&ValidationStatus::Timeout).unwrap(),
            "\"timeout\""
        );
    }
}
