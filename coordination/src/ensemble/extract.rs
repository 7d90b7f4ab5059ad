//! Payload extraction from untrusted miner output
//!
//! Miners answer in free text that is *supposed* to contain one JSON object.
//! In practice it arrives wrapped in private reasoning, code fences, prose,
//! end-of-sequence tokens, or truncated halfway through. Extraction never
//! fails: unparseable output becomes a low-confidence `uncertain` assessment.

use serde_json::{Map, Value};
use tracing::debug;

use super::citations::{citations_from_json, curate_citations};
use crate::state::{unit_interval, Verdict, WorkerAssessment};

/// Closing tag reasoning-style models emit after their private deliberation.
pub const REASONING_CLOSE_MARKER: &str = "</think>";

/// End-of-sequence tokens some backends leak into the text.
const TERMINATOR_TOKENS: &[&str] = &["</s>", "<|im_end|>", "<|eot_id|>", "<|endoftext|>"];

pub const FALLBACK_CONFIDENCE: f64 = 0.33;
pub const FALLBACK_DISAGREEMENT: f64 = 0.5;
pub const FALLBACK_REASONING: &str = "Miner output could not be parsed into a structured assessment.";
pub const MISSING_REASONING: &str = "No reasoning provided by miner.";

/// Confidence assumed when a parsed payload omits it.
const DEFAULT_CONFIDENCE: f64 = 0.5;

const FALLBACK_REASONING_CHARS: usize = 320;
const MAX_REASONING_CHARS: usize = 1200;

/// Outcome of extracting one miner payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// A JSON object was recovered.
    Parsed(WorkerAssessment),
    /// Nothing parseable; the assessment is the degraded fallback.
    Fallback(WorkerAssessment),
}

impl Extraction {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }

    pub fn assessment(&self) -> &WorkerAssessment {
        match self {
            Self::Parsed(a) | Self::Fallback(a) => a,
        }
    }

    pub fn into_assessment(self) -> WorkerAssessment {
        match self {
            Self::Parsed(a) | Self::Fallback(a) => a,
        }
    }
}

/// Cleaned text plus the JSON object recovered from it, if any.
#[derive(Debug, Clone)]
pub struct Recovered {
    pub cleaned: String,
    pub object: Option<Map<String, Value>>,
}

/// Keep only what follows the last reasoning marker.
pub fn strip_reasoning(raw: &str) -> &str {
    match raw.rfind(REASONING_CLOSE_MARKER) {
        Some(idx) => &raw[idx + REASONING_CLOSE_MARKER.len()..],
        None => raw,
    }
}

/// Strip reasoning, code fences and trailing end-of-sequence tokens.
pub fn clean_output(raw: &str) -> String {
    let mut text = strip_reasoning(raw).trim();

    loop {
        let before = text.len();

        for token in TERMINATOR_TOKENS {
            if let Some(rest) = text.strip_suffix(token) {
                text = rest.trim_end();
            }
        }
        if let Some(rest) = text
            .strip_prefix("```json")
            .or_else(|| text.strip_prefix("```JSON"))
            .or_else(|| text.strip_prefix("```"))
        {
            text = rest.trim();
        }
        if let Some(rest) = text.strip_suffix("```") {
            text = rest.trim();
        }

        if text.len() == before {
            break;
        }
    }

    text.to_string()
}

/// Isolate the first balanced `{ ... }` span by brace-depth counting.
///
/// Braces inside JSON strings are ignored. An unterminated object yields
/// everything from the first `{` on; no `{` at all yields the whole text.
pub fn isolate_object(text: &str) -> &str {
    let Some(start) = text.find('{') else {
        return text;
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return &text[start..start + offset + 1];
                }
            }
            _ => {}
        }
    }

    &text[start..]
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Two-stage recovery: the isolated object from the cleaned text, then the
/// first-`{`-to-last-`}` span of the raw text.
pub fn recover_object(raw: &str) -> Recovered {
    let cleaned = clean_output(raw);

    let object = parse_object(isolate_object(&cleaned)).or_else(|| {
        let start = raw.find('{')?;
        let end = raw.rfind('}')?;
        if end > start {
            parse_object(&raw[start..=end])
        } else {
            None
        }
    });

    Recovered { cleaned, object }
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Read a number that may have been emitted as a JSON number or a string.
pub(crate) fn read_number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

pub(crate) fn read_text(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn read_verdict(value: Option<&Value>) -> Verdict {
    match value {
        Some(Value::String(s)) => Verdict::parse(s),
        Some(Value::Bool(true)) => Verdict::True,
        Some(Value::Bool(false)) => Verdict::False,
        _ => Verdict::Uncertain,
    }
}

fn resolve_worker_id(worker_id: &str, index: usize) -> String {
    let trimmed = worker_id.trim();
    if trimmed.is_empty() {
        format!("miner-{}", index + 1)
    } else {
        trimmed.to_string()
    }
}

/// Degraded assessment for output nothing could be recovered from.
pub fn fallback_assessment(worker_id: String, cleaned: &str) -> WorkerAssessment {
    let reasoning = if cleaned.trim().is_empty() {
        FALLBACK_REASONING.to_string()
    } else {
        truncate_chars(cleaned.trim(), FALLBACK_REASONING_CHARS)
    };

    WorkerAssessment {
        worker_id,
        verdict: Verdict::Uncertain,
        confidence: FALLBACK_CONFIDENCE,
        disagreement: Some(FALLBACK_DISAGREEMENT),
        reasoning,
        citations: Vec::new(),
        parsed: false,
    }
}

fn assessment_from_object(worker_id: String, object: &Map<String, Value>) -> WorkerAssessment {
    let reasoning = read_text(object.get("reasoning"))
        .map(|r| truncate_chars(r, MAX_REASONING_CHARS))
        .unwrap_or_else(|| MISSING_REASONING.to_string());

    WorkerAssessment {
        worker_id,
        verdict: read_verdict(object.get("verdict")),
        confidence: unit_interval(
            read_number(object.get("confidence")).unwrap_or(DEFAULT_CONFIDENCE),
        ),
        disagreement: read_number(object.get("disagreement")).map(unit_interval),
        reasoning,
        citations: curate_citations(citations_from_json(object.get("citations"))),
        parsed: true,
    }
}

/// Turn one miner's raw output into an assessment.
///
/// `index` is the miner's ordinal and names the assessment when the
/// dispatcher did not report a worker id.
pub fn extract_assessment(raw: &str, worker_id: &str, index: usize) -> Extraction {
    let worker_id = resolve_worker_id(worker_id, index);
    let recovered = recover_object(raw);

    match recovered.object {
        Some(object) => Extraction::Parsed(assessment_from_object(worker_id, &object)),
        None => {
            debug!(
                worker_id = %worker_id,
                chars = raw.len(),
                "Miner output unparseable, using fallback assessment"
            );
            Extraction::Fallback(fallback_assessment(worker_id, &recovered.cleaned))
        }
    }
}
