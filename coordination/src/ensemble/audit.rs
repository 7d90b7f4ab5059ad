//! Parsing of validation-agent output.
//!
//! Uses the same cleaning and object recovery as miner payloads.

use super::extract::{read_number, read_text, recover_object, truncate_chars};
use crate::state::{ValidationResult, ValidationStatus, ValidationVerdict};

pub const MAX_SCORE: u8 = 10;
const MAX_NOTES_CHARS: usize = 600;

/// Parse the auditor's raw output into a validation result with status `ok`.
///
/// Anything unparseable becomes `inconclusive` with score 0 and the cleaned
/// text as notes.
pub fn parse_validation_output(raw: &str) -> ValidationResult {
    let recovered = recover_object(raw);

    let Some(object) = recovered.object else {
        return ValidationResult {
            verdict: ValidationVerdict::Inconclusive,
            score: 0,
            notes: truncate_chars(&recovered.cleaned, MAX_NOTES_CHARS),
            status: ValidationStatus::Ok,
            correlation_id: None,
            task_id: None,
        };
    };

    let verdict = read_text(object.get("verdict"))
        .map(ValidationVerdict::parse)
        .unwrap_or(ValidationVerdict::Inconclusive);

    let score = read_number(object.get("score"))
        .map(|s| s.round().clamp(0.0, f64::from(MAX_SCORE)) as u8)
        .unwrap_or(0);

    let notes = read_text(object.get("notes"))
        .map(|n| truncate_chars(n, MAX_NOTES_CHARS))
        .unwrap_or_default();

    ValidationResult {
        verdict,
        score,
        notes,
        status: ValidationStatus::Ok,
        correlation_id: None,
        task_id: None,
    }
}
