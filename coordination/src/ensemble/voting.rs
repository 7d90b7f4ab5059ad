//! Consensus assembly across redundant miners
//!
//! Reduces the current set of miner assessments to one response. The
//! response is rebuilt from scratch each time, so calling it again with a
//! larger set of assessments (late stragglers) needs no incremental state.

use std::cmp::Ordering;

use tracing::{debug, info};

use super::citations::curate_citations;
use crate::state::{
    unit_interval, Citation, ConsensusResponse, Verdict, Vote, WorkerAssessment,
};

/// Confidence reported when no miner produced any output.
pub const EMPTY_CONFIDENCE: f64 = 0.3;

/// Disagreement used when nothing better is known.
pub const DEFAULT_DISAGREEMENT: f64 = 0.5;

pub const EMPTY_REASONING: &str = "No miner responses were received; the claim could not be assessed.";

/// Worker id of the synthetic vote recorded for an empty round.
pub const MISSING_OUTPUT_WORKER: &str = "unavailable";

/// Spread between the highest and lowest verdict score (`true`=1,
/// `uncertain`=0.5, `false`=0). Zero for fewer than two assessments.
pub fn verdict_spread(assessments: &[WorkerAssessment]) -> f64 {
    let scores = assessments.iter().map(|a| a.verdict.score());
    let max = scores.clone().fold(f64::MIN, f64::max);
    let min = scores.fold(f64::MAX, f64::min);
    if assessments.len() < 2 {
        0.0
    } else {
        max - min
    }
}

/// Disagreement for a round whose primary (highest-confidence) assessment
/// is `primary`.
///
/// The primary's self-reported value wins when present. That mixes a
/// miner's own uncertainty with inter-miner spread; it is kept for
/// compatibility with existing consumers of the score.
fn disagreement_for(primary: &WorkerAssessment, assessments: &[WorkerAssessment]) -> f64 {
    match primary.disagreement {
        Some(reported) => reported,
        None if assessments.len() > 1 => verdict_spread(assessments),
        None => DEFAULT_DISAGREEMENT,
    }
}

fn empty_response(evidence: &[Citation]) -> ConsensusResponse {
    ConsensusResponse {
        verdict: Verdict::Uncertain,
        confidence: EMPTY_CONFIDENCE,
        disagreement: DEFAULT_DISAGREEMENT,
        reasoning: EMPTY_REASONING.to_string(),
        citations: curate_citations(evidence.iter().cloned()),
        votes: vec![Vote {
            worker_id: MISSING_OUTPUT_WORKER.to_string(),
            verdict: Verdict::Uncertain,
            confidence: EMPTY_CONFIDENCE,
            reasoning: "Miner output missing.".to_string(),
            citations: Vec::new(),
            parsed: false,
        }],
        validation: None,
        task_id: None,
        correlation_id: None,
        miners_requested: 0,
        miners_responded: 0,
    }
}

/// Assemble a consensus response from every assessment collected so far.
///
/// `evidence` holds the evidence-provider citations; they are merged with
/// every miner's citations before curation.
pub fn assemble_consensus(
    assessments: &[WorkerAssessment],
    evidence: &[Citation],
) -> ConsensusResponse {
    if assessments.is_empty() {
        debug!("No miner assessments, returning degraded consensus");
        return empty_response(evidence);
    }

    let mut ranked: Vec<&WorkerAssessment> = assessments.iter().collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    let primary = ranked[0];

    let disagreement = unit_interval(disagreement_for(primary, assessments));

    let citations = curate_citations(
        evidence
            .iter()
            .cloned()
            .chain(assessments.iter().flat_map(|a| a.citations.iter().cloned())),
    );

    let votes: Vec<Vote> = ranked.iter().map(|a| Vote::from(*a)).collect();

    info!(
        verdict = %primary.verdict,
        confidence = primary.confidence,
        disagreement,
        miners = assessments.len(),
        primary = %primary.worker_id,
        "Consensus assembled"
    );

    ConsensusResponse {
        verdict: primary.verdict,
        confidence: unit_interval(primary.confidence),
        disagreement,
        reasoning: primary.reasoning.clone(),
        citations,
        votes,
        validation: None,
        task_id: None,
        correlation_id: None,
        miners_requested: 0,
        miners_responded: assessments.len(),
    }
}
