//! Consensus over redundant claim-check miners
//!
//! # Architecture
//!
//! ```text
//!  raw miner output ──► extract ──► WorkerAssessment ─┐
//!  raw miner output ──► extract ──► WorkerAssessment ─┼──► voting ──► ConsensusResponse
//!  evidence provider ─────────────► Citation[] ───────┘       │
//!                                                    citations (dedupe, rank, top 3)
//! ```
//!
//! # Components
//!
//! - **extract**: strips reasoning/noise and recovers one JSON object per miner,
//!   falling back to a degraded `uncertain` assessment when nothing parses
//! - **citations**: source-quality ranking and deduplication
//! - **voting**: primary verdict selection and disagreement
//! - **audit**: parsing of the validation agent's answer
//!
//! Everything here is synchronous and free of I/O; dispatch, polling and
//! timeouts live in the `claim-check` crate.

pub mod audit;
pub mod citations;
pub mod extract;
pub mod voting;

pub use audit::parse_validation_output;
pub use citations::{
    classify_host, curate_citations, dedupe_citations, quality_score, SourceTier,
    MAX_CURATED_CITATIONS, MIN_QUALITY_SCORE,
};
pub use extract::{
    clean_output, extract_assessment, isolate_object, recover_object, strip_reasoning,
    truncate_chars, Extraction, Recovered, REASONING_CLOSE_MARKER,
};
pub use voting::{assemble_consensus, verdict_spread};
