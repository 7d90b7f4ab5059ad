//! Claim-check coordination library
//!
//! This library provides the I/O-free core of claim verification over
//! redundant, untrusted inference miners:
//! - Tolerant extraction of structured assessments from free-text miner output
//! - Citation deduplication and source-quality curation
//! - Consensus assembly (primary verdict, confidence, disagreement, vote record)
//! - Parsing of the second-pass validation agent's audit
//!
//! # Usage
//!
//! ```
//! use coordination::{assemble_consensus, extract_assessment, Verdict};
//!
//! let raw = r#"<think>...</think>{"verdict":"true","confidence":0.82,"reasoning":"Documented."}"#;
//! let assessment = extract_assessment(raw, "miner-a", 0).into_assessment();
//!
//! let response = assemble_consensus(&[assessment], &[]);
//! assert_eq!(response.verdict, Verdict::True);
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod ensemble;
pub mod state;

// Re-export key ensemble operations
pub use ensemble::{
    assemble_consensus, curate_citations, dedupe_citations, extract_assessment,
    parse_validation_output, Extraction,
};

// Re-export key state types
pub use state::{
    Citation, ConsensusResponse, InvalidCitationUrl, TaskId, ValidationResult, ValidationStatus,
    ValidationVerdict, Verdict, Vote, WorkerAssessment, WorkerId,
};
