//! Claim-check data model
//!
//! Everything here is owned by a single claim-check call. Nothing is
//! persisted and nothing is shared between concurrent calls.

pub mod types;

pub use types::{
    unit_interval, Citation, ConsensusResponse, InvalidCitationUrl, TaskId, ValidationResult,
    ValidationStatus, ValidationVerdict, Verdict, Vote, WorkerAssessment, WorkerId,
};
