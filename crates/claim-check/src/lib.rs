//! Claim verification over redundant inference miners.
//!
//! A claim is fanned out to several independent miners through an inference
//! dispatcher. Their free-text answers are reduced to one consensus verdict
//! with curated citations, optionally audited by a validation agent, and
//! returned as a [`ConsensusResponse`](coordination::ConsensusResponse).
//!
//! The pure reduction logic lives in the `coordination` crate; this crate
//! owns the I/O: collaborator clients, polling, timeouts and the CLI.

pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod evidence;
pub mod orchestrator;
pub mod prompts;
pub mod request;
pub mod state_machine;
pub mod validator;

pub use config::{ClaimCheckConfig, Endpoint, PollPolicy};
pub use dispatcher::{DispatchRequest, HttpDispatcher, InferenceDispatcher, TaskSnapshot};
pub use errors::{ClaimCheckError, DispatchError};
pub use evidence::{EvidenceAssembler, EvidenceProvider, SearchHit, UrlSummarizer};
pub use orchestrator::ClaimChecker;
pub use request::ClaimRequest;
pub use validator::ValidationRunner;
