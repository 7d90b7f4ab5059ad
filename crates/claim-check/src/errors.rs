//! Claim-check error taxonomy.
//!
//! Only two things may fail a claim-check call: an empty claim, and a
//! dispatch the inference dispatcher rejected. Everything else (search,
//! summarizer, polling, malformed miner output, validation) degrades the
//! response instead of failing it.

use thiserror::Error;

/// Failure talking to an external collaborator.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Network failure, timeout, or connection refused.
    #[error("Request failed: {0}")]
    Request(String),

    /// The collaborator answered with a non-success status.
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not match the expected shape.
    #[error("Response parse error: {0}")]
    Parse(String),

    /// No endpoint is configured for this collaborator.
    #[error("Not configured: {0}")]
    Unconfigured(String),
}

impl From<reqwest::Error> for DispatchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Fatal claim-check failure.
#[derive(Debug, Error)]
pub enum ClaimCheckError {
    /// Claim text was empty after trimming; rejected before dispatch.
    #[error("Claim text must not be empty")]
    EmptyClaim,

    /// The claim-check prompt could not be dispatched.
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}
