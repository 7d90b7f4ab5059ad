use serde::{Deserialize, Serialize};

use crate::errors::ClaimCheckError;

/// Immutable input to one claim-check call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub claim: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub context_url: Option<String>,
    /// Requested miner count; clamped by configuration before dispatch
    #[serde(default)]
    pub num_miners: Option<u32>,
    /// Caller-supplied idempotency / correlation token
    #[serde(default)]
    pub client_reference: Option<String>,
}

impl ClaimRequest {
    pub fn new(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            context: None,
            context_url: None,
            num_miners: None,
            client_reference: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_context_url(mut self, url: impl Into<String>) -> Self {
        self.context_url = Some(url.into());
        self
    }

    pub fn with_num_miners(mut self, n: u32) -> Self {
        self.num_miners = Some(n);
        self
    }

    pub fn with_client_reference(mut self, reference: impl Into<String>) -> Self {
        self.client_reference = Some(reference.into());
        self
    }

    /// Reject blank claims before anything is dispatched.
    pub fn validate(&self) -> Result<(), ClaimCheckError> {
        if self.claim.trim().is_empty() {
            return Err(ClaimCheckError::EmptyClaim);
        }
        Ok(())
    }

    /// Context text, ignoring blank values.
    pub fn context_text(&self) -> Option<&str> {
        self.context
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn context_link(&self) -> Option<&str> {
        self.context_url
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Correlation id: the caller's reference, or a fresh UUID.
    pub fn correlation_id(&self) -> String {
        self.client_reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}
