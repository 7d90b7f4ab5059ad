use std::time::Duration;

/// An HTTP collaborator endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub api_key: Option<String>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn from_env(url_var: &str, key_var: &str) -> Option<Self> {
        let url = std::env::var(url_var).ok().filter(|u| !u.trim().is_empty())?;
        Some(Self {
            url: url.trim_end_matches('/').to_string(),
            api_key: std::env::var(key_var).ok().filter(|k| !k.is_empty()),
        })
    }
}

/// Polling budget for a dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum snapshot fetches before proceeding with partial results.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

/// Top-level claim-check configuration.
#[derive(Debug, Clone)]
pub struct ClaimCheckConfig {
    /// Inference dispatcher for the claim-check prompt
    pub dispatch: Endpoint,
    /// Separate channel for the audit prompt (optional)
    pub validation: Option<Endpoint>,
    /// Web evidence provider (optional)
    pub search: Option<Endpoint>,
    /// URL summarizer (optional)
    pub summarizer: Option<Endpoint>,
    pub min_miners: u32,
    pub max_miners: u32,
    pub default_miners: u32,
    /// Payloads required before polling may stop early
    pub min_responses: u32,
    pub poll: PollPolicy,
    /// Wall-clock budget for the validation pass
    pub validation_timeout: Duration,
    /// Delay between polls of the audit task
    pub validation_poll_delay: Duration,
    /// Per-request HTTP timeout
    pub http_timeout: Duration,
}

impl Default for ClaimCheckConfig {
    fn default() -> Self {
        let min_miners = u32_from_env("CLAIM_MIN_MINERS", 1);
        let max_miners = u32_from_env("CLAIM_MAX_MINERS", 10).max(min_miners);
        let default_miners = u32_from_env("CLAIM_DEFAULT_MINERS", 3).clamp(min_miners, max_miners);

        Self {
            dispatch: Endpoint::from_env("CLAIM_DISPATCH_URL", "CLAIM_DISPATCH_API_KEY")
                .unwrap_or_else(|| Endpoint::new("http://127.0.0.1:8400")),
            validation: Endpoint::from_env("CLAIM_VALIDATION_URL", "CLAIM_VALIDATION_API_KEY"),
            search: Endpoint::from_env("CLAIM_SEARCH_URL", "CLAIM_SEARCH_API_KEY"),
            summarizer: Endpoint::from_env("CLAIM_SUMMARIZE_URL", "CLAIM_SUMMARIZE_API_KEY"),
            min_miners,
            max_miners,
            default_miners,
            min_responses: u32_from_env("CLAIM_MIN_RESPONSES", 1),
            poll: PollPolicy {
                max_attempts: u32_from_env("CLAIM_POLL_ATTEMPTS", 20),
                delay: millis_from_env("CLAIM_POLL_DELAY_MS", 1500),
            },
            validation_timeout: secs_from_env("CLAIM_VALIDATION_TIMEOUT_SECS", 45),
            validation_poll_delay: millis_from_env("CLAIM_VALIDATION_POLL_DELAY_MS", 1000),
            http_timeout: secs_from_env("CLAIM_HTTP_TIMEOUT_SECS", 30),
        }
    }
}

impl ClaimCheckConfig {
    /// Clamp a requested miner count into `[min_miners, max_miners]`.
    pub fn clamp_miners(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_miners)
            .clamp(self.min_miners, self.max_miners.max(self.min_miners))
    }
}

fn u32_from_env(var: &str, default: u32) -> u32 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn secs_from_env(var: &str, default_secs: u64) -> Duration {
    Duration::from_secs(u64::from(u32_from_env(var, default_secs as u32)))
}

fn millis_from_env(var: &str, default_ms: u64) -> Duration {
    Duration::from_millis(u64::from(u32_from_env(var, default_ms as u32)))
}

/// Check if a collaborator endpoint is reachable (GET /health).
pub async fn check_endpoint(url: &str) -> bool {
    let health_url = format!("{url}/health");
    match reqwest::Client::new()
        .get(&health_url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
