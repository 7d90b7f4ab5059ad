use anyhow::{Context, Result};
use clap::Parser;
use claim_check::config::check_endpoint;
use claim_check::{ClaimCheckConfig, ClaimChecker, ClaimRequest};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Check a factual claim against an ensemble of inference miners
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The claim to verify
    claim: String,

    /// Additional context supplied with the claim
    #[arg(long)]
    context: Option<String>,

    /// URL whose summary is used as context when --context is absent
    #[arg(long)]
    context_url: Option<String>,

    /// Number of miners to query (clamped to CLAIM_MIN_MINERS..=CLAIM_MAX_MINERS)
    #[arg(long)]
    miners: Option<u32>,

    /// Client reference used as the correlation id
    #[arg(long)]
    reference: Option<String>,

    /// Pretty-print the JSON response
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ClaimCheckConfig::default();
    info!(
        dispatch = %config.dispatch.url,
        validation = config.validation.is_some(),
        search = config.search.is_some(),
        summarizer = config.summarizer.is_some(),
        prompt_version = claim_check::prompts::PROMPT_VERSION,
        "Claim check starting"
    );

    if !check_endpoint(&config.dispatch.url).await {
        warn!(url = %config.dispatch.url, "Dispatcher health check failed, trying anyway");
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing with partial results");
            on_ctrl_c.cancel();
        }
    });

    let checker = ClaimChecker::from_config(config)
        .context("Failed to build collaborator clients")?
        .with_cancellation(cancel);

    let mut request = ClaimRequest::new(args.claim);
    request.context = args.context;
    request.context_url = args.context_url;
    request.num_miners = args.miners;
    request.client_reference = args.reference;

    let response = checker
        .run_claim_check(&request)
        .await
        .context("Claim check failed")?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{json}");

    Ok(())
}
