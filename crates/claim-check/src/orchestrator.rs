//! Claim-check orchestration: dispatch, poll, aggregate, audit, re-poll.
//!
//! One call owns all of its bookkeeping (the [`TaskLedger`] and the
//! [`StateMachine`]), so concurrent calls against the same dispatcher share
//! nothing but the collaborator clients.

use std::collections::BTreeMap;
use std::sync::Arc;

use coordination::{
    assemble_consensus, extract_assessment, ConsensusResponse, TaskId, WorkerAssessment, WorkerId,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClaimCheckConfig;
use crate::dispatcher::{DispatchRequest, HttpDispatcher, InferenceDispatcher, TaskSnapshot};
use crate::errors::{ClaimCheckError, DispatchError};
use crate::evidence::{
    EvidenceAssembler, EvidenceProvider, HttpEvidenceProvider, HttpUrlSummarizer, UrlSummarizer,
};
use crate::prompts::build_claim_prompt;
use crate::request::ClaimRequest;
use crate::state_machine::{CheckState, StateMachine};
use crate::validator::ValidationRunner;

/// Payloads collected for one dispatched task, keyed by worker id.
#[derive(Debug, Default)]
struct TaskLedger {
    payloads: BTreeMap<WorkerId, String>,
    /// Largest assigned-worker count any snapshot reported
    assigned: usize,
}

impl TaskLedger {
    /// Merge a snapshot; returns how many new payloads it contributed.
    ///
    /// Blank outputs are not payloads. The first output seen for a worker wins.
    fn absorb(&mut self, snapshot: &TaskSnapshot) -> usize {
        self.assigned = self.assigned.max(snapshot.assigned_workers.len());

        let mut added = 0;
        for (i, output) in snapshot.outputs.iter().enumerate() {
            if output.trim().is_empty() {
                continue;
            }
            let worker_id = snapshot
                .worker_ids
                .get(i)
                .map(|id| id.trim())
                .filter(|id| !id.is_empty())
                .map(String::from)
                .unwrap_or_else(|| format!("miner-{}", i + 1));

            if !self.payloads.contains_key(&worker_id) {
                self.payloads.insert(worker_id, output.clone());
                added += 1;
            }
        }
        added
    }

    fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Payloads needed before polling stops early.
    fn target(&self, min_responses: u32, requested: u32) -> usize {
        let expected = if self.assigned > 0 {
            self.assigned
        } else {
            requested as usize
        };
        expected.max(min_responses as usize)
    }

    /// Extract every payload; the flag is true when any of them parsed.
    fn assessments(&self) -> (Vec<WorkerAssessment>, bool) {
        let mut any_parsed = false;
        let assessments = self
            .payloads
            .iter()
            .enumerate()
            .map(|(i, (worker_id, raw))| {
                let extraction = extract_assessment(raw, worker_id, i);
                any_parsed |= extraction.is_parsed();
                extraction.into_assessment()
            })
            .collect();
        (assessments, any_parsed)
    }
}

/// Runs claim-check calls against an inference dispatcher.
pub struct ClaimChecker {
    config: ClaimCheckConfig,
    dispatcher: Arc<dyn InferenceDispatcher>,
    evidence: EvidenceAssembler,
    validator: ValidationRunner,
    cancel: CancellationToken,
}

impl ClaimChecker {
    /// Checker with no evidence sources and no validation channel.
    pub fn new(config: ClaimCheckConfig, dispatcher: Arc<dyn InferenceDispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            evidence: EvidenceAssembler::default(),
            validator: ValidationRunner::disabled(),
            cancel: CancellationToken::new(),
        }
    }

    /// Build every collaborator from the configured HTTP endpoints.
    pub fn from_config(config: ClaimCheckConfig) -> Result<Self, DispatchError> {
        let timeout = config.http_timeout;
        let dispatcher: Arc<dyn InferenceDispatcher> =
            Arc::new(HttpDispatcher::new(config.dispatch.clone(), timeout)?);

        let search = match config.search.clone() {
            Some(ep) => {
                Some(Arc::new(HttpEvidenceProvider::new(ep, timeout)?) as Arc<dyn EvidenceProvider>)
            }
            None => None,
        };
        let summarizer = match config.summarizer.clone() {
            Some(ep) => {
                Some(Arc::new(HttpUrlSummarizer::new(ep, timeout)?) as Arc<dyn UrlSummarizer>)
            }
            None => None,
        };
        let validator = match config.validation.clone() {
            Some(ep) => ValidationRunner::new(
                Arc::new(HttpDispatcher::new(ep, timeout)?),
                config.validation_timeout,
                config.validation_poll_delay,
            ),
            None => ValidationRunner::disabled(),
        };

        Ok(Self::new(config, dispatcher)
            .with_evidence(EvidenceAssembler::new(search, summarizer))
            .with_validator(validator))
    }

    pub fn with_evidence(mut self, evidence: EvidenceAssembler) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_validator(mut self, validator: ValidationRunner) -> Self {
        self.validator = validator;
        self
    }

    /// Checker-wide shutdown token. Cancelling it ends polling early for
    /// every call in flight; each call then proceeds with whatever payloads
    /// it already has. Use [`Self::run_claim_check_with_cancel`] to stop a
    /// single call.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ClaimCheckConfig {
        &self.config
    }

    /// Check one claim end to end.
    ///
    /// Fails only on an empty claim or a rejected dispatch. Missing miners,
    /// malformed output, poll errors and validation problems all degrade the
    /// response instead.
    pub async fn run_claim_check(
        &self,
        request: &ClaimRequest,
    ) -> Result<ConsensusResponse, ClaimCheckError> {
        self.run_claim_check_with_cancel(request, &CancellationToken::new()).await
    }

    /// [`Self::run_claim_check`] with a token scoped to this call.
    ///
    /// Cancelling `cancel` ends polling for this call only. The checker-wide
    /// token still applies.
    pub async fn run_claim_check_with_cancel(
        &self,
        request: &ClaimRequest,
        cancel: &CancellationToken,
    ) -> Result<ConsensusResponse, ClaimCheckError> {
        let mut sm = StateMachine::new();

        if let Err(e) = request.validate() {
            let _ = sm.fail("empty claim");
            return Err(e);
        }

        let claim = request.claim.trim();
        let correlation_id = request.correlation_id();
        let miners = self.config.clamp_miners(request.num_miners);

        let evidence = self.evidence.assemble(request).await;
        let prompt = build_claim_prompt(claim, evidence.context.as_deref(), &evidence.prompt_block);

        let dispatch = DispatchRequest {
            prompt,
            worker_count: miners,
            correlation_id: correlation_id.clone(),
        };
        let task_id = match self.dispatcher.dispatch(&dispatch).await {
            Ok(id) => id,
            Err(e) => {
                warn!(correlation_id = %correlation_id, error = %e, "Dispatch failed");
                let _ = sm.fail(&e.to_string());
                return Err(e.into());
            }
        };
        info!(
            task_id = %task_id,
            correlation_id = %correlation_id,
            miners,
            citations = evidence.citations.len(),
            "Claim dispatched"
        );
        self.advance(&mut sm, CheckState::Dispatched, Some(task_id.as_str()));

        // Awaiting workers
        self.advance(&mut sm, CheckState::AwaitingWorkers, None);
        let mut ledger = TaskLedger::default();
        self.await_workers(&task_id, miners, &mut ledger, cancel).await;

        // Aggregated
        let (assessments, any_parsed) = ledger.assessments();
        let mut consensus = assemble_consensus(&assessments, &evidence.citations);
        let reason = format!("{} payloads", ledger.len());
        self.advance(&mut sm, CheckState::Aggregated, Some(reason.as_str()));

        // Validating
        let validation = if any_parsed {
            self.advance(&mut sm, CheckState::Validating, None);
            debug!(
                task_id = %task_id,
                configured = self.validator.is_configured(),
                "Validating consensus"
            );
            Some(
                self.validator
                    .validate(claim, evidence.context.as_deref(), &consensus, &correlation_id)
                    .await,
            )
        } else {
            debug!(task_id = %task_id, "No parsed assessments, skipping validation");
            None
        };

        // Reaggregated: one last look for stragglers
        let late = match self.dispatcher.snapshot(&task_id).await {
            Ok(snapshot) => ledger.absorb(&snapshot),
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Final snapshot failed, keeping aggregate");
                0
            }
        };
        if late > 0 {
            info!(task_id = %task_id, late, "Late miner outputs arrived, reaggregating");
            let (assessments, _) = ledger.assessments();
            consensus = assemble_consensus(&assessments, &evidence.citations);
        }
        let reason = format!("{late} late payloads");
        self.advance(&mut sm, CheckState::Reaggregated, Some(reason.as_str()));

        let response = consensus
            .with_validation(validation)
            .with_miners_requested(miners)
            .with_task(task_id, correlation_id);

        self.advance(&mut sm, CheckState::Done, None);
        info!(
            verdict = %response.verdict,
            confidence = response.confidence,
            responded = response.miners_responded,
            requested = miners,
            path = %sm.summary(),
            "Claim check complete"
        );
        Ok(response)
    }

    /// Poll until the target payload count is met, the attempt budget runs
    /// out, or the call is cancelled.
    async fn await_workers(
        &self,
        task_id: &TaskId,
        requested: u32,
        ledger: &mut TaskLedger,
        cancel: &CancellationToken,
    ) {
        let policy = self.config.poll;

        for attempt in 1..=policy.max_attempts {
            match self.dispatcher.snapshot(task_id).await {
                Ok(snapshot) => {
                    let added = ledger.absorb(&snapshot);
                    debug!(
                        task_id = %task_id,
                        attempt,
                        outputs = snapshot.payload_count(),
                        added,
                        "Snapshot received"
                    );
                }
                Err(e) => {
                    warn!(task_id = %task_id, attempt, error = %e, "Poll failed");
                }
            }

            let target = ledger.target(self.config.min_responses, requested);
            debug!(task_id = %task_id, attempt, received = ledger.len(), target, "Polled task");
            if ledger.len() >= target {
                return;
            }
            if attempt == policy.max_attempts {
                break;
            }

            tokio::select! {
                biased;
                _ = either_cancelled(&self.cancel, cancel) => {
                    info!(task_id = %task_id, received = ledger.len(), "Polling cancelled, using partial results");
                    return;
                }
                _ = tokio::time::sleep(policy.delay) => {}
            }
        }

        info!(
            task_id = %task_id,
            received = ledger.len(),
            attempts = policy.max_attempts,
            "Poll budget exhausted, using partial results"
        );
    }

    /// Transitions are fixed by the call sequence above; an illegal one is a
    /// bug and is logged rather than failing the call.
    fn advance(&self, sm: &mut StateMachine, to: CheckState, reason: Option<&str>) {
        if let Err(e) = sm.advance(to, reason) {
            warn!(error = %e, "State machine rejected transition");
        }
    }
}

/// Resolves once either token is cancelled.
async fn either_cancelled(shutdown: &CancellationToken, call: &CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = call.cancelled() => {}
    }
}
