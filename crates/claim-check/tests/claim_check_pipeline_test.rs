//! End-to-end claim-check pipeline tests against in-process collaborators.
//!
//! Every test runs on tokio's paused clock, so poll delays and the
//! validation budget elapse instantly and deterministically.
//!
//! Contracts covered:
//! - Only an empty claim or a rejected dispatch fails the call.
//! - Missing, partial, late and malformed miner output degrades the answer.
//! - Validation is skipped when nothing parsed, and its timeout/error
//!   outcomes never fail the call.
//! - Polling stops on target, budget exhaustion, or cancellation; a per-call
//!   cancel never reaches other calls.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use claim_check::evidence::{EvidenceAssembler, EvidenceProvider, SearchHit};
use claim_check::{
    ClaimCheckConfig, ClaimCheckError, ClaimChecker, ClaimRequest, DispatchError, DispatchRequest,
    Endpoint, InferenceDispatcher, PollPolicy, TaskSnapshot, ValidationRunner,
};
use coordination::{TaskId, ValidationStatus, ValidationVerdict, Verdict};
use tokio_util::sync::CancellationToken;

// ── Mock dispatchers ──────────────────────────────────────────────────────────

/// Replays a script of snapshots; the last entry repeats forever.
/// `None` entries simulate a failed poll.
#[derive(Default)]
struct ScriptedDispatcher {
    reject_dispatch: bool,
    script: Mutex<VecDeque<Option<TaskSnapshot>>>,
    dispatched: Mutex<Vec<DispatchRequest>>,
    polls: Mutex<u32>,
}

impl ScriptedDispatcher {
    fn new(script: Vec<Option<TaskSnapshot>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            reject_dispatch: true,
            ..Default::default()
        })
    }

    fn polls(&self) -> u32 {
        *self.polls.lock().unwrap()
    }

    fn dispatched(&self) -> Vec<DispatchRequest> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceDispatcher for ScriptedDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<TaskId, DispatchError> {
        self.dispatched.lock().unwrap().push(request.clone());
        if self.reject_dispatch {
            return Err(DispatchError::Status {
                status: 503,
                body: "no miners available".into(),
            });
        }
        Ok("task-1".to_string())
    }

    async fn snapshot(&self, task_id: &str) -> Result<TaskSnapshot, DispatchError> {
        assert_eq!(task_id, "task-1");
        *self.polls.lock().unwrap() += 1;

        let mut script = self.script.lock().unwrap();
        let next = if script.len() > 1 {
            script.pop_front().flatten()
        } else {
            script.front().cloned().flatten()
        };
        next.ok_or_else(|| DispatchError::Request("connection reset".into()))
    }
}

/// Validation channel: answers with `output` after `answer_after` polls,
/// or never when `output` is `None`.
#[derive(Default)]
struct AuditDispatcher {
    output: Option<String>,
    fail_dispatch: bool,
    dispatched: Mutex<Vec<DispatchRequest>>,
}

impl AuditDispatcher {
    fn answering(output: &str) -> Arc<Self> {
        Arc::new(Self {
            output: Some(output.to_string()),
            ..Default::default()
        })
    }

    fn silent() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_dispatch: true,
            ..Default::default()
        })
    }

    fn dispatch_count(&self) -> usize {
        self.dispatched.lock().unwrap().len()
    }
}

#[async_trait]
impl InferenceDispatcher for AuditDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<TaskId, DispatchError> {
        self.dispatched.lock().unwrap().push(request.clone());
        if self.fail_dispatch {
            return Err(DispatchError::Request("validation channel refused".into()));
        }
        Ok("audit-1".to_string())
    }

    async fn snapshot(&self, _task_id: &str) -> Result<TaskSnapshot, DispatchError> {
        Ok(TaskSnapshot {
            outputs: self.output.iter().cloned().collect(),
            ..Default::default()
        })
    }
}

struct FixedSearch(Vec<SearchHit>);

#[async_trait]
impl EvidenceProvider for FixedSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, DispatchError> {
        Ok(self.0.clone())
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

const TRUE_HIGH: &str =
    r#"<think>recall the data</think>{"verdict":"true","confidence":0.9,"reasoning":"Well documented."}"#;
const FALSE_LOW: &str = r#"```json
{"verdict":"false","confidence":0.4,"reasoning":"Some sources disagree."}
```"#;
const GARBAGE: &str = "I believe the claim is probably accurate but cannot say more.";

fn config() -> ClaimCheckConfig {
    ClaimCheckConfig {
        dispatch: Endpoint::new("http://dispatch.test"),
        validation: None,
        search: None,
        summarizer: None,
        min_miners: 1,
        max_miners: 5,
        default_miners: 3,
        min_responses: 1,
        poll: PollPolicy {
            max_attempts: 4,
            delay: Duration::from_millis(500),
        },
        validation_timeout: Duration::from_secs(5),
        validation_poll_delay: Duration::from_millis(250),
        http_timeout: Duration::from_secs(5),
    }
}

fn snapshot(outputs: &[&str], assigned: usize) -> Option<TaskSnapshot> {
    Some(TaskSnapshot {
        outputs: outputs.iter().map(|o| o.to_string()).collect(),
        worker_ids: (0..outputs.len()).map(|i| format!("hk-{i}")).collect(),
        assigned_workers: (0..assigned).map(|i| format!("hk-{i}")).collect(),
    })
}

fn checker(dispatcher: Arc<ScriptedDispatcher>) -> ClaimChecker {
    ClaimChecker::new(config(), dispatcher)
}

fn with_audit(dispatcher: Arc<ScriptedDispatcher>, audit: Arc<AuditDispatcher>) -> ClaimChecker {
    let cfg = config();
    let runner = ValidationRunner::new(audit, cfg.validation_timeout, cfg.validation_poll_delay);
    ClaimChecker::new(cfg, dispatcher).with_validator(runner)
}

// ── Failure modes that fail the call ─────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn empty_claim_is_rejected_before_dispatch() {
    let dispatcher = ScriptedDispatcher::new(vec![snapshot(&[TRUE_HIGH], 1)]);
    let result = checker(dispatcher.clone())
        .run_claim_check(&ClaimRequest::new("   "))
        .await;

    assert!(matches!(result, Err(ClaimCheckError::EmptyClaim)));
    assert!(dispatcher.dispatched().is_empty());
    assert_eq!(dispatcher.polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn dispatch_failure_is_fatal() {
    let dispatcher = ScriptedDispatcher::rejecting();
    let result = checker(dispatcher.clone())
        .run_claim_check(&ClaimRequest::new("The Eiffel Tower is in Paris"))
        .await;

    match result {
        Err(ClaimCheckError::Dispatch(DispatchError::Status { status, .. })) => {
            assert_eq!(status, 503)
        }
        other => panic!("expected dispatch failure, got {other:?}"),
    }
    assert_eq!(dispatcher.polls(), 0);
}

// ── Degraded but successful calls ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn no_miner_output_yields_degraded_response() {
    let dispatcher = ScriptedDispatcher::new(vec![snapshot(&[], 3)]);
    let response = checker(dispatcher.clone())
        .run_claim_check(&ClaimRequest::new("claim"))
        .await
        .unwrap();

    assert_eq!(response.verdict, Verdict::Uncertain);
    assert_eq!(response.confidence, 0.3);
    assert_eq!(response.votes.len(), 1);
    assert_eq!(response.miners_responded, 0);
    assert_eq!(response.task_id.as_deref(), Some("task-1"));
    assert!(response.validation.is_none());
    // Full poll budget plus the final re-poll
    assert_eq!(dispatcher.polls(), 5);
}

#[tokio::test(start_paused = true)]
async fn poll_failures_are_absorbed() {
    let dispatcher = ScriptedDispatcher::new(vec![None, None, snapshot(&[TRUE_HIGH], 1)]);
    let response = checker(dispatcher.clone())
        .run_claim_check(&ClaimRequest::new("claim").with_num_miners(1))
        .await
        .unwrap();

    assert_eq!(response.verdict, Verdict::True);
    assert_eq!(dispatcher.polls(), 4);
}

#[tokio::test(start_paused = true)]
async fn partial_results_are_aggregated() {
    let dispatcher = ScriptedDispatcher::new(vec![snapshot(&[TRUE_HIGH, FALSE_LOW], 3)]);
    let response = checker(dispatcher.clone())
        .run_claim_check(&ClaimRequest::new("claim").with_num_miners(3))
        .await
        .unwrap();

    assert_eq!(response.miners_requested, 3);
    assert_eq!(response.miners_responded, 2);
    assert_eq!(response.verdict, Verdict::True);
    assert_eq!(response.confidence, 0.9);
    assert_eq!(response.disagreement, 1.0);
    assert_eq!(response.votes[0].verdict, Verdict::True);
    assert_eq!(response.votes[1].verdict, Verdict::False);
    assert_eq!(dispatcher.polls(), 5);
}

#[tokio::test(start_paused = true)]
async fn polling_stops_once_target_is_met() {
    let dispatcher =
        ScriptedDispatcher::new(vec![snapshot(&[TRUE_HIGH], 2), snapshot(&[TRUE_HIGH, FALSE_LOW], 2)]);
    let response = checker(dispatcher.clone())
        .run_claim_check(&ClaimRequest::new("claim").with_num_miners(2))
        .await
        .unwrap();

    assert_eq!(response.miners_responded, 2);
    // Two polls to reach the target, one final re-poll
    assert_eq!(dispatcher.polls(), 3);
}

#[tokio::test(start_paused = true)]
async fn late_straggler_is_reaggregated() {
    let mut script = vec![snapshot(&[FALSE_LOW], 2); 4];
    script.push(snapshot(&[FALSE_LOW, TRUE_HIGH], 2));
    let dispatcher = ScriptedDispatcher::new(script);

    let response = checker(dispatcher)
        .run_claim_check(&ClaimRequest::new("claim").with_num_miners(2))
        .await
        .unwrap();

    assert_eq!(response.miners_responded, 2);
    assert_eq!(response.verdict, Verdict::True);
    assert_eq!(response.votes.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn empty_final_snapshot_keeps_previous_aggregate() {
    let mut script = vec![snapshot(&[TRUE_HIGH], 2); 4];
    script.push(None);
    script.push(snapshot(&[], 2));
    let dispatcher = ScriptedDispatcher::new(script);

    let response = checker(dispatcher)
        .run_claim_check(&ClaimRequest::new("claim").with_num_miners(2))
        .await
        .unwrap();

    assert_eq!(response.miners_responded, 1);
    assert_eq!(response.verdict, Verdict::True);
}

#[tokio::test(start_paused = true)]
async fn miner_count_is_clamped() {
    let dispatcher = ScriptedDispatcher::new(vec![snapshot(&[TRUE_HIGH], 1)]);
    let response = checker(dispatcher.clone())
        .run_claim_check(&ClaimRequest::new("claim").with_num_miners(50))
        .await
        .unwrap();

    assert_eq!(dispatcher.dispatched()[0].worker_count, 5);
    assert_eq!(response.miners_requested, 5);
}

#[tokio::test(start_paused = true)]
async fn correlation_id_follows_client_reference() {
    let dispatcher = ScriptedDispatcher::new(vec![snapshot(&[TRUE_HIGH], 1)]);
    let response = checker(dispatcher.clone())
        .run_claim_check(&ClaimRequest::new("claim").with_client_reference("ref-7"))
        .await
        .unwrap();

    assert_eq!(dispatcher.dispatched()[0].correlation_id, "ref-7");
    assert_eq!(response.correlation_id.as_deref(), Some("ref-7"));
}

#[tokio::test(start_paused = true)]
async fn cancellation_ends_polling_early() {
    let dispatcher = ScriptedDispatcher::new(vec![snapshot(&[TRUE_HIGH], 3)]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let response = checker(dispatcher.clone())
        .with_cancellation(cancel)
        .run_claim_check(&ClaimRequest::new("claim").with_num_miners(3))
        .await
        .unwrap();

    assert_eq!(response.miners_responded, 1);
    // One poll before the cancellation is observed, one final re-poll
    assert_eq!(dispatcher.polls(), 2);
}

#[tokio::test(start_paused = true)]
async fn per_call_cancellation_leaves_later_calls_untouched() {
    let dispatcher = ScriptedDispatcher::new(vec![snapshot(&[TRUE_HIGH], 3)]);
    let shutdown = CancellationToken::new();
    let checker = checker(dispatcher.clone()).with_cancellation(shutdown.clone());
    let request = ClaimRequest::new("claim").with_num_miners(3);

    let call = CancellationToken::new();
    call.cancel();
    checker
        .run_claim_check_with_cancel(&request, &call)
        .await
        .unwrap();
    assert_eq!(dispatcher.polls(), 2);
    assert!(!shutdown.is_cancelled());

    // Full budget of four polls plus the final re-poll
    checker.run_claim_check(&request).await.unwrap();
    assert_eq!(dispatcher.polls(), 7);
}

#[tokio::test(start_paused = true)]
async fn evidence_citations_are_curated_into_response() {
    let dispatcher = ScriptedDispatcher::new(vec![snapshot(&[TRUE_HIGH], 1)]);
    let search = FixedSearch(vec![
        SearchHit {
            source: "NASA".into(),
            url: "https://www.nasa.gov/moon".into(),
            description: "Apollo sample analysis".into(),
        },
        SearchHit {
            source: "Some Blog".into(),
            url: "https://example-blog.test/x".into(),
            description: "opinion".into(),
        },
    ]);

    let response = checker(dispatcher.clone())
        .with_evidence(EvidenceAssembler::new(Some(Arc::new(search)), None))
        .run_claim_check(&ClaimRequest::new("The moon is made of rock").with_num_miners(1))
        .await
        .unwrap();

    assert_eq!(response.citations.len(), 1);
    assert_eq!(response.citations[0].source(), "NASA");
    assert!(dispatcher.dispatched()[0].prompt.contains("## WEB EVIDENCE"));
}

// ── Validation ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn validation_skipped_when_nothing_parsed() {
    let dispatcher = ScriptedDispatcher::new(vec![snapshot(&[GARBAGE, GARBAGE], 2)]);
    let audit = AuditDispatcher::answering(r#"{"verdict":"normal","score":9}"#);

    let response = with_audit(dispatcher, audit.clone())
        .run_claim_check(&ClaimRequest::new("claim").with_num_miners(2))
        .await
        .unwrap();

    assert_eq!(audit.dispatch_count(), 0);
    assert!(response.validation.is_none());
    assert_eq!(response.verdict, Verdict::Uncertain);
    assert!(response.votes.iter().all(|v| !v.parsed));
}

#[tokio::test(start_paused = true)]
async fn unconfigured_validation_is_skipped() {
    let dispatcher = ScriptedDispatcher::new(vec![snapshot(&[TRUE_HIGH], 1)]);
    let response = checker(dispatcher)
        .run_claim_check(&ClaimRequest::new("claim").with_num_miners(1))
        .await
        .unwrap();

    let validation = response.validation.unwrap();
    assert_eq!(validation.status, ValidationStatus::Skipped);
    assert_eq!(validation.verdict, ValidationVerdict::Inconclusive);
    assert_eq!(validation.score, 0);
}

#[tokio::test(start_paused = true)]
async fn validation_result_is_attached() {
    let dispatcher = ScriptedDispatcher::new(vec![snapshot(&[TRUE_HIGH], 1)]);
    let audit = AuditDispatcher::answering(
        "<think>looks fine</think>{\"verdict\":\"normal\",\"score\":8.4,\"notes\":\"Consistent.\"}",
    );

    let response = with_audit(dispatcher, audit.clone())
        .run_claim_check(
            &ClaimRequest::new("claim")
                .with_num_miners(1)
                .with_client_reference("ref-1"),
        )
        .await
        .unwrap();

    let validation = response.validation.unwrap();
    assert_eq!(validation.status, ValidationStatus::Ok);
    assert_eq!(validation.verdict, ValidationVerdict::Normal);
    assert_eq!(validation.score, 8);
    assert_eq!(validation.notes, "Consistent.");
    assert_eq!(validation.correlation_id.as_deref(), Some("ref-1-audit"));
    assert_eq!(validation.task_id.as_deref(), Some("audit-1"));

    let sent = audit.dispatched.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].worker_count, 1);
    assert_eq!(sent[0].correlation_id, "ref-1-audit");
    assert!(sent[0].prompt.contains("## AGGREGATED RESULT"));
}

#[tokio::test(start_paused = true)]
async fn validation_timeout_does_not_block_the_call() {
    let dispatcher = ScriptedDispatcher::new(vec![snapshot(&[TRUE_HIGH], 1)]);
    let response = with_audit(dispatcher, AuditDispatcher::silent())
        .run_claim_check(
            &ClaimRequest::new("claim")
                .with_num_miners(1)
                .with_client_reference("ref-9"),
        )
        .await
        .unwrap();

    let validation = response.validation.unwrap();
    assert_eq!(validation.status, ValidationStatus::Timeout);
    assert_eq!(validation.verdict, ValidationVerdict::Inconclusive);
    assert_eq!(validation.score, 0);
    assert!(validation.notes.contains("5s"));
    assert_eq!(validation.correlation_id.as_deref(), Some("ref-9-audit"));
    // The audit was accepted before the budget ran out
    assert_eq!(validation.task_id.as_deref(), Some("audit-1"));
    assert_eq!(response.verdict, Verdict::True);
}

#[tokio::test(start_paused = true)]
async fn validation_error_is_recorded() {
    let dispatcher = ScriptedDispatcher::new(vec![snapshot(&[TRUE_HIGH], 1)]);
    let response = with_audit(dispatcher, AuditDispatcher::failing())
        .run_claim_check(
            &ClaimRequest::new("claim")
                .with_num_miners(1)
                .with_client_reference("ref-9"),
        )
        .await
        .unwrap();

    let validation = response.validation.unwrap();
    assert_eq!(validation.status, ValidationStatus::Error);
    assert!(validation.notes.contains("validation channel refused"));
    assert_eq!(validation.correlation_id.as_deref(), Some("ref-9-audit"));
    assert_eq!(validation.task_id, None);
}

// ── Concurrency ──────────────────────────────────────────────────────────────

/// Task id mirrors the correlation id; each task answers with its own verdict.
struct PerTaskDispatcher;

#[async_trait]
impl InferenceDispatcher for PerTaskDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<TaskId, DispatchError> {
        Ok(request.correlation_id.clone())
    }

    async fn snapshot(&self, task_id: &str) -> Result<TaskSnapshot, DispatchError> {
        let verdict = if task_id == "yes" { "true" } else { "false" };
        Ok(TaskSnapshot {
            outputs: vec![format!(r#"{{"verdict":"{verdict}","confidence":0.8}}"#)],
            worker_ids: vec![format!("{task_id}-miner")],
            assigned_workers: vec![format!("{task_id}-miner")],
        })
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_are_independent() {
    let checker = ClaimChecker::new(config(), Arc::new(PerTaskDispatcher));
    let yes = ClaimRequest::new("a").with_client_reference("yes");
    let no = ClaimRequest::new("b").with_client_reference("no");

    let (a, b) = tokio::join!(checker.run_claim_check(&yes), checker.run_claim_check(&no));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.verdict, Verdict::True);
    assert_eq!(a.votes[0].worker_id, "yes-miner");
    assert_eq!(b.verdict, Verdict::False);
    assert_eq!(b.votes[0].worker_id, "no-miner");
}
