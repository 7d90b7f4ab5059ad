use std::sync::Arc;
use std::time::Duration;

use coordination::ensemble::truncate_chars;
use coordination::{parse_validation_output, ConsensusResponse, TaskId, ValidationResult};
use tracing::{info, warn};

use crate::dispatcher::{DispatchRequest, InferenceDispatcher};
use crate::errors::DispatchError;
use crate::prompts::build_audit_prompt;

/// Maximum characters of an error message kept in the validation notes.
const MAX_ERROR_NOTE_CHARS: usize = 200;

/// The validation agent: a single-worker audit of the assembled consensus.
///
/// The audit runs on its own dispatcher channel. The whole dispatch-and-wait
/// is raced against a wall-clock budget; when the budget wins, the audit
/// task is dropped and never awaited again.
#[derive(Clone)]
pub struct ValidationRunner {
    dispatcher: Option<Arc<dyn InferenceDispatcher>>,
    timeout: Duration,
    poll_delay: Duration,
}

impl ValidationRunner {
    pub fn new(
        dispatcher: Arc<dyn InferenceDispatcher>,
        timeout: Duration,
        poll_delay: Duration,
    ) -> Self {
        Self {
            dispatcher: Some(dispatcher),
            timeout,
            poll_delay,
        }
    }

    /// Runner without a validation channel; every call returns `skipped`.
    pub fn disabled() -> Self {
        Self {
            dispatcher: None,
            timeout: Duration::ZERO,
            poll_delay: Duration::ZERO,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.dispatcher.is_some()
    }

    /// Audit `consensus`. Never fails; every outcome is a [`ValidationResult`].
    pub async fn validate(
        &self,
        claim: &str,
        context: Option<&str>,
        consensus: &ConsensusResponse,
        correlation_id: &str,
    ) -> ValidationResult {
        let Some(dispatcher) = self.dispatcher.as_ref() else {
            return ValidationResult::skipped();
        };

        let request = DispatchRequest {
            prompt: build_audit_prompt(claim, context, consensus),
            worker_count: 1,
            correlation_id: format!("{correlation_id}-audit"),
        };

        let mut audit_task: Option<TaskId> = None;
        let wait = self.dispatch_and_wait(dispatcher.as_ref(), &request, &mut audit_task);
        let outcome = tokio::time::timeout(self.timeout, wait).await;

        let result = match outcome {
            Ok(Ok(raw)) => {
                let result = parse_validation_output(&raw);
                info!(
                    verdict = %result.verdict,
                    score = result.score,
                    "Validation complete"
                );
                result
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Validation failed");
                ValidationResult::failed(truncate_chars(&e.to_string(), MAX_ERROR_NOTE_CHARS))
            }
            Err(_) => {
                warn!("Validation timed out ({}s)", self.timeout.as_secs());
                ValidationResult::timed_out(self.timeout.as_secs())
            }
        };

        let result = result.with_correlation_id(request.correlation_id);
        match audit_task {
            Some(task_id) => result.with_task_id(task_id),
            None => result,
        }
    }

    /// Dispatch the audit and poll until the first non-blank output arrives.
    ///
    /// The accepted task id is written to `audit_task` before polling starts,
    /// so it survives a timeout that drops this future.
    async fn dispatch_and_wait(
        &self,
        dispatcher: &dyn InferenceDispatcher,
        request: &DispatchRequest,
        audit_task: &mut Option<TaskId>,
    ) -> Result<String, DispatchError> {
        let task_id = dispatcher.dispatch(request).await?;
        *audit_task = Some(task_id.clone());
        loop {
            let snapshot = dispatcher.snapshot(&task_id).await?;
            if let Some(output) = snapshot.outputs.into_iter().find(|o| !o.trim().is_empty()) {
                return Ok(output);
            }
            tokio::time::sleep(self.poll_delay).await;
        }
    }
}
