//! Claim-check state machine: explicit phases and legal transition guards.
//!
//! Every call walks the same graph, so the transition log of a call tells
//! exactly which phases ran and why. Validation is the only optional phase.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phases of one claim-check call.
///
/// Every call starts at `Preparing` and terminates at `Done` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    /// Validating the request and gathering evidence.
    Preparing,
    /// Prompt accepted by the dispatcher; task id known.
    Dispatched,
    /// Polling the task for miner outputs.
    AwaitingWorkers,
    /// First consensus assembled from the outputs collected so far.
    Aggregated,
    /// Auditing the consensus with the validation agent.
    Validating,
    /// Final re-poll done; consensus rebuilt if stragglers arrived.
    Reaggregated,
    /// Response returned. Terminal.
    Done,
    /// Request rejected or dispatch failed. Terminal.
    Failed,
}

impl CheckState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preparing => "Preparing",
            Self::Dispatched => "Dispatched",
            Self::AwaitingWorkers => "AwaitingWorkers",
            Self::Aggregated => "Aggregated",
            Self::Validating => "Validating",
            Self::Reaggregated => "Reaggregated",
            Self::Done => "Done",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Legal edges:
/// ```text
/// Preparing → Dispatched | Failed
/// Dispatched → AwaitingWorkers | Failed
/// AwaitingWorkers → Aggregated | Failed
/// Aggregated → Validating | Reaggregated | Failed
/// Validating → Reaggregated | Failed
/// Reaggregated → Done | Failed
/// ```
fn is_legal_transition(from: CheckState, to: CheckState) -> bool {
    use CheckState::*;

    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Preparing, Dispatched)
            | (Dispatched, AwaitingWorkers)
            | (AwaitingWorkers, Aggregated)
            // Validation is skipped when no miner produced a parseable answer
            | (Aggregated, Validating)
            | (Aggregated, Reaggregated)
            | (Validating, Reaggregated)
            | (Reaggregated, Done)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: CheckState,
    pub to: CheckState,
    /// Milliseconds since the call started.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, Error)]
#[error("Illegal state transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: CheckState,
    pub to: CheckState,
}

/// Per-call state machine with a transition log.
pub struct StateMachine {
    current: CheckState,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: CheckState::Preparing,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> CheckState {
        self.current
    }

    /// Attempt to advance to the next state.
    pub fn advance(&mut self, to: CheckState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(from = %self.current, to = %to, "State transition");

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Transition to `Failed` from any non-terminal state.
    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(CheckState::Failed, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// One-line history, e.g. `Preparing → Done (12ms, 6 transitions) [...]`.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} → {} ({}ms, {} transitions)",
            CheckState::Preparing,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        );
        if !self.transitions.is_empty() {
            let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
            summary.push_str(&format!(" [{}]", states.join(" → ")));
        }
        summary
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(state: CheckState) -> StateMachine {
        StateMachine {
            current: state,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    #[test]
    fn test_full_path_with_validation() {
        let mut sm = StateMachine::new();
        sm.advance(CheckState::Dispatched, Some("task-1")).unwrap();
        sm.advance(CheckState::AwaitingWorkers, None).unwrap();
        sm.advance(CheckState::Aggregated, Some("3 payloads")).unwrap();
        sm.advance(CheckState::Validating, None).unwrap();
        sm.advance(CheckState::Reaggregated, None).unwrap();
        sm.advance(CheckState::Done, None).unwrap();

        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 6);
        assert_eq!(sm.transitions()[0].reason.as_deref(), Some("task-1"));
    }

    #[test]
    fn test_validation_can_be_skipped() {
        let mut sm = at(CheckState::Aggregated);
        sm.advance(CheckState::Reaggregated, Some("no parsed assessments"))
            .unwrap();
        sm.advance(CheckState::Done, None).unwrap();
        assert_eq!(sm.current(), CheckState::Done);
    }

    #[test]
    fn test_failure_from_any_non_terminal_state() {
        for state in [
            CheckState::Preparing,
            CheckState::Dispatched,
            CheckState::AwaitingWorkers,
            CheckState::Aggregated,
            CheckState::Validating,
            CheckState::Reaggregated,
        ] {
            let mut sm = at(state);
            assert!(sm.fail("dispatch rejected").is_ok());
            assert_eq!(sm.current(), CheckState::Failed);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut sm = at(CheckState::Done);
        let err = sm.advance(CheckState::Validating, None).unwrap_err();
        assert_eq!(err.from, CheckState::Done);
        assert!(sm.fail("late").is_err());
        assert!(at(CheckState::Failed).fail("again").is_err());
    }

    #[test]
    fn test_illegal_transition_message() {
        let err = at(CheckState::Done)
            .advance(CheckState::Validating, None)
            .unwrap_err();
        assert_eq!(err.to_string(), "Illegal state transition: Done → Validating");
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn test_illegal_skips_rejected() {
        let mut sm = StateMachine::new();
        assert!(sm.advance(CheckState::Aggregated, None).is_err());
        assert!(at(CheckState::Validating).advance(CheckState::Done, None).is_err());
        assert!(at(CheckState::Reaggregated).advance(CheckState::Validating, None).is_err());
    }

    #[test]
    fn test_summary_lists_path() {
        let mut sm = StateMachine::new();
        sm.advance(CheckState::Dispatched, None).unwrap();
        sm.fail("boom").unwrap();
        let summary = sm.summary();
        assert!(summary.starts_with("Preparing → Failed"));
        assert!(summary.contains("2 transitions"));
        assert!(summary.contains("[Dispatched → Failed]"));
    }

    #[test]
    fn test_state_serde_snake_case() {
        let json = serde_json::to_string(&CheckState::AwaitingWorkers).unwrap();
        assert_eq!(json, "\"awaiting_workers\"");
    }
}
