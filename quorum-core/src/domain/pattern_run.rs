//! `PatternRun`: runtime incarnation of a `WorkflowDef` for one mission (spec §3).

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::phase_state::PhaseState;

/// Run status. Transitions are checked by [`PatternRun::transition_to`]:
/// pending -> running -> {paused, completed, failed, cancelled}; paused ->
/// running; never backwards out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }

    /// Whether `self -> next` is an allowed transition (§3 invariant).
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            (Running, Paused | Completed | Failed | Cancelled) => true,
            (Paused, Running) => true,
            _ => false,
        }
    }
}

/// A structured error record surfaced on a non-terminal run (§7 "User-visible
/// behaviour": every run carries a public status plus, when non-terminal, a
/// `last_error` structured record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastError {
    pub code: String,
    pub message: String,
    pub phase_id: Option<String>,
}

/// Runtime incarnation of a `WorkflowDef` for one mission.
///
/// Exclusively owned by the Mission Supervisor (C7); the Pattern Engine (C6)
/// borrows it while executing a phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRun {
    pub run_id: String,
    pub workflow_id: String,
    pub status: RunStatus,
    pub current_phase: Option<String>,
    pub phase_states: HashMap<String, PhaseState>,
    pub brief: String,
    pub workspace_path: PathBuf,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub resume_attempts: u32,
    pub last_error: Option<LastError>,
    /// Monotone non-decreasing usage accounting (§3 invariant, P6).
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

impl PatternRun {
    pub fn new(run_id: impl Into<String>, workflow_id: impl Into<String>, brief: impl Into<String>, workspace_path: PathBuf) -> Self {
        let now = chrono::Utc::now();
        Self {
            run_id: run_id.into(),
            workflow_id: workflow_id.into(),
            status: RunStatus::Pending,
            current_phase: None,
            phase_states: HashMap::new(),
            brief: brief.into(),
            workspace_path,
            created_at: now,
            updated_at: now,
            resume_attempts: 0,
            last_error: None,
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
        }
    }

    /// Applies a status transition, rejecting any move that violates §3's
    /// allowed-transitions invariant.
    pub fn transition_to(&mut self, next: RunStatus) -> Result<(), crate::error::OrchestratorError> {
        if !self.status.can_transition_to(next) {
            return Err(crate::error::OrchestratorError::Validation(format!(
                "invalid run status transition {:?} -> {:?}",
                self.status, next
            )));
        }
        self.status = next;
        self.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// Records usage, enforcing monotone non-decreasing counters (P6).
    pub fn record_usage(&mut self, input_tokens: u64, output_tokens: u64, cost: f64) {
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
        self.cost += cost.max(0.0);
        self.updated_at = chrono::Utc::now();
    }

    pub fn set_last_error(&mut self, code: impl Into<String>, message: impl Into<String>, phase_id: Option<String>) {
        self.last_error = Some(LastError {
            code: code.into(),
            message: message.into(),
            phase_id,
        });
    }
}
