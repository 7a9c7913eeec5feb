//! `PhaseState`: runtime state of one phase within a `PatternRun` (spec §3).

use serde::{Deserialize, Serialize};

/// A phase never resumes after `Done` or `Vetoed` (§3 invariant, P2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Approved,
    Vetoed,
    TimedOut,
    Done,
}

impl PhaseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PhaseStatus::Vetoed | PhaseStatus::Done | PhaseStatus::TimedOut)
    }
}

/// Structured compliance verdict computed at a phase boundary (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub verdict: String,
    pub rationale: String,
    pub violations: Vec<String>,
    /// Set when an L2 (architectural) veto in an adversarial-cascade phase
    /// terminates the phase with escalation rather than a silent veto
    /// (Design Notes, L2 veto rule).
    pub escalated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseState {
    pub state: PhaseStatus,
    pub iteration: u32,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub verdict: Option<Verdict>,
    pub summary: Option<String>,
}

impl Default for PhaseState {
    fn default() -> Self {
        Self {
            state: PhaseStatus::Pending,
            iteration: 0,
            started_at: None,
            completed_at: None,
            verdict: None,
            summary: None,
        }
    }
}

impl PhaseState {
    pub fn start(&mut self) -> Result<(), crate::error::OrchestratorError> {
        if self.state.is_terminal() {
            return Err(crate::error::OrchestratorError::Validation(format!(
                "phase already terminal ({:?}), cannot restart",
                self.state
            )));
        }
        self.state = PhaseStatus::Running;
        self.started_at.get_or_insert(chrono::Utc::now());
        Ok(())
    }

    pub fn finish(&mut self, state: PhaseStatus) -> Result<(), crate::error::OrchestratorError> {
        if self.state.is_terminal() {
            return Err(crate::error::OrchestratorError::Validation(
                "phase already reached a terminal state".to_string(),
            ));
        }
        self.state = state;
        self.completed_at = Some(chrono::Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_sets_running_and_started_at() {
        let mut p = PhaseState::default();
        p.start().unwrap();
        assert_eq!(p.state, PhaseStatus::Running);
        assert!(p.started_at.is_some());
    }

    #[test]
    fn terminal_phase_cannot_restart() {
        let mut p = PhaseState::default();
        p.start().unwrap();
        p.finish(PhaseStatus::Done).unwrap();
        assert!(p.start().is_err());
    }

    #[test]
    fn vetoed_phase_cannot_finish_again() {
        let mut p = PhaseState::default();
        p.start().unwrap();
        p.finish(PhaseStatus::Vetoed).unwrap();
        assert!(p.finish(PhaseStatus::Done).is_err());
    }
}
