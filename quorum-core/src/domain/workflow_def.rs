//! `WorkflowDef`: a directed graph of phases (spec §3, §4.6).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The ten pattern types a phase may execute under (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternType {
    Solo,
    Sequential,
    Parallel,
    Loop,
    Hierarchical,
    Network,
    Aggregator,
    Router,
    HumanInTheLoop,
    AdversarialPair,
    AdversarialCascade,
}

/// The four gate kinds (§4.6 "Gate evaluation").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Always,
    AllApproved,
    NoVeto,
    Checkpoint,
}

/// One step in a `WorkflowDef`'s graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub pattern_type: PatternType,
    /// Ordered agent ids. A phase with zero participants is a
    /// `validation_error` at `StartMission` (§8 boundary cases) — enforced by
    /// [`WorkflowDef::validate`], not by this struct alone.
    pub participants: Vec<String>,
    pub gate: GateKind,
    /// Required for `loop`; ignored otherwise. `max_iterations = 0` completes
    /// immediately as `done` with an empty transcript (§8 boundary cases).
    pub max_iterations: Option<u32>,
    pub timeout: Option<Duration>,
    /// Overrides the phase's orchestrator agent (used by `checkpoint` gates
    /// and `hierarchical`/`router` patterns' lead/classifier agent).
    pub orchestrator: Option<String>,
}

impl Phase {
    pub fn new(id: impl Into<String>, pattern_type: PatternType, participants: Vec<String>, gate: GateKind) -> Self {
        Self {
            id: id.into(),
            pattern_type,
            participants,
            gate,
            max_iterations: None,
            timeout: None,
            orchestrator: None,
        }
    }

    pub fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = Some(n);
        self
    }

    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }

    pub fn with_orchestrator(mut self, agent_id: impl Into<String>) -> Self {
        self.orchestrator = Some(agent_id.into());
        self
    }
}

/// A directed graph of phases. Edges are phase-to-phase transitions; the
/// implicit start node is `phases[0]` unless overridden by `entry_phase`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub id: String,
    pub name: String,
    pub phases: Vec<Phase>,
    /// Explicit `from -> to` transitions. A `router` phase's destination is
    /// decided at runtime instead (its entries here are advisory/unused).
    pub edges: Vec<(String, String)>,
    pub entry_phase: Option<String>,
}

impl WorkflowDef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, phases: Vec<Phase>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            phases,
            edges: Vec::new(),
            entry_phase: None,
        }
    }

    pub fn with_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    pub fn phase(&self, id: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == id)
    }

    pub fn entry(&self) -> Option<&Phase> {
        match &self.entry_phase {
            Some(id) => self.phase(id),
            None => self.phases.first(),
        }
    }

    /// Phase that follows `from` along the static edge list. Returns `None`
    /// for a `router` phase (decided dynamically) or when `from` is the last
    /// phase.
    pub fn next_after(&self, from: &str) -> Option<&str> {
        self.edges
            .iter()
            .find(|(f, _)| f == from)
            .map(|(_, t)| t.as_str())
    }

    /// Validates structural invariants that must hold before `StartMission`
    /// can proceed (§8 "Phase with zero participants -> validation_error").
    pub fn validate(&self) -> Result<(), crate::error::OrchestratorError> {
        if self.phases.is_empty() {
            return Err(crate::error::OrchestratorError::Validation(
                "workflow has no phases".to_string(),
            ));
        }
        for phase in &self.phases {
            if phase.participants.is_empty() {
                return Err(crate::error::OrchestratorError::Validation(format!(
                    "phase {} has zero participants",
                    phase.id
                )));
            }
            if phase.pattern_type == PatternType::Loop && phase.max_iterations.is_none() {
                return Err(crate::error::OrchestratorError::Validation(format!(
                    "loop phase {} is missing max_iterations",
                    phase.id
                )));
            }
        }
        Ok(())
    }

    /// Content hash for version-on-change semantics, mirroring `AgentDef`.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.id.hash(&mut hasher);
        self.name.hash(&mut hasher);
        for phase in &self.phases {
            phase.id.hash(&mut hasher);
            phase.pattern_type.hash(&mut hasher);
            phase.participants.hash(&mut hasher);
            phase.gate.hash(&mut hasher);
            phase.max_iterations.hash(&mut hasher);
        }
        self.edges.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkflowDef {
        WorkflowDef::new(
            "w1",
            "Sequential review",
            vec![
                Phase::new("a", PatternType::Solo, vec!["alpha".into()], GateKind::Always),
                Phase::new("b", PatternType::Solo, vec!["beta".into()], GateKind::Always),
            ],
        )
        .with_edge("a", "b")
    }

    #[test]
    fn validate_rejects_zero_participants() {
        let w = WorkflowDef::new(
            "w",
            "n",
            vec![Phase::new("a", PatternType::Solo, vec![], GateKind::Always)],
        );
        assert!(w.validate().is_err());
    }

    #[test]
    fn validate_rejects_loop_without_max_iterations() {
        let w = WorkflowDef::new(
            "w",
            "n",
            vec![Phase::new("a", PatternType::Loop, vec!["alpha".into()], GateKind::Always)],
        );
        assert!(w.validate().is_err());
    }

    #[test]
    fn valid_workflow_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn entry_defaults_to_first_phase() {
        let w = sample();
        assert_eq!(w.entry().unwrap().id, "a");
    }

    #[test]
    fn next_after_follows_edges() {
        let w = sample();
        assert_eq!(w.next_after("a"), Some("b"));
        assert_eq!(w.next_after("b"), None);
    }

    #[test]
    fn content_hash_stable_and_sensitive_to_change() {
        let w1 = sample();
        let w2 = sample();
        assert_eq!(w1.content_hash(), w2.content_hash());
        let mut w3 = sample();
        w3.phases[0].gate = GateKind::NoVeto;
        assert_ne!(w1.content_hash(), w3.content_hash());
    }
}
