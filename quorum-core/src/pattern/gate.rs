//! Gate evaluation (spec §4.6 "Gate evaluation", §4.6 "Tie-breaks", P3).

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;

use crate::domain::{AgentDef, GateKind, Message, MessageKind, VetoClass};

/// Result of evaluating a phase's gate over its transcript.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub passed: bool,
    /// Set when an `absolute`-class agent's veto dominates (P3): the phase
    /// must flip to `vetoed` regardless of the gate kind's own verdict.
    pub absolute_veto: Option<String>,
}

/// Last (non-overridable) vote per participant: an `absolute` agent's veto is
/// sticky and cannot be undone by a later `approve` from the same agent
/// (§4.6 "Tie-breaks").
fn effective_votes(transcript: &[Message], participants: &[String], agents: &DashMap<String, AgentDef>) -> HashMap<String, MessageKind> {
    let mut last: HashMap<String, MessageKind> = HashMap::new();
    let mut sticky_veto: HashSet<String> = HashSet::new();

    for msg in transcript {
        if !matches!(msg.kind, MessageKind::Approve | MessageKind::Veto) {
            continue;
        }
        if !participants.iter().any(|p| p == &msg.from_agent) {
            continue;
        }
        last.insert(msg.from_agent.clone(), msg.kind);
        if msg.kind == MessageKind::Veto {
            if let Some(agent) = agents.get(&msg.from_agent) {
                if agent.veto_class == VetoClass::Absolute {
                    sticky_veto.insert(msg.from_agent.clone());
                }
            }
        }
    }

    for agent_id in &sticky_veto {
        last.insert(agent_id.clone(), MessageKind::Veto);
    }

    last
}

/// Evaluates `gate` over `transcript` for `participants`. `checkpoint_vote`
/// is the last approve/veto from the phase's distinguished orchestrator, used
/// only by the `checkpoint` gate.
pub fn evaluate_gate(
    gate: GateKind,
    participants: &[String],
    agents: &DashMap<String, AgentDef>,
    transcript: &[Message],
    checkpoint_vote: Option<MessageKind>,
) -> GateOutcome {
    let votes = effective_votes(transcript, participants, agents);

    let absolute_veto = if gate != GateKind::Always {
        votes.iter().find_map(|(agent_id, kind)| {
            if *kind != MessageKind::Veto {
                return None;
            }
            let class = agents.get(agent_id).map(|a| a.veto_class);
            (class == Some(VetoClass::Absolute)).then(|| agent_id.clone())
        })
    } else {
        None
    };

    let passed = match gate {
        GateKind::Always => true,
        GateKind::AllApproved => participants.iter().all(|p| {
            let class = agents.get(p).map(|a| a.veto_class).unwrap_or(VetoClass::None);
            if class == VetoClass::Advisory {
                return true;
            }
            votes.get(p) == Some(&MessageKind::Approve)
        }),
        GateKind::NoVeto => !votes.iter().any(|(agent_id, kind)| {
            *kind == MessageKind::Veto
                && matches!(agents.get(agent_id).map(|a| a.veto_class), Some(VetoClass::Strong) | Some(VetoClass::Absolute))
        }),
        GateKind::Checkpoint => checkpoint_vote == Some(MessageKind::Approve),
    };

    GateOutcome { passed: absolute_veto.is_none() && passed, absolute_veto }
}

/// Consensus rule for `network` debate phases: no veto and at least
/// `ceil(n/2)+1` approvals (§4.6 "network (debate)").
pub fn network_consensus_reached(participants: &[String], agents: &DashMap<String, AgentDef>, transcript: &[Message]) -> bool {
    let votes = effective_votes(transcript, participants, agents);
    if votes.values().any(|k| *k == MessageKind::Veto) {
        return false;
    }
    let approvals = votes.values().filter(|k| **k == MessageKind::Approve).count();
    let n = participants.len();
    let k = (n + 1) / 2 + 1;
    approvals >= k
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CapabilityGrade;
    use std::collections::HashSet as StdHashSet;

    fn agent(id: &str, veto_class: VetoClass) -> AgentDef {
        AgentDef {
            id: id.into(),
            name: id.into(),
            role: "x".into(),
            system_prompt: String::new(),
            provider: "openai".into(),
            model: "m".into(),
            temperature: 0.2,
            max_tokens: 100,
            tools: StdHashSet::new(),
            capability_grade: CapabilityGrade::Executor,
            veto_class,
            skills: vec![],
            can_write_project_memory: false,
        }
    }

    fn registry(agents: Vec<AgentDef>) -> DashMap<String, AgentDef> {
        let map = DashMap::new();
        for a in agents {
            map.insert(a.id.clone(), a);
        }
        map
    }

    fn vote(agent_id: &str, kind: MessageKind) -> Message {
        Message::broadcast("r1", "p1", agent_id, kind, "")
    }

    #[test]
    fn absolute_veto_dominates_regardless_of_gate() {
        let agents = registry(vec![agent("alpha", VetoClass::Absolute)]);
        let transcript = vec![vote("alpha", MessageKind::Veto), vote("alpha", MessageKind::Approve)];
        let outcome = evaluate_gate(GateKind::AllApproved, &["alpha".into()], &agents, &transcript, None);
        assert!(!outcome.passed);
        assert_eq!(outcome.absolute_veto.as_deref(), Some("alpha"));
    }

    #[test]
    fn all_approved_requires_every_non_advisory_participant() {
        let agents = registry(vec![agent("alpha", VetoClass::Strong), agent("beta", VetoClass::Advisory)]);
        let transcript = vec![vote("alpha", MessageKind::Approve)];
        let outcome = evaluate_gate(GateKind::AllApproved, &["alpha".into(), "beta".into()], &agents, &transcript, None);
        assert!(outcome.passed);
    }

    #[test]
    fn no_veto_ignores_advisory_vetoes() {
        let agents = registry(vec![agent("alpha", VetoClass::Advisory)]);
        let transcript = vec![vote("alpha", MessageKind::Veto)];
        let outcome = evaluate_gate(GateKind::NoVeto, &["alpha".into()], &agents, &transcript, None);
        assert!(outcome.passed);
    }

    #[test]
    fn checkpoint_requires_orchestrator_approval() {
        let agents = registry(vec![]);
        let outcome = evaluate_gate(GateKind::Checkpoint, &[], &agents, &[], Some(MessageKind::Approve));
        assert!(outcome.passed);
        let outcome_none = evaluate_gate(GateKind::Checkpoint, &[], &agents, &[], None);
        assert!(!outcome_none.passed);
    }

    #[test]
    fn network_consensus_needs_majority_plus_one() {
        // n=3 -> k = ceil(3/2)+1 = 3: two approvals out of three falls short.
        let agents = registry(vec![agent("a", VetoClass::None), agent("b", VetoClass::None), agent("c", VetoClass::None)]);
        let participants = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let two_approvals = vec![vote("a", MessageKind::Approve), vote("b", MessageKind::Approve)];
        assert!(!network_consensus_reached(&participants, &agents, &two_approvals));

        let all_approve = vec![vote("a", MessageKind::Approve), vote("b", MessageKind::Approve), vote("c", MessageKind::Approve)];
        assert!(network_consensus_reached(&participants, &agents, &all_approve));
    }
}
