//! Node execution (C6, spec §4.6): `execute_node(phase) = spawn_participants;
//! wait_for_terminal_state; evaluate_gate; produce_phase_summary; transition`.
//!
//! Grounded on the teacher's `state_graph` node-dispatch loop, collapsed into
//! one pattern-typed match since each of the eleven pattern types needs a
//! distinct participant-spawning shape rather than a uniform node body.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use quorum_stream::ProtocolEvent;
use regex::Regex;
use tracing::{info, warn};

use crate::domain::{AgentDef, GateKind, Message, MessageKind, PatternType, Phase, PhaseState, PhaseStatus};
use crate::domain::{PatternRun, Verdict};
use crate::error::OrchestratorError;
use crate::executor::{self, ExitReason, UsageTotals};
use crate::runtime::Runtime;

use super::gate::{evaluate_gate, network_consensus_reached};
use super::retry::RetryPolicy;

const DEFAULT_LOOP_BOUND: u32 = 5;
const L0_MARKERS: [&str; 3] = ["skip", "ignore", "todo"];

/// Shared handle the engine threads through every pattern-specific function:
/// which run/phase it's operating in, the agent directory, and the shared
/// [`Runtime`].
#[derive(Clone)]
pub struct PatternContext {
    pub run_id: String,
    pub agents: Arc<DashMap<String, AgentDef>>,
    pub runtime: Runtime,
    /// Token/cost usage accumulated by every participant this context spawns,
    /// folded into the owning `PatternRun` once the phase finishes.
    pub usage: Arc<UsageTotals>,
}

impl PatternContext {
    pub fn new(run_id: impl Into<String>, agents: Arc<DashMap<String, AgentDef>>, runtime: Runtime) -> Self {
        Self { run_id: run_id.into(), agents, runtime, usage: Arc::new(UsageTotals::new()) }
    }
}

/// Outcome of one `execute_node` call.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub status: PhaseStatus,
    pub verdict: Option<Verdict>,
    /// Set only by a `router` phase: the phase id the classifier chose.
    pub routed_to: Option<String>,
}

impl NodeOutcome {
    fn terminal(status: PhaseStatus, verdict: Option<Verdict>) -> Self {
        Self { status, verdict, routed_to: None }
    }
}

fn lookup_agent(ctx: &PatternContext, agent_id: &str) -> Result<AgentDef, OrchestratorError> {
    ctx.agents
        .get(agent_id)
        .map(|a| a.clone())
        .ok_or_else(|| OrchestratorError::Validation(format!("unknown agent {agent_id}")))
}

async fn run_participant(ctx: &PatternContext, phase: &Phase, agent_id: &str, prompt: &str) -> Result<ExitReason, OrchestratorError> {
    let agent = lookup_agent(ctx, agent_id)?;
    let exec_ctx = executor::PhaseContext::new(ctx.run_id.clone(), phase.id.clone(), ctx.runtime.clone())
        .with_usage_totals(ctx.usage.clone());
    executor::run(&agent, &exec_ctx, prompt).await
}

async fn transcript(ctx: &PatternContext, phase_id: &str) -> Result<Vec<Message>, OrchestratorError> {
    ctx.runtime.bus.history(&ctx.run_id, Some(phase_id), None).await
}

fn exit_reason_to_error(agent_id: &str, reason: ExitReason) -> Option<OrchestratorError> {
    match reason {
        ExitReason::Terminal(_) => None,
        ExitReason::RoundsExhausted => Some(OrchestratorError::Internal(format!("agent {agent_id} exhausted rounds without a terminal message"))),
        ExitReason::Cancelled => Some(OrchestratorError::Cancelled),
        ExitReason::LlmUnavailable => Some(OrchestratorError::ProvidersExhausted),
    }
}

fn status_from_gate_outcome(outcome: super::gate::GateOutcome, violations: Vec<String>, escalated: bool) -> (PhaseStatus, Verdict) {
    let vetoed = outcome.absolute_veto.is_some() || !outcome.passed;
    let status = if vetoed { PhaseStatus::Vetoed } else { PhaseStatus::Done };
    let verdict = Verdict {
        verdict: if vetoed { "veto".to_string() } else { "approve".to_string() },
        rationale: outcome.absolute_veto.map(|a| format!("absolute veto by {a}")).unwrap_or_else(|| format!("gate passed = {}", outcome.passed)),
        violations,
        escalated,
    };
    (status, verdict)
}

/// Single attempt at executing `phase`. Does not retry; callers that want the
/// workflow's retry policy applied should use [`execute_node_with_retry`].
pub async fn execute_node(phase: &Phase, run: &mut PatternRun, ctx: &PatternContext) -> Result<NodeOutcome, OrchestratorError> {
    {
        let state = run.phase_states.entry(phase.id.clone()).or_insert_with(PhaseState::default);
        state.start()?;
    }
    ctx.runtime.bus.publish_event(&ctx.run_id, ProtocolEvent::PhaseEnter { phase_id: phase.id.clone() });

    let outcome = match phase.pattern_type {
        PatternType::Solo => execute_solo(phase, ctx).await,
        PatternType::Sequential => execute_sequential(phase, ctx).await,
        PatternType::Parallel => execute_parallel(phase, ctx).await,
        PatternType::Loop => execute_loop(phase, run, ctx).await,
        PatternType::Hierarchical => execute_hierarchical(phase, ctx).await,
        PatternType::Network => execute_network(phase, ctx).await,
        PatternType::Aggregator => execute_aggregator(phase, ctx).await,
        PatternType::Router => execute_router(phase, ctx).await,
        PatternType::HumanInTheLoop => execute_human_in_the_loop(phase, ctx).await,
        PatternType::AdversarialPair => execute_adversarial_pair(phase, ctx).await,
        PatternType::AdversarialCascade => execute_adversarial_cascade(phase, ctx).await,
    }?;

    let state = run.phase_states.get_mut(&phase.id).expect("phase state inserted above");
    state.finish(outcome.status)?;
    state.verdict = outcome.verdict.clone();
    state.summary = summarize_phase(ctx, phase, &outcome).await;
    let state_value = serde_json::to_value(&*state).unwrap_or(serde_json::Value::Null);

    let (input_tokens, output_tokens, cost) = ctx.usage.totals().await;
    run.record_usage(input_tokens, output_tokens, cost);

    ctx.runtime.bus.publish_event(&ctx.run_id, ProtocolEvent::PhaseExit { phase_id: phase.id.clone(), state: state_value });

    Ok(outcome)
}

/// Wraps [`execute_node`] with the workflow's node-level retry policy
/// (§4.6 "Failure and retry"): engine-level failures (llm_unavailable,
/// providers_exhausted, internal) are retried with backoff before the caller
/// is told to pause the run.
pub async fn execute_node_with_retry(
    phase: &Phase,
    run: &mut PatternRun,
    ctx: &PatternContext,
    policy: &RetryPolicy,
) -> Result<NodeOutcome, OrchestratorError> {
    let mut attempt = 0;
    loop {
        match execute_node(phase, run, ctx).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) if matches!(err, OrchestratorError::Cancelled) => return Err(err),
            Err(err) => {
                if !policy.should_retry(attempt) {
                    run.set_last_error("needs_human", err.to_string(), Some(phase.id.clone()));
                    return Err(err);
                }
                warn!(phase = %phase.id, attempt, error = %err, "phase node failed, retrying with backoff");
                tokio::time::sleep(policy.delay(attempt)).await;
                attempt += 1;
            }
        }
    }
}

async fn summarize_phase(ctx: &PatternContext, phase: &Phase, outcome: &NodeOutcome) -> Option<String> {
    let full = match transcript(ctx, &phase.id).await {
        Ok(t) => t,
        Err(_) => return None,
    };
    if full.is_empty() {
        return Some(format!("phase {} completed with no transcript", phase.id));
    }
    let orchestrator = phase.orchestrator.clone().or_else(|| phase.participants.first().cloned())?;
    let agent = lookup_agent(ctx, &orchestrator).ok()?;
    let joined = full.iter().map(|m| format!("{}: {}", m.from_agent, m.content)).collect::<Vec<_>>().join("\n");
    let prompt = format!("Summarise this phase transcript in two sentences:\n{joined}");

    // Summarisation failure is non-fatal (§4.6): the transcript stands as the
    // record and the phase's terminal status (`outcome.status`) is unaffected.
    match run_participant(ctx, phase, &agent.id, &prompt).await {
        Ok(ExitReason::Terminal(msg)) => Some(msg.content),
        _ => Some(format!("phase {} ended {:?}", phase.id, outcome.status)),
    }
}

async fn execute_solo(phase: &Phase, ctx: &PatternContext) -> Result<NodeOutcome, OrchestratorError> {
    let agent_id = phase.participants.first().ok_or_else(|| OrchestratorError::Validation("solo phase has no participant".into()))?;
    let reason = run_participant(ctx, phase, agent_id, "Complete your assigned task.").await?;
    if let Some(err) = exit_reason_to_error(agent_id, reason) {
        return Err(err);
    }
    let full = transcript(ctx, &phase.id).await?;
    let outcome = evaluate_gate(phase.gate, &phase.participants, &ctx.agents, &full, None);
    let (status, verdict) = status_from_gate_outcome(outcome, vec![], false);
    Ok(NodeOutcome::terminal(status, Some(verdict)))
}

async fn execute_sequential(phase: &Phase, ctx: &PatternContext) -> Result<NodeOutcome, OrchestratorError> {
    for agent_id in &phase.participants {
        let reason = run_participant(ctx, phase, agent_id, "Continue the phase, building on what earlier participants said.").await?;
        if let Some(err) = exit_reason_to_error(agent_id, reason) {
            return Err(err);
        }
    }
    let full = transcript(ctx, &phase.id).await?;
    let outcome = evaluate_gate(phase.gate, &phase.participants, &ctx.agents, &full, None);
    let (status, verdict) = status_from_gate_outcome(outcome, vec![], false);
    Ok(NodeOutcome::terminal(status, Some(verdict)))
}

async fn execute_parallel(phase: &Phase, ctx: &PatternContext) -> Result<NodeOutcome, OrchestratorError> {
    let futures = phase.participants.iter().map(|agent_id| {
        let ctx = ctx.clone();
        let phase = phase.clone();
        let agent_id = agent_id.clone();
        async move {
            let reason = run_participant(&ctx, &phase, &agent_id, "Work your part of the phase concurrently.").await;
            (agent_id, reason)
        }
    });
    let results = futures::future::join_all(futures).await;
    for (agent_id, reason) in results {
        if let Some(err) = exit_reason_to_error(&agent_id, reason?) {
            return Err(err);
        }
    }
    let full = transcript(ctx, &phase.id).await?;
    let outcome = evaluate_gate(phase.gate, &phase.participants, &ctx.agents, &full, None);
    let (status, verdict) = status_from_gate_outcome(outcome, vec![], false);
    Ok(NodeOutcome::terminal(status, Some(verdict)))
}

async fn execute_loop(phase: &Phase, run: &mut PatternRun, ctx: &PatternContext) -> Result<NodeOutcome, OrchestratorError> {
    let max_iterations = phase.max_iterations.unwrap_or(DEFAULT_LOOP_BOUND);
    if max_iterations == 0 {
        // §8 boundary case: completes immediately as `done` with an empty transcript.
        return Ok(NodeOutcome::terminal(
            PhaseStatus::Done,
            Some(Verdict { verdict: "approve".into(), rationale: "zero iterations requested".into(), violations: vec![], escalated: false }),
        ));
    }

    let judge = phase.orchestrator.clone().or_else(|| phase.participants.last().cloned());

    for iteration in 1..=max_iterations {
        if let Some(state) = run.phase_states.get_mut(&phase.id) {
            state.iteration = iteration;
        }
        for agent_id in &phase.participants {
            let reason = run_participant(ctx, phase, agent_id, "Iterate on the accumulated transcript so far.").await?;
            if let Some(err) = exit_reason_to_error(agent_id, reason) {
                return Err(err);
            }
        }
        let full = transcript(ctx, &phase.id).await?;
        if let Some(judge_id) = &judge {
            if full.iter().rev().find(|m| &m.from_agent == judge_id).map(|m| m.kind) == Some(MessageKind::Approve) {
                let outcome = evaluate_gate(phase.gate, &phase.participants, &ctx.agents, &full, None);
                let (status, verdict) = status_from_gate_outcome(outcome, vec![], false);
                return Ok(NodeOutcome::terminal(status, Some(verdict)));
            }
        }
    }

    let full = transcript(ctx, &phase.id).await?;
    let outcome = evaluate_gate(phase.gate, &phase.participants, &ctx.agents, &full, None);
    let (status, verdict) = status_from_gate_outcome(outcome, vec!["max_iterations reached without judge approval".into()], false);
    Ok(NodeOutcome::terminal(status, Some(verdict)))
}

async fn execute_hierarchical(phase: &Phase, ctx: &PatternContext) -> Result<NodeOutcome, OrchestratorError> {
    let lead_id = phase.orchestrator.clone().or_else(|| phase.participants.first().cloned()).ok_or_else(|| {
        OrchestratorError::Validation("hierarchical phase has no lead".into())
    })?;
    let workers: Vec<String> = phase.participants.iter().filter(|p| **p != lead_id).cloned().collect();

    let delegation = run_participant(ctx, phase, &lead_id, "Delegate subtasks to your workers.").await?;
    if let Some(err) = exit_reason_to_error(&lead_id, delegation) {
        return Err(err);
    }
    let delegation_brief = transcript(ctx, &phase.id)
        .await?
        .into_iter()
        .rev()
        .find(|m| m.from_agent == lead_id)
        .map(|m| m.content)
        .unwrap_or_default();

    for worker_id in &workers {
        let request = Message::broadcast(&ctx.run_id, &phase.id, &lead_id, MessageKind::Request, delegation_brief.clone())
            .with_metadata("to_worker", worker_id.clone());
        ctx.runtime.bus.publish(request, &[worker_id.clone()]).await?;
        let reason = run_participant(ctx, phase, worker_id, &delegation_brief).await?;
        if let Some(err) = exit_reason_to_error(worker_id, reason) {
            return Err(err);
        }
    }

    let reason = run_participant(ctx, phase, &lead_id, "Summarise worker replies and render your verdict.").await?;
    if let Some(err) = exit_reason_to_error(&lead_id, reason) {
        return Err(err);
    }

    let full = transcript(ctx, &phase.id).await?;
    let checkpoint_vote = full.iter().rev().find(|m| m.from_agent == lead_id).map(|m| m.kind);
    let outcome = evaluate_gate(phase.gate, std::slice::from_ref(&lead_id), &ctx.agents, &full, checkpoint_vote);
    let (status, verdict) = status_from_gate_outcome(outcome, vec![], false);
    Ok(NodeOutcome::terminal(status, Some(verdict)))
}

async fn execute_network(phase: &Phase, ctx: &PatternContext) -> Result<NodeOutcome, OrchestratorError> {
    let max_rounds = phase.max_iterations.unwrap_or(DEFAULT_LOOP_BOUND);
    for round in 1..=max_rounds {
        for agent_id in &phase.participants {
            let reason = run_participant(ctx, phase, agent_id, "State your position for this round of debate.").await?;
            if let Some(err) = exit_reason_to_error(agent_id, reason) {
                return Err(err);
            }
        }
        let full = transcript(ctx, &phase.id).await?;
        let gate_now = evaluate_gate(GateKind::NoVeto, &phase.participants, &ctx.agents, &full, None);
        if gate_now.absolute_veto.is_some() {
            let (status, verdict) = status_from_gate_outcome(gate_now, vec![], false);
            return Ok(NodeOutcome::terminal(status, Some(verdict)));
        }
        if network_consensus_reached(&phase.participants, &ctx.agents, &full) {
            info!(phase = %phase.id, round, "network debate reached consensus");
            let outcome = evaluate_gate(phase.gate, &phase.participants, &ctx.agents, &full, None);
            let (status, verdict) = status_from_gate_outcome(outcome, vec![], false);
            return Ok(NodeOutcome::terminal(status, Some(verdict)));
        }
    }
    let full = transcript(ctx, &phase.id).await?;
    let outcome = evaluate_gate(phase.gate, &phase.participants, &ctx.agents, &full, None);
    let (status, verdict) = status_from_gate_outcome(outcome, vec!["max_rounds reached without consensus".into()], false);
    Ok(NodeOutcome::terminal(status, Some(verdict)))
}

async fn execute_aggregator(phase: &Phase, ctx: &PatternContext) -> Result<NodeOutcome, OrchestratorError> {
    let (sources, aggregator_id) = phase.participants.split_at(phase.participants.len().saturating_sub(1));
    let aggregator_id = aggregator_id.first().ok_or_else(|| OrchestratorError::Validation("aggregator phase has no participant".into()))?;

    for agent_id in sources {
        let reason = run_participant(ctx, phase, agent_id, "Contribute your input for the aggregator.").await?;
        if let Some(err) = exit_reason_to_error(agent_id, reason) {
            return Err(err);
        }
    }
    let reason = run_participant(ctx, phase, aggregator_id, "Synthesise a single artefact from the inputs above.").await?;
    if let Some(err) = exit_reason_to_error(aggregator_id, reason) {
        return Err(err);
    }

    let full = transcript(ctx, &phase.id).await?;
    let outcome = evaluate_gate(phase.gate, &phase.participants, &ctx.agents, &full, None);
    let (status, verdict) = status_from_gate_outcome(outcome, vec![], false);
    Ok(NodeOutcome::terminal(status, Some(verdict)))
}

fn parse_routed_to(content: &str) -> Option<String> {
    let re = Regex::new(r"(?i)routed_to:\s*([A-Za-z0-9_.\-]+)").ok()?;
    re.captures(content).map(|c| c[1].to_string())
}

async fn execute_router(phase: &Phase, ctx: &PatternContext) -> Result<NodeOutcome, OrchestratorError> {
    let classifier = phase.orchestrator.clone().or_else(|| phase.participants.first().cloned()).ok_or_else(|| {
        OrchestratorError::Validation("router phase has no classifier".into())
    })?;
    let reason = run_participant(ctx, phase, &classifier, "Choose the next phase; reply with `routed_to: <phase_id>`.").await?;
    let routed_to = match &reason {
        ExitReason::Terminal(msg) => parse_routed_to(&msg.content),
        _ => None,
    };
    if let Some(err) = exit_reason_to_error(&classifier, reason) {
        return Err(err);
    }
    if routed_to.is_none() {
        warn!(phase = %phase.id, "router classifier did not emit a routed_to marker");
    }
    Ok(NodeOutcome { status: PhaseStatus::Done, verdict: None, routed_to })
}

async fn execute_human_in_the_loop(phase: &Phase, ctx: &PatternContext) -> Result<NodeOutcome, OrchestratorError> {
    let deadline = phase.timeout.unwrap_or(ctx.runtime.config.phase_timeout);
    let poll_interval = Duration::from_millis(50);
    let deadline_at = tokio::time::Instant::now() + deadline;

    loop {
        let full = transcript(ctx, &phase.id).await?;
        if let Some(verdict_msg) = full.iter().rev().find(|m| m.from_agent == "human" && m.is_verdict()) {
            let status = if verdict_msg.kind == MessageKind::Veto { PhaseStatus::Vetoed } else { PhaseStatus::Done };
            let verdict = Verdict {
                verdict: if status == PhaseStatus::Vetoed { "veto".into() } else { "approve".into() },
                rationale: verdict_msg.content.clone(),
                violations: vec![],
                escalated: false,
            };
            return Ok(NodeOutcome::terminal(status, Some(verdict)));
        }
        if tokio::time::Instant::now() >= deadline_at {
            return Ok(NodeOutcome::terminal(PhaseStatus::TimedOut, None));
        }
        tokio::time::sleep(poll_interval.min(deadline_at.saturating_duration_since(tokio::time::Instant::now()))).await;
    }
}

async fn execute_adversarial_pair(phase: &Phase, ctx: &PatternContext) -> Result<NodeOutcome, OrchestratorError> {
    let producer = phase.participants.first().ok_or_else(|| OrchestratorError::Validation("adversarial-pair phase needs a producer".into()))?;
    let critic = phase.participants.get(1).ok_or_else(|| OrchestratorError::Validation("adversarial-pair phase needs a critic".into()))?;
    let max_rounds = phase.max_iterations.unwrap_or(DEFAULT_LOOP_BOUND);

    for _round in 1..=max_rounds {
        let producer_reason = run_participant(ctx, phase, producer, "Propose your artefact or revision.").await?;
        if let Some(err) = exit_reason_to_error(producer, producer_reason) {
            return Err(err);
        }
        if let Ok(full) = transcript(ctx, &phase.id).await {
            if let Some(last) = full.iter().rev().find(|m| &m.from_agent == producer) {
                let propose = Message::broadcast(&ctx.run_id, &phase.id, producer, MessageKind::Propose, last.content.clone());
                ctx.runtime.bus.publish(propose, &[producer.clone()]).await?;
            }
        }

        let critic_reason = run_participant(ctx, phase, critic, "Critique the latest proposal; approve if it is ready.").await?;
        if let Some(err) = exit_reason_to_error(critic, critic_reason.clone()) {
            return Err(err);
        }
        if let ExitReason::Terminal(msg) = &critic_reason {
            if msg.kind == MessageKind::Approve {
                let full = transcript(ctx, &phase.id).await?;
                let outcome = evaluate_gate(phase.gate, &phase.participants, &ctx.agents, &full, None);
                let (status, verdict) = status_from_gate_outcome(outcome, vec![], false);
                return Ok(NodeOutcome::terminal(status, Some(verdict)));
            }
            let counter = Message::broadcast(&ctx.run_id, &phase.id, critic, MessageKind::Counter, msg.content.clone());
            ctx.runtime.bus.publish(counter, &[critic.clone()]).await?;
        }
    }

    let full = transcript(ctx, &phase.id).await?;
    let outcome = evaluate_gate(phase.gate, &phase.participants, &ctx.agents, &full, None);
    let (status, verdict) = status_from_gate_outcome(outcome, vec!["max_rounds reached without critic approval".into()], false);
    Ok(NodeOutcome::terminal(status, Some(verdict)))
}

fn lexical_violations(content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    L0_MARKERS.iter().filter(|m| lower.contains(**m)).map(|m| format!("lexical marker: {m}")).collect()
}

async fn execute_adversarial_cascade(phase: &Phase, ctx: &PatternContext) -> Result<NodeOutcome, OrchestratorError> {
    let producer = phase.participants.first().cloned().ok_or_else(|| OrchestratorError::Validation("adversarial-cascade phase needs a producer".into()))?;
    let l1 = phase.participants.get(1).cloned().unwrap_or_else(|| producer.clone());
    let l2 = phase.participants.get(2).cloned().unwrap_or_else(|| l1.clone());

    let producer_reason = run_participant(ctx, phase, &producer, "Produce the artefact under review.").await?;
    if let Some(err) = exit_reason_to_error(&producer, producer_reason) {
        return Err(err);
    }
    let producer_content = transcript(ctx, &phase.id)
        .await?
        .into_iter()
        .rev()
        .find(|m| m.from_agent == producer)
        .map(|m| m.content)
        .unwrap_or_default();

    // L0: lexical gate, no LLM call.
    let violations = lexical_violations(&producer_content);
    if !violations.is_empty() {
        let veto = Message::broadcast(&ctx.run_id, &phase.id, "l0-gate", MessageKind::Veto, "lexical markers found");
        ctx.runtime.bus.publish(veto, &[producer.clone()]).await?;
        return Ok(NodeOutcome::terminal(
            PhaseStatus::Vetoed,
            Some(Verdict { verdict: "veto".into(), rationale: "L0 lexical gate".into(), violations, escalated: false }),
        ));
    }

    // L1: semantic critique.
    let l1_reason = run_participant(ctx, phase, &l1, "Give a semantic critique of the artefact above; veto if unacceptable.").await?;
    if let ExitReason::Terminal(msg) = &l1_reason {
        if msg.kind == MessageKind::Veto {
            return Ok(NodeOutcome::terminal(
                PhaseStatus::Vetoed,
                Some(Verdict { verdict: "veto".into(), rationale: "L1 semantic critique".into(), violations: vec![], escalated: false }),
            ));
        }
    }
    if let Some(err) = exit_reason_to_error(&l1, l1_reason) {
        return Err(err);
    }

    // L2: architectural critique; a veto here escalates rather than silently terminating.
    let l2_reason = run_participant(ctx, phase, &l2, "Give an architectural critique of the artefact above; veto if unacceptable.").await?;
    if let ExitReason::Terminal(msg) = &l2_reason {
        if msg.kind == MessageKind::Veto {
            return Ok(NodeOutcome::terminal(
                PhaseStatus::Vetoed,
                Some(Verdict { verdict: "veto".into(), rationale: "L2 architectural critique".into(), violations: vec![], escalated: true }),
            ));
        }
    }
    if let Some(err) = exit_reason_to_error(&l2, l2_reason) {
        return Err(err);
    }

    Ok(NodeOutcome::terminal(
        PhaseStatus::Done,
        Some(Verdict { verdict: "approve".into(), rationale: "passed all three gates".into(), violations: vec![], escalated: false }),
    ))
}
