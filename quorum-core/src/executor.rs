//! Agent Executor (C5, spec §4.5): drives one agent through a bounded
//! reason-act loop over the model gateway (C1), tool registry (C2), message
//! bus (C3), and memory store (C4).
//!
//! Grounded on the teacher's `ReactRunner` think -> act -> observe -> compress
//! -> think cycle, collapsed into a single sequential loop body since this
//! executor has no separate graph-compilation step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use quorum_stream::ProtocolEvent;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{AgentDef, Message, MessageKind};
use crate::error::OrchestratorError;
use crate::gateway::{CompletionRequest, ToolCallRequest, ToolSchema};
use crate::model_spec::ModelLimitResolver;
use crate::runtime::Runtime;

/// Default bound on reason-act rounds before a phase gives up on an agent
/// (§4.5 "Stop conditions").
pub const DEFAULT_MAX_ROUNDS: u32 = 15;

/// Number of prior bus messages addressed to this agent folded into the next
/// prompt (§4.5 step 1: "last N bus messages addressed to this agent in this
/// phase").
const HISTORY_WINDOW: usize = 50;

/// Case-insensitive, start-of-line verdict lexicon (§4.5 "Verdict
/// detection"). Kept data-driven per Design Notes ("gate lexicons remain
/// data-driven for domain tuning") rather than hard-coded into the loop.
#[derive(Debug, Clone)]
pub struct VerdictLexicon {
    pub veto_markers: Vec<String>,
    pub approve_markers: Vec<String>,
}

impl Default for VerdictLexicon {
    fn default() -> Self {
        Self {
            veto_markers: vec!["[VETO]".to_string(), "NOGO".to_string(), "NO-GO".to_string()],
            approve_markers: vec!["[APPROVE]".to_string(), "STATUT: GO".to_string()],
        }
    }
}

impl VerdictLexicon {
    /// Detects a verdict marker at the start of `text`, case-insensitively.
    /// Overrides tool-call interpretation so a human-readable verdict
    /// survives even if the model also asked for tools (§4.5).
    pub fn detect(&self, text: &str) -> Option<MessageKind> {
        let trimmed = text.trim_start();
        let upper = trimmed.to_uppercase();
        if self.veto_markers.iter().any(|m| upper.starts_with(&m.to_uppercase())) {
            return Some(MessageKind::Veto);
        }
        if self.approve_markers.iter().any(|m| upper.starts_with(&m.to_uppercase())) {
            return Some(MessageKind::Approve);
        }
        None
    }
}

/// Accumulates token/cost usage across every gateway call made within one
/// `execute_node` call, shared by every participant it spawns, so the
/// Pattern Engine can fold the phase's total into the owning `PatternRun`
/// once the phase finishes.
#[derive(Default)]
pub struct UsageTotals {
    inner: Mutex<(u32, u32, f64)>,
}

impl UsageTotals {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, input_tokens: u32, output_tokens: u32, cost: f64) {
        let mut guard = self.inner.lock().await;
        guard.0 += input_tokens;
        guard.1 += output_tokens;
        guard.2 += cost;
    }

    pub async fn totals(&self) -> (u32, u32, f64) {
        *self.inner.lock().await
    }
}

/// Immutable handle an executor is given: which run/phase it operates in,
/// the shared [`Runtime`], the round budget, and a cooperative cancellation
/// flag (§5 "cancelling a phase signals all its executors").
#[derive(Clone)]
pub struct PhaseContext {
    pub run_id: String,
    pub phase_id: String,
    pub runtime: Runtime,
    pub verdict_lexicon: VerdictLexicon,
    pub max_rounds: u32,
    cancelled: Arc<AtomicBool>,
    usage: Option<Arc<UsageTotals>>,
    concurrent_writes: bool,
}

impl PhaseContext {
    pub fn new(run_id: impl Into<String>, phase_id: impl Into<String>, runtime: Runtime) -> Self {
        Self {
            run_id: run_id.into(),
            phase_id: phase_id.into(),
            runtime,
            verdict_lexicon: VerdictLexicon::default(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            cancelled: Arc::new(AtomicBool::new(false)),
            usage: None,
            concurrent_writes: false,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Shares `usage` with this executor so every gateway call it makes
    /// folds its token/cost usage into the same running total.
    pub fn with_usage_totals(mut self, usage: Arc<UsageTotals>) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Marks this executor as one of several concurrent writers in the same
    /// phase (§5 "Shared-resource policy"): the registry rewrites its write
    /// targets under the agent's branch sub-path so it can't collide with a
    /// sibling participant's writes.
    pub fn with_concurrent_writes(mut self, concurrent_writes: bool) -> Self {
        self.concurrent_writes = concurrent_writes;
        self
    }

    /// Cancellation handle shared with whoever owns this phase (the Pattern
    /// Engine); calling it signals every executor spawned with this context.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Why an executor's reason-act loop stopped (§4.5 "Stop conditions").
#[derive(Debug, Clone)]
pub enum ExitReason {
    /// The agent published a terminal `inform`/`approve`/`veto` message.
    Terminal(Message),
    /// `max_rounds` was reached without a terminal message.
    RoundsExhausted,
    /// The phase's cancellation flag was observed.
    Cancelled,
    /// The gateway exhausted its fallback chain.
    LlmUnavailable,
}

/// Drives `agent` through the bounded reason-act loop (§4.5 contract).
pub async fn run(agent: &AgentDef, ctx: &PhaseContext, initial_prompt: &str) -> Result<ExitReason, OrchestratorError> {
    let mut rounds: u32 = 0;
    let mut scratchpad = crate::memory::Scratchpad::new();

    loop {
        if ctx.is_cancelled() {
            return Ok(ExitReason::Cancelled);
        }
        if rounds >= ctx.max_rounds {
            return Ok(ExitReason::RoundsExhausted);
        }

        let transcript = assemble_transcript(agent, ctx, initial_prompt, &scratchpad).await?;
        let tool_schemas = tool_schemas_for(agent, ctx);

        debug!(agent_id = %agent.id, run_id = %ctx.run_id, phase_id = %ctx.phase_id, round = rounds, "calling model gateway");

        let request = CompletionRequest {
            model: agent.model.clone(),
            messages: transcript,
            tools: tool_schemas,
            max_tokens: agent.max_tokens,
            temperature: agent.temperature,
        };

        let fallback_chain = if ctx.runtime.config.fallback_chain.is_empty() {
            vec![agent.provider.clone()]
        } else {
            ctx.runtime.config.fallback_chain.clone()
        };

        let gateway_result = match ctx.runtime.gateway.complete(&fallback_chain, request).await {
            Ok(result) => result,
            Err(OrchestratorError::ProvidersExhausted) => return Ok(ExitReason::LlmUnavailable),
            Err(other) => return Err(other),
        };

        if let Some(state) = ctx.runtime.gateway.breaker_state(&gateway_result.provider_id) {
            ctx.runtime.bus.publish_event(
                &ctx.run_id,
                ProtocolEvent::CircuitState { provider_id: gateway_result.provider_id.clone(), state: format!("{state:?}").to_lowercase() },
            );
        }

        if let Some(usage) = &ctx.usage {
            usage
                .record(gateway_result.response.usage.input_tokens, gateway_result.response.usage.output_tokens, gateway_result.cost)
                .await;
        }
        ctx.runtime.bus.publish_event(
            &ctx.run_id,
            ProtocolEvent::Usage {
                provider_id: gateway_result.provider_id.clone(),
                model_id: agent.model.clone(),
                prompt_tokens: gateway_result.response.usage.input_tokens,
                completion_tokens: gateway_result.response.usage.output_tokens,
                total_tokens: gateway_result.response.usage.input_tokens + gateway_result.response.usage.output_tokens,
                cost: gateway_result.cost,
            },
        );

        let response = gateway_result.response;
        rounds += 1;

        if let Some(kind) = ctx.verdict_lexicon.detect(&response.content) {
            let msg = publish_terminal(agent, ctx, kind, response.content).await?;
            return Ok(ExitReason::Terminal(msg));
        }

        if response.tool_calls.is_empty() {
            let msg = publish_terminal(agent, ctx, MessageKind::Inform, response.content).await?;
            return Ok(ExitReason::Terminal(msg));
        }

        for call in response.tool_calls {
            dispatch_tool_call(agent, ctx, call, &mut scratchpad).await?;
        }
    }
}

fn tool_schemas_for(agent: &AgentDef, ctx: &PhaseContext) -> Vec<ToolSchema> {
    agent
        .tools
        .iter()
        .filter_map(|tool_id| {
            ctx.runtime.tools.descriptor(tool_id).map(|d| ToolSchema {
                name: d.id.clone(),
                description: format!("{} tool ({:?} side effect)", d.id, d.side_effect),
                parameters: d.schema.clone(),
            })
        })
        .collect()
}

async fn assemble_transcript(
    agent: &AgentDef,
    ctx: &PhaseContext,
    initial_prompt: &str,
    scratchpad: &crate::memory::Scratchpad,
) -> Result<Vec<Message>, OrchestratorError> {
    let mut transcript = Vec::new();

    transcript.push(Message::broadcast(
        &ctx.run_id,
        &ctx.phase_id,
        "system",
        MessageKind::System,
        agent.system_prompt.clone(),
    ));

    let memory_excerpts = ctx.runtime.memory.get_prefix(crate::domain::MemoryScope::Run, &ctx.run_id, "").await;
    if !memory_excerpts.is_empty() {
        let joined = memory_excerpts
            .iter()
            .take(10)
            .map(|e| format!("- {}: {}", e.key, e.value))
            .collect::<Vec<_>>()
            .join("\n");
        transcript.push(Message::broadcast(
            &ctx.run_id,
            &ctx.phase_id,
            "system",
            MessageKind::System,
            format!("Relevant memory:\n{joined}"),
        ));
    }

    if !scratchpad.is_empty() {
        let joined = scratchpad.iter().map(|(k, v)| format!("- {k}: {v}")).collect::<Vec<_>>().join("\n");
        transcript.push(Message::broadcast(
            &ctx.run_id,
            &ctx.phase_id,
            "system",
            MessageKind::System,
            format!("Scratchpad (this round only):\n{joined}"),
        ));
    }

    let history = ctx.runtime.bus.history(&ctx.run_id, Some(&ctx.phase_id), None).await?;
    let addressed: Vec<Message> = history
        .into_iter()
        .filter(|m| m.to_agent.as_deref() == Some(agent.id.as_str()) || m.to_agent.is_none())
        .rev()
        .take(HISTORY_WINDOW)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    transcript.extend(addressed);

    transcript.push(Message::broadcast(&ctx.run_id, &ctx.phase_id, "system", MessageKind::System, initial_prompt.to_string()));

    let context_limit = ctx
        .runtime
        .model_limits
        .resolve(&agent.provider, &agent.model)
        .await
        .map(|spec| spec.context_limit)
        .unwrap_or(ctx.runtime.compaction.max_context_tokens);

    Ok(crate::compress::compact_transcript(&transcript, context_limit, &ctx.runtime.compaction))
}

async fn publish_terminal(agent: &AgentDef, ctx: &PhaseContext, kind: MessageKind, content: String) -> Result<Message, OrchestratorError> {
    let recipients = vec![agent.id.clone()];
    let msg = Message::broadcast(&ctx.run_id, &ctx.phase_id, &agent.id, kind, content);
    ctx.runtime.bus.publish(msg.clone(), &recipients).await?;
    Ok(msg)
}

async fn dispatch_tool_call(
    agent: &AgentDef,
    ctx: &PhaseContext,
    call: ToolCallRequest,
    scratchpad: &mut crate::memory::Scratchpad,
) -> Result<(), OrchestratorError> {
    let arguments: Value = serde_json::from_str(&call.arguments).unwrap_or(Value::Null);

    let call_msg = Message::broadcast(&ctx.run_id, &ctx.phase_id, &agent.id, MessageKind::ToolCall, call.name.clone())
        .with_metadata("tool_call_id", call.id.clone())
        .with_metadata("tool_name", call.name.clone())
        .with_metadata("collapsible", "true");
    ctx.runtime.bus.publish(call_msg, &[agent.id.clone()]).await?;

    let outcome = ctx.runtime.tools.invoke(agent, &ctx.run_id, &call.name, arguments, ctx.concurrent_writes).await;

    let (content, success) = match &outcome {
        Ok(value) => (value.to_string(), true),
        Err(err) => (err.to_string(), false),
    };

    if let Err(err) = &outcome {
        if err.is_infrastructure() {
            warn!(tool = %call.name, error = %err, "tool call hit an infrastructure failure");
        }
    }

    let result_msg = Message::broadcast(&ctx.run_id, &ctx.phase_id, &agent.id, MessageKind::ToolResult, content)
        .with_metadata("tool_call_id", call.id)
        .with_metadata("tool_name", call.name)
        .with_metadata("success", success.to_string())
        .with_metadata("collapsible", "true");
    ctx.runtime.bus.publish(result_msg, &[agent.id.clone()]).await?;
    scratchpad.set(format!("last_tool:{}", call.name), if success { "ok".to_string() } else { "error".to_string() });

    info!(agent_id = %agent.id, success, "tool call dispatched");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InMemoryMessageStore, MessageBus};
    use crate::gateway::{CompletionResponse, MockProvider, ModelGateway, Usage};
    use crate::memory::MemoryStore;
    use crate::model_spec::StaticTableResolver;
    use crate::tools::ToolRegistry;
    use quorum_config::OrchestratorConfig;
    use std::collections::HashSet;

    fn agent(provider: &str, tools: &[&str]) -> AgentDef {
        AgentDef {
            id: "alpha".into(),
            name: "Alpha".into(),
            role: "executor".into(),
            system_prompt: "You review diffs.".into(),
            provider: provider.to_string(),
            model: "m".into(),
            temperature: 0.2,
            max_tokens: 256,
            tools: tools.iter().map(|s| s.to_string()).collect(),
            capability_grade: crate::domain::CapabilityGrade::Executor,
            veto_class: crate::domain::VetoClass::None,
            skills: vec![],
            can_write_project_memory: false,
        }
    }

    fn runtime_with(provider: Arc<MockProvider>) -> Runtime {
        let gateway = Arc::new(ModelGateway::new(vec![provider]));
        let tools = Arc::new(ToolRegistry::new(std::env::temp_dir()));
        let bus = Arc::new(MessageBus::new(Arc::new(InMemoryMessageStore::new())));
        let memory = Arc::new(MemoryStore::new());
        let model_limits = Arc::new(StaticTableResolver::new().with_common_defaults());
        let config = Arc::new(OrchestratorConfig::default());
        Runtime::new(gateway, tools, bus, memory, model_limits, config)
    }

    #[tokio::test]
    async fn plain_text_response_publishes_inform_and_exits() {
        let a = agent("openai", &[]);
        let runtime = runtime_with(Arc::new(MockProvider::new("openai", "looks good to me")));
        let ctx = PhaseContext::new("r1", "p1", runtime);

        let reason = run(&a, &ctx, "review this diff").await.unwrap();
        match reason {
            ExitReason::Terminal(msg) => assert_eq!(msg.kind, MessageKind::Inform),
            other => panic!("expected terminal inform, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn veto_marker_is_detected_and_overrides_default_kind() {
        let a = agent("openai", &[]);
        let runtime = runtime_with(Arc::new(MockProvider::new("openai", "[VETO] this is unsafe")));
        let ctx = PhaseContext::new("r1", "p1", runtime);

        let reason = run(&a, &ctx, "review").await.unwrap();
        match reason {
            ExitReason::Terminal(msg) => assert_eq!(msg.kind, MessageKind::Veto),
            other => panic!("expected veto, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn providers_exhausted_surfaces_as_llm_unavailable() {
        let a = agent("openai", &[]);
        let runtime = runtime_with(Arc::new(MockProvider::new("openai", "unused").always_hard_failure()));
        let ctx = PhaseContext::new("r1", "p1", runtime);

        let reason = run(&a, &ctx, "review").await.unwrap();
        assert!(matches!(reason, ExitReason::LlmUnavailable));
    }

    #[tokio::test]
    async fn cancellation_flag_short_circuits_before_first_round() {
        let a = agent("openai", &[]);
        let runtime = runtime_with(Arc::new(MockProvider::new("openai", "hi")));
        let ctx = PhaseContext::new("r1", "p1", runtime);
        ctx.cancellation_flag().store(true, Ordering::Relaxed);

        let reason = run(&a, &ctx, "review").await.unwrap();
        assert!(matches!(reason, ExitReason::Cancelled));
    }

    #[tokio::test]
    async fn usage_totals_accumulate_across_rounds() {
        let a = agent("openai", &[]);
        let runtime = runtime_with(Arc::new(MockProvider::new("openai", "looks good to me")));
        let usage = Arc::new(UsageTotals::new());
        let ctx = PhaseContext::new("r1", "p1", runtime).with_usage_totals(usage.clone());

        run(&a, &ctx, "review this diff").await.unwrap();

        let (input_tokens, output_tokens, cost) = usage.totals().await;
        assert_eq!(input_tokens, 10);
        assert_eq!(output_tokens, 5);
        assert!(cost >= 0.0);
    }

    #[tokio::test]
    async fn zero_max_rounds_exhausts_immediately() {
        let a = agent("openai", &[]);
        let runtime = runtime_with(Arc::new(MockProvider::new("openai", "hi")));
        let ctx = PhaseContext::new("r1", "p1", runtime).with_max_rounds(0);

        let reason = run(&a, &ctx, "review").await.unwrap();
        assert!(matches!(reason, ExitReason::RoundsExhausted));
    }

    struct ToolCallingProvider;

    #[async_trait::async_trait]
    impl crate::gateway::Provider for ToolCallingProvider {
        fn id(&self) -> &str {
            "openai"
        }

        async fn send(
            &self,
            request: &CompletionRequest,
        ) -> Result<CompletionResponse, crate::gateway::ProviderCallError> {
            if request.messages.iter().any(|m| m.kind == MessageKind::ToolResult) {
                Ok(CompletionResponse { content: "[APPROVE] all good".into(), tool_calls: vec![], usage: Usage::default() })
            } else {
                Ok(CompletionResponse {
                    content: String::new(),
                    tool_calls: vec![ToolCallRequest { id: "call1".into(), name: "noop".into(), arguments: "{}".into() }],
                    usage: Usage::default(),
                })
            }
        }
    }

    #[tokio::test]
    async fn tool_call_round_trip_then_approve() {
        let a = agent("openai", &["noop"]);
        let gateway = Arc::new(ModelGateway::new(vec![Arc::new(ToolCallingProvider)]));
        let mut registry = ToolRegistry::new(std::env::temp_dir());
        registry.register(crate::tools::ToolDescriptor::new(
            "noop",
            serde_json::json!({}),
            "misc",
            crate::tools::SideEffect::Read,
            crate::tools::ClosureHandler::new(|_| Box::pin(async { Ok(serde_json::json!({"ok": true})) })),
        ));
        let bus = Arc::new(MessageBus::new(Arc::new(InMemoryMessageStore::new())));
        let memory = Arc::new(MemoryStore::new());
        let model_limits = Arc::new(StaticTableResolver::new().with_common_defaults());
        let config = Arc::new(OrchestratorConfig::default());
        let runtime = Runtime::new(gateway, Arc::new(registry), bus, memory, model_limits, config);
        let ctx = PhaseContext::new("r1", "p1", runtime);

        let reason = run(&a, &ctx, "do the thing").await.unwrap();
        match reason {
            ExitReason::Terminal(msg) => assert_eq!(msg.kind, MessageKind::Approve),
            other => panic!("expected approve, got {other:?}"),
        }
    }
}
