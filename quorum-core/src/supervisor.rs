//! Mission Supervisor (C7, spec §4.7): owns a `PatternRun`'s lifecycle —
//! start, cancel, pause, resume — drives the Pattern Engine (C6) phase by
//! phase, and records compliance verdicts at phase boundaries.
//!
//! Grounded on the teacher's checkpoint/resume shape (`memory::Checkpointer`,
//! `react::runner::build_react_initial_state`'s "load from checkpoint, else
//! start fresh" branch), narrowed to the one state machine this core needs.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{info, warn};

use crate::domain::{AgentDef, Message, MessageKind, PatternRun, RunStatus, Verdict, WorkflowDef};
use crate::error::OrchestratorError;
use crate::pattern::{self, NodeOutcome, PatternContext, RetryPolicy};
use crate::registry::{AgentRegistry, Registration, UpsertOutcome, WorkflowRegistry};
use crate::runtime::Runtime;

/// Maximum resume attempts before a run is parked rather than retried again
/// (§4.7 "Resume safety").
pub const MAX_RESUME_ATTEMPTS: u32 = 3;

/// Durable record of one phase-boundary compliance verdict, keyed by
/// `(run_id, phase_id)` (§4.7 "Compliance verdicts").
#[derive(Debug, Clone)]
pub struct ComplianceRecord {
    pub run_id: String,
    pub phase_id: String,
    pub verdict: Verdict,
}

/// Persisted run/verdict storage the supervisor reads on startup to resume
/// in-flight missions (§4.7 "On process start, the supervisor scans
/// persisted runs in state running and resumes them").
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn put(&self, run: PatternRun) -> Result<(), OrchestratorError>;
    async fn get(&self, run_id: &str) -> Result<Option<PatternRun>, OrchestratorError>;
    async fn list(&self) -> Result<Vec<PatternRun>, OrchestratorError>;
    async fn put_verdict(&self, record: ComplianceRecord) -> Result<(), OrchestratorError>;
    async fn verdicts_for(&self, run_id: &str) -> Result<Vec<ComplianceRecord>, OrchestratorError>;
}

/// In-process store: the default backing for `RunStore`, and what tests run
/// against. A production deployment swaps this for the same key/value store
/// backing the bus (§6 "Persisted state layout").
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: DashMap<String, PatternRun>,
    verdicts: DashMap<String, Vec<ComplianceRecord>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn put(&self, run: PatternRun) -> Result<(), OrchestratorError> {
        self.runs.insert(run.run_id.clone(), run);
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<PatternRun>, OrchestratorError> {
        Ok(self.runs.get(run_id).map(|r| r.clone()))
    }

    async fn list(&self) -> Result<Vec<PatternRun>, OrchestratorError> {
        Ok(self.runs.iter().map(|r| r.clone()).collect())
    }

    async fn put_verdict(&self, record: ComplianceRecord) -> Result<(), OrchestratorError> {
        self.verdicts.entry(record.run_id.clone()).or_default().push(record);
        Ok(())
    }

    async fn verdicts_for(&self, run_id: &str) -> Result<Vec<ComplianceRecord>, OrchestratorError> {
        Ok(self.verdicts.get(run_id).map(|v| v.clone()).unwrap_or_default())
    }
}

/// Mission control surface the core exposes to its out-of-scope collaborators
/// (HTTP server, CLI, MCP tool bridge) — spec §6 "Mission control surface".
#[async_trait]
pub trait MissionControl: Send + Sync {
    async fn start_mission(&self, workflow_id: &str, brief: &str) -> Result<String, OrchestratorError>;
    async fn cancel_mission(&self, run_id: &str) -> Result<(), OrchestratorError>;
    async fn pause_mission(&self, run_id: &str) -> Result<(), OrchestratorError>;
    async fn resume_mission(&self, run_id: &str) -> Result<(), OrchestratorError>;
    async fn get_mission(&self, run_id: &str) -> Result<Option<PatternRun>, OrchestratorError>;
    async fn list_missions(&self) -> Result<Vec<PatternRun>, OrchestratorError>;
    async fn submit_validation(&self, run_id: &str, phase_id: &str, approve: bool, rationale: &str) -> Result<(), OrchestratorError>;
    async fn get_compliance_reports(&self, run_id: &str) -> Result<Vec<ComplianceRecord>, OrchestratorError>;
}

pub struct MissionSupervisor {
    runtime: Runtime,
    agents: AgentRegistry,
    workflows: WorkflowRegistry,
    store: Arc<dyn RunStore>,
    retry_policy: RetryPolicy,
}

impl MissionSupervisor {
    /// Takes the agent/workflow directories as the raw maps the pattern
    /// engine reads by id (§6 registration surface is reached through
    /// [`Registration`] once the supervisor is built, not at construction).
    pub fn new(
        runtime: Runtime,
        agents: Arc<DashMap<String, AgentDef>>,
        workflows: Arc<DashMap<String, WorkflowDef>>,
        store: Arc<dyn RunStore>,
    ) -> Self {
        Self::with_registries(runtime, AgentRegistry::from_map(agents), WorkflowRegistry::from_map(workflows), store)
    }

    pub fn with_registries(runtime: Runtime, agents: AgentRegistry, workflows: WorkflowRegistry, store: Arc<dyn RunStore>) -> Self {
        Self { runtime, agents, workflows, store, retry_policy: RetryPolicy::default_workflow() }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn pattern_ctx(&self, run_id: &str) -> PatternContext {
        PatternContext::new(run_id, self.agents.shared_map(), self.runtime.clone())
    }

    /// Scans persisted runs in `running` state and resumes each (§4.7). Call
    /// once on process start before serving new mission requests.
    pub async fn resume_crashed_runs(&self) -> Result<Vec<String>, OrchestratorError> {
        let mut resumed = Vec::new();
        for run in self.store.list().await? {
            if run.status == RunStatus::Running {
                resumed.push(run.run_id.clone());
                self.resume_one(run).await?;
            }
        }
        Ok(resumed)
    }

    async fn resume_one(&self, mut run: PatternRun) -> Result<(), OrchestratorError> {
        run.resume_attempts += 1;
        if run.resume_attempts > MAX_RESUME_ATTEMPTS {
            run.transition_to(RunStatus::Paused)?;
            run.set_last_error("resume_attempts_exceeded", "resume attempted more than 3 times", run.current_phase.clone());
            warn!(run_id = %run.run_id, attempts = run.resume_attempts, "parking run after repeated resume attempts");
            self.store.put(run).await?;
            return Ok(());
        }
        info!(run_id = %run.run_id, attempts = run.resume_attempts, "resuming run after restart");
        self.store.put(run.clone()).await?;
        self.drive_to_completion(run).await
    }

    pub async fn start(&self, workflow_id: &str, brief: &str, workspace_path: std::path::PathBuf) -> Result<String, OrchestratorError> {
        let workflow = self
            .workflows
            .get(workflow_id)
            .ok_or_else(|| OrchestratorError::Validation(format!("unknown workflow {workflow_id}")))?;
        workflow.validate()?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let mut run = PatternRun::new(run_id.clone(), workflow_id, brief, workspace_path);
        run.transition_to(RunStatus::Running)?;
        let entry = workflow.entry().ok_or_else(|| OrchestratorError::Validation("workflow has no entry phase".to_string()))?;
        run.current_phase = Some(entry.id.clone());
        self.store.put(run.clone()).await?;

        self.drive_to_completion(run).await?;
        Ok(run_id)
    }

    pub async fn cancel(&self, run_id: &str) -> Result<(), OrchestratorError> {
        let mut run = self.load(run_id).await?;
        run.transition_to(RunStatus::Cancelled)?;
        self.store.put(run).await
    }

    pub async fn pause(&self, run_id: &str) -> Result<(), OrchestratorError> {
        let mut run = self.load(run_id).await?;
        run.transition_to(RunStatus::Paused)?;
        self.store.put(run).await
    }

    pub async fn resume(&self, run_id: &str) -> Result<(), OrchestratorError> {
        let mut run = self.load(run_id).await?;
        run.transition_to(RunStatus::Running)?;
        self.resume_one(run).await
    }

    async fn load(&self, run_id: &str) -> Result<PatternRun, OrchestratorError> {
        self.store
            .get(run_id)
            .await?
            .ok_or_else(|| OrchestratorError::Validation(format!("unknown run {run_id}")))
    }

    /// Walks the workflow graph from `run.current_phase` to completion,
    /// applying the retry policy at each node and recording compliance
    /// verdicts at every phase boundary.
    async fn drive_to_completion(&self, mut run: PatternRun) -> Result<(), OrchestratorError> {
        let workflow = self
            .workflows
            .get(&run.workflow_id)
            .ok_or_else(|| OrchestratorError::Validation(format!("unknown workflow {}", run.workflow_id)))?;

        loop {
            let phase_id = match &run.current_phase {
                Some(id) => id.clone(),
                None => break,
            };

            if run.phase_states.get(&phase_id).map(|s| s.state.is_terminal()).unwrap_or(false) {
                // Already done from a prior process incarnation (P8 resume equivalence).
                match workflow.next_after(&phase_id) {
                    Some(next) => {
                        run.current_phase = Some(next.to_string());
                        continue;
                    }
                    None => break,
                }
            }

            let phase = workflow
                .phase(&phase_id)
                .ok_or_else(|| OrchestratorError::Validation(format!("workflow {} has no phase {phase_id}", run.workflow_id)))?
                .clone();

            let ctx = self.pattern_ctx(&run.run_id);
            let outcome = pattern::execute_node_with_retry(&phase, &mut run, &ctx, &self.retry_policy).await;
            self.store.put(run.clone()).await?;
            self.runtime.bus.publish_event(
                &run.run_id,
                quorum_stream::ProtocolEvent::Checkpoint {
                    run_id: run.run_id.clone(),
                    phase_id: phase_id.clone(),
                    timestamp: chrono::Utc::now().to_rfc3339(),
                },
            );

            let outcome: NodeOutcome = match outcome {
                Ok(outcome) => outcome,
                Err(err) => {
                    run.transition_to(RunStatus::Paused)?;
                    run.set_last_error("needs_human", err.to_string(), Some(phase_id.clone()));
                    self.store.put(run).await?;
                    return Ok(());
                }
            };

            if let Some(verdict) = &outcome.verdict {
                self.store
                    .put_verdict(ComplianceRecord { run_id: run.run_id.clone(), phase_id: phase_id.clone(), verdict: verdict.clone() })
                    .await?;
            }

            use crate::domain::PhaseStatus;
            match outcome.status {
                PhaseStatus::Vetoed | PhaseStatus::TimedOut => {
                    run.transition_to(RunStatus::Failed)?;
                    self.store.put(run).await?;
                    return Ok(());
                }
                PhaseStatus::Done | PhaseStatus::Approved => {
                    let next = outcome.routed_to.as_deref().or_else(|| workflow.next_after(&phase_id));
                    match next {
                        Some(next_id) => run.current_phase = Some(next_id.to_string()),
                        None => {
                            run.transition_to(RunStatus::Completed)?;
                            self.store.put(run).await?;
                            return Ok(());
                        }
                    }
                }
                PhaseStatus::Pending | PhaseStatus::Running => {
                    // execute_node always returns a terminal PhaseStatus; reaching
                    // this arm would indicate an engine bug, not a valid outcome.
                    return Err(OrchestratorError::Internal(format!("phase {phase_id} returned a non-terminal status")));
                }
            }
        }

        run.transition_to(RunStatus::Completed)?;
        self.store.put(run).await
    }
}

#[async_trait]
impl MissionControl for MissionSupervisor {
    async fn start_mission(&self, workflow_id: &str, brief: &str) -> Result<String, OrchestratorError> {
        self.start(workflow_id, brief, self.runtime.config.workspace_root.clone()).await
    }

    async fn cancel_mission(&self, run_id: &str) -> Result<(), OrchestratorError> {
        self.cancel(run_id).await
    }

    async fn pause_mission(&self, run_id: &str) -> Result<(), OrchestratorError> {
        self.pause(run_id).await
    }

    async fn resume_mission(&self, run_id: &str) -> Result<(), OrchestratorError> {
        self.resume(run_id).await
    }

    async fn get_mission(&self, run_id: &str) -> Result<Option<PatternRun>, OrchestratorError> {
        self.store.get(run_id).await
    }

    async fn list_missions(&self) -> Result<Vec<PatternRun>, OrchestratorError> {
        self.store.list().await
    }

    /// Publishes a `human` verdict message for a suspended human-in-the-loop
    /// phase (§6 "SubmitValidation ... for human-in-the-loop gates"). The
    /// pattern engine's polling loop observes it and resolves the phase.
    async fn submit_validation(&self, run_id: &str, phase_id: &str, approve: bool, rationale: &str) -> Result<(), OrchestratorError> {
        let kind = if approve { MessageKind::Approve } else { MessageKind::Veto };
        let msg = Message::broadcast(run_id, phase_id, "human", kind, rationale);
        self.runtime.bus.publish(msg, &[]).await
    }

    async fn get_compliance_reports(&self, run_id: &str) -> Result<Vec<ComplianceRecord>, OrchestratorError> {
        self.store.verdicts_for(run_id).await
    }
}

/// §6 "Registration surface" — `UpsertAgentDef`/`ListAgents`/`GetAgent` and
/// the workflow equivalents, delegated straight to the supervisor's agent and
/// workflow registries.
impl Registration for MissionSupervisor {
    fn upsert_agent_def(&self, def: AgentDef) -> UpsertOutcome {
        self.agents.upsert(def)
    }

    fn list_agents(&self, role_filter: &str) -> Vec<AgentDef> {
        self.agents.list(role_filter)
    }

    fn get_agent(&self, id: &str) -> Option<AgentDef> {
        self.agents.get(id)
    }

    fn upsert_workflow_def(&self, def: WorkflowDef) -> UpsertOutcome {
        self.workflows.upsert(def)
    }

    fn list_workflows(&self) -> Vec<WorkflowDef> {
        self.workflows.list()
    }

    fn get_workflow(&self, id: &str) -> Option<WorkflowDef> {
        self.workflows.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InMemoryMessageStore, MessageBus};
    use crate::domain::{CapabilityGrade, GateKind, Phase, PatternType, VetoClass};
    use crate::gateway::{MockProvider, ModelGateway};
    use crate::memory::MemoryStore;
    use crate::model_spec::StaticTableResolver;
    use crate::tools::ToolRegistry;
    use quorum_config::OrchestratorConfig;
    use std::collections::HashSet;

    fn agent(id: &str, response: &str) -> (AgentDef, Arc<MockProvider>) {
        let def = AgentDef {
            id: id.into(),
            name: id.into(),
            role: "x".into(),
            system_prompt: String::new(),
            provider: id.into(),
            model: "m".into(),
            temperature: 0.2,
            max_tokens: 200,
            tools: HashSet::new(),
            capability_grade: CapabilityGrade::Executor,
            veto_class: VetoClass::None,
            skills: vec![],
            can_write_project_memory: false,
        };
        (def, Arc::new(MockProvider::new(id, response)))
    }

    fn supervisor(agents: Vec<(AgentDef, Arc<MockProvider>)>, workflow: WorkflowDef) -> MissionSupervisor {
        let agent_map = DashMap::new();
        let mut providers: Vec<Arc<dyn crate::gateway::Provider>> = Vec::new();
        for (def, provider) in agents {
            providers.push(provider);
            agent_map.insert(def.id.clone(), def);
        }
        let workflow_map = DashMap::new();
        workflow_map.insert(workflow.id.clone(), workflow);

        let gateway = Arc::new(ModelGateway::new(providers));
        let tools = Arc::new(ToolRegistry::new(std::env::temp_dir()));
        let bus = Arc::new(MessageBus::new(Arc::new(InMemoryMessageStore::new())));
        let memory = Arc::new(MemoryStore::new());
        let model_limits = Arc::new(StaticTableResolver::new().with_common_defaults());
        let config = Arc::new(OrchestratorConfig::default());
        let runtime = Runtime::new(gateway, tools, bus, memory, model_limits, config);
        let store: Arc<dyn RunStore> = Arc::new(InMemoryRunStore::new());

        MissionSupervisor::new(runtime, Arc::new(agent_map), Arc::new(workflow_map), store)
    }

    #[tokio::test]
    async fn sequential_workflow_completes() {
        let workflow = WorkflowDef::new(
            "w1",
            "seq",
            vec![
                Phase::new("a", PatternType::Solo, vec!["alpha".into()], GateKind::Always),
                Phase::new("b", PatternType::Solo, vec!["beta".into()], GateKind::Always),
            ],
        )
        .with_edge("a", "b");
        let sup = supervisor(vec![agent("alpha", "done with a"), agent("beta", "done with b")], workflow);

        let run_id = sup.start("w1", "do the thing", std::env::temp_dir()).await.unwrap();
        let run = sup.get_mission(&run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.phase_states.get("a").unwrap().state.is_terminal());
        assert!(run.phase_states.get("b").unwrap().state.is_terminal());
    }

    #[tokio::test]
    async fn absolute_veto_fails_the_run() {
        let workflow = WorkflowDef::new("w2", "veto", vec![Phase::new("p", PatternType::Network, vec!["alpha".into(), "beta".into()], GateKind::NoVeto)]);
        let (mut alpha, alpha_provider) = agent("alpha", "[APPROVE] fine");
        alpha.veto_class = VetoClass::None;
        let (mut beta, beta_provider) = agent("beta", "[VETO] unsafe");
        beta.veto_class = VetoClass::Absolute;

        let agent_map = DashMap::new();
        agent_map.insert(alpha.id.clone(), alpha);
        agent_map.insert(beta.id.clone(), beta);
        let workflow_map = DashMap::new();
        workflow_map.insert(workflow.id.clone(), workflow);

        let gateway = Arc::new(ModelGateway::new(vec![alpha_provider, beta_provider]));
        let tools = Arc::new(ToolRegistry::new(std::env::temp_dir()));
        let bus = Arc::new(MessageBus::new(Arc::new(InMemoryMessageStore::new())));
        let memory = Arc::new(MemoryStore::new());
        let model_limits = Arc::new(StaticTableResolver::new().with_common_defaults());
        let config = Arc::new(OrchestratorConfig::default());
        let runtime = Runtime::new(gateway, tools, bus, memory, model_limits, config);
        let store: Arc<dyn RunStore> = Arc::new(InMemoryRunStore::new());
        let sup = MissionSupervisor::new(runtime, Arc::new(agent_map), Arc::new(workflow_map), store);

        let run_id = sup.start("w2", "debate", std::env::temp_dir()).await.unwrap();
        let run = sup.get_mission(&run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);

        let verdicts = sup.get_compliance_reports(&run_id).await.unwrap();
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].verdict.verdict, "veto");
    }

    #[tokio::test]
    async fn resume_attempts_exceeding_limit_parks_the_run() {
        let workflow = WorkflowDef::new("w3", "stuck", vec![Phase::new("a", PatternType::Solo, vec!["alpha".into()], GateKind::Always)]);
        let sup = supervisor(vec![agent("alpha", "ok")], workflow);

        let mut run = PatternRun::new("r1", "w3", "brief", std::env::temp_dir());
        run.transition_to(RunStatus::Running).unwrap();
        run.resume_attempts = MAX_RESUME_ATTEMPTS;
        sup.store.put(run).await.unwrap();

        sup.resume_crashed_runs().await.unwrap();
        let resumed = sup.get_mission("r1").await.unwrap().unwrap();
        assert_eq!(resumed.status, RunStatus::Paused);
        assert!(resumed.last_error.is_some());
    }

    #[tokio::test]
    async fn upserting_the_same_agent_def_twice_is_a_noop() {
        let workflow = WorkflowDef::new("w4", "reg", vec![Phase::new("a", PatternType::Solo, vec!["alpha".into()], GateKind::Always)]);
        let sup = supervisor(vec![agent("alpha", "ok")], workflow);

        let (def, _provider) = agent("beta", "ignored");
        assert_eq!(sup.upsert_agent_def(def.clone()), UpsertOutcome::Inserted);
        assert_eq!(sup.upsert_agent_def(def), UpsertOutcome::Unchanged);
        assert_eq!(sup.list_agents("").len(), 2);
        assert!(sup.get_agent("beta").is_some());
    }
}
