//! `ToolRegistry`: ACL + schema + path confinement + quota dispatch (C2,
//! spec §4.2 "Dispatch contract").

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde_json::Value;
use tracing::warn;

use crate::domain::{AgentDef, ToolCallRecord};
use crate::error::OrchestratorError;

use super::descriptor::ToolDescriptor;
use super::path_guard::confine_to_workspace;
use super::validate::validate_arguments;

/// Per-run tool call quotas (§4.2 step 4 defaults: 100 calls, 50 writes).
#[derive(Debug, Clone, Copy)]
pub struct ToolQuotas {
    pub max_calls: u32,
    pub max_writes: u32,
}

impl Default for ToolQuotas {
    fn default() -> Self {
        Self { max_calls: 100, max_writes: 50 }
    }
}

#[derive(Debug, Default)]
struct QuotaCounters {
    calls: u32,
    writes: u32,
}

/// Declarative tool registry: holds descriptors, enforces the dispatch
/// contract, and keeps the per-run audit trail and call/write quotas.
pub struct ToolRegistry {
    descriptors: HashMap<String, ToolDescriptor>,
    workspace_root: PathBuf,
    quotas: ToolQuotas,
    counters: DashMap<String, QuotaCounters>,
    audit: DashMap<String, Vec<ToolCallRecord>>,
}

impl ToolRegistry {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self::with_quotas(workspace_root, ToolQuotas::default())
    }

    pub fn with_quotas(workspace_root: PathBuf, quotas: ToolQuotas) -> Self {
        Self {
            descriptors: HashMap::new(),
            workspace_root,
            quotas,
            counters: DashMap::new(),
            audit: DashMap::new(),
        }
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) {
        self.descriptors.insert(descriptor.id.clone(), descriptor);
    }

    pub fn descriptor(&self, tool_id: &str) -> Option<&ToolDescriptor> {
        self.descriptors.get(tool_id)
    }

    pub fn audit_for(&self, run_id: &str) -> Vec<ToolCallRecord> {
        self.audit.get(run_id).map(|v| v.clone()).unwrap_or_default()
    }

    /// Six-step dispatch contract (§4.2): ACL, schema, path confinement,
    /// quota, timeout-bounded execution, audit.
    ///
    /// `branch_writes` marks the caller as one of several concurrent
    /// executors in the same phase (§5 "Shared-resource policy"): write-side
    /// arguments are rewritten under the agent's `agent/{id}/*` sub-path
    /// before confinement so sibling participants can't collide on the same
    /// file.
    pub async fn invoke(
        &self,
        agent: &AgentDef,
        run_id: &str,
        tool_id: &str,
        arguments: Value,
        branch_writes: bool,
    ) -> Result<Value, OrchestratorError> {
        let start = Instant::now();

        // 1. ACL
        if !agent.may_call_tool(tool_id) {
            return Err(OrchestratorError::ToolForbidden {
                agent_id: agent.id.clone(),
                tool_name: tool_id.to_string(),
            });
        }

        let descriptor = self.descriptors.get(tool_id).ok_or_else(|| OrchestratorError::Validation(format!("unknown tool {tool_id}")))?;

        // 2. Schema validation (against the caller's original arguments,
        // before any branch-path rewrite)
        validate_arguments(tool_id, &descriptor.schema, &arguments)?;

        let arguments = if branch_writes && descriptor.side_effect == super::descriptor::SideEffect::Write {
            branch_write_arguments(&descriptor, &agent.id, arguments)
        } else {
            arguments
        };

        // 3. Path confinement for every "path"-typed argument
        for arg_name in descriptor.path_arguments() {
            if let Some(candidate) = arguments.get(&arg_name).and_then(Value::as_str) {
                let allow_directory = descriptor.accepts_directory(&arg_name);
                confine_to_workspace(&self.workspace_root, candidate, allow_directory)?;
            }
        }

        // 4. Quotas
        self.check_and_bump_quota(run_id, descriptor)?;

        // 5. Timeout-bounded execution. The registry enriches arguments with
        // call context (`_run_id`, `_agent_id`) after validation so handlers
        // that need it (e.g. memory_search/memory_store) can read it without
        // widening the public `ToolHandler::call` signature.
        let mut enriched = arguments.clone();
        if let Some(obj) = enriched.as_object_mut() {
            obj.insert("_run_id".to_string(), Value::String(run_id.to_string()));
            obj.insert("_agent_id".to_string(), Value::String(agent.id.clone()));
        }

        let outcome = tokio::time::timeout(descriptor.timeout(), descriptor.handler.call(enriched)).await;

        let (result, success, result_summary) = match outcome {
            Ok(Ok(value)) => {
                let summary = summarize(&value);
                (Ok(value), true, summary)
            }
            Ok(Err(err)) => {
                let summary = err.to_string();
                (Err(err), false, summary)
            }
            Err(_) => {
                let timeout_err = OrchestratorError::TimedOut(format!("tool {tool_id} exceeded {:?}", descriptor.timeout()));
                let summary = timeout_err.to_string();
                (Err(timeout_err), false, summary)
            }
        };

        // 6. Audit
        let record = ToolCallRecord {
            agent_id: agent.id.clone(),
            run_id: run_id.to_string(),
            tool_name: tool_id.to_string(),
            arguments_digest: ToolCallRecord::digest_arguments(&arguments),
            result_summary,
            success,
            duration_ms: start.elapsed().as_millis() as u64,
            timestamp: chrono::Utc::now(),
        };
        self.audit.entry(run_id.to_string()).or_default().push(record);

        result
    }

    fn check_and_bump_quota(&self, run_id: &str, descriptor: &ToolDescriptor) -> Result<(), OrchestratorError> {
        let mut counters = self.counters.entry(run_id.to_string()).or_default();
        if counters.calls >= self.quotas.max_calls {
            return Err(OrchestratorError::QuotaExceeded(format!(
                "run {run_id} exceeded {} tool calls",
                self.quotas.max_calls
            )));
        }
        let is_write = matches!(descriptor.side_effect, super::descriptor::SideEffect::Write | super::descriptor::SideEffect::Exec);
        if is_write && counters.writes >= self.quotas.max_writes {
            return Err(OrchestratorError::QuotaExceeded(format!(
                "run {run_id} exceeded {} write/exec tool calls",
                self.quotas.max_writes
            )));
        }
        counters.calls += 1;
        if is_write {
            counters.writes += 1;
        }
        Ok(())
    }
}

fn summarize(value: &Value) -> String {
    let rendered = value.to_string();
    const MAX: usize = 500;
    if rendered.len() > MAX {
        warn!(len = rendered.len(), "truncating tool result for audit summary");
        format!("{}... [truncated]", &rendered[..MAX])
    } else {
        rendered
    }
}

/// Rewrites every "path"-typed argument of a write-effect tool call onto the
/// caller's branch sub-path (§5 "Shared-resource policy"), leaving
/// non-path arguments untouched.
fn branch_write_arguments(descriptor: &ToolDescriptor, agent_id: &str, arguments: Value) -> Value {
    let mut rewritten = arguments;
    if let Some(obj) = rewritten.as_object_mut() {
        for arg_name in descriptor.path_arguments() {
            if let Some(candidate) = obj.get(&arg_name).and_then(Value::as_str).map(str::to_string) {
                let relative = candidate.trim_start_matches('/');
                obj.insert(arg_name, Value::String(format!("agent/{agent_id}/{relative}")));
            }
        }
    }
    rewritten
}

/// Workspace branch sub-path rewrite for concurrent executors in a `parallel`
/// phase (§5 "Shared-resource policy"): each agent's write targets are
/// rewritten under `agent/{id}/*` so concurrent writers don't collide on the
/// same file.
pub fn branch_subpath(workspace_root: &std::path::Path, agent_id: &str, relative: &str) -> PathBuf {
    workspace_root.join("agent").join(agent_id).join(relative)
}

/// Convenience constructor used by `Runtime` wiring and tests: a
/// `ToolHandler` backed by a plain async closure.
pub struct ClosureHandler<F> {
    f: F,
}

impl<F> ClosureHandler<F> {
    pub fn new(f: F) -> Arc<Self>
    where
        F: Fn(Value) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, OrchestratorError>> + Send>>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self { f })
    }
}

#[async_trait::async_trait]
impl<F> super::descriptor::ToolHandler for ClosureHandler<F>
where
    F: Fn(Value) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, OrchestratorError>> + Send>>
        + Send
        + Sync
        + 'static,
{
    async fn call(&self, arguments: Value) -> Result<Value, OrchestratorError> {
        (self.f)(arguments).await
    }
}
