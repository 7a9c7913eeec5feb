//! Canonical tool handlers (spec §4.2): the fixed catalogue every workflow
//! can draw from, grouped by what they touch — workspace filesystem, git,
//! build/test commands, memory store, and the thin mission-control bridge
//! tools whose actual behaviour lives outside this crate.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::domain::{AgentDef, MemoryEntry, MemoryScope};
use crate::error::OrchestratorError;
use crate::memory::MemoryStore;

use super::descriptor::{SideEffect, ToolDescriptor, ToolHandler};
use super::registry::ToolRegistry;

/// Registers the filesystem, git, build/test, and memory tools (spec §4.2's
/// catalogue, minus the mission-control bridge tools registered separately
/// by the embedding application via [`register_mission_control_tool`]).
pub fn register_workspace_tools(
    registry: &mut ToolRegistry,
    workspace_root: PathBuf,
    memory: Arc<MemoryStore>,
    agents: Arc<DashMap<String, AgentDef>>,
) {
    registry.register(ToolDescriptor::new(
        "read_file",
        json!({
            "type": "object",
            "properties": {"path": {"type": "string", "format": "path"}},
            "required": ["path"],
        }),
        "filesystem",
        SideEffect::Read,
        Arc::new(ReadFileHandler { workspace_root: workspace_root.clone() }),
    ));

    registry.register(ToolDescriptor::new(
        "write_file",
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "format": "path"},
                "content": {"type": "string"},
            },
            "required": ["path", "content"],
        }),
        "filesystem",
        SideEffect::Write,
        Arc::new(WriteFileHandler { workspace_root: workspace_root.clone() }),
    ));

    registry.register(ToolDescriptor::new(
        "edit_file",
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "format": "path"},
                "find": {"type": "string"},
                "replace": {"type": "string"},
            },
            "required": ["path", "find", "replace"],
        }),
        "filesystem",
        SideEffect::Write,
        Arc::new(EditFileHandler { workspace_root: workspace_root.clone() }),
    ));

    registry.register(ToolDescriptor::new(
        "search_files",
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string"},
                "path": {"type": "string", "format": "path", "path_kind": "directory"},
            },
            "required": ["pattern"],
        }),
        "filesystem",
        SideEffect::Read,
        Arc::new(SearchFilesHandler { workspace_root: workspace_root.clone() }),
    ));

    registry.register(ToolDescriptor::new(
        "list_directory",
        json!({
            "type": "object",
            "properties": {"path": {"type": "string", "format": "path", "path_kind": "directory"}},
            "required": ["path"],
        }),
        "filesystem",
        SideEffect::Read,
        Arc::new(ListDirectoryHandler { workspace_root: workspace_root.clone() }),
    ));

    registry.register(ToolDescriptor::new(
        "git_status",
        json!({"type": "object", "properties": {}}),
        "git",
        SideEffect::Exec,
        Arc::new(GitHandler { workspace_root: workspace_root.clone(), args: vec!["status".into(), "--porcelain".into()] }),
    ));

    registry.register(ToolDescriptor::new(
        "git_diff",
        json!({"type": "object", "properties": {}}),
        "git",
        SideEffect::Exec,
        Arc::new(GitHandler { workspace_root: workspace_root.clone(), args: vec!["diff".into()] }),
    ));

    registry.register(ToolDescriptor::new(
        "git_commit",
        json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": ["message"],
        }),
        "git",
        SideEffect::Exec,
        Arc::new(GitCommitHandler { workspace_root: workspace_root.clone() }),
    ));

    registry.register(ToolDescriptor::new(
        "run_build",
        json!({
            "type": "object",
            "properties": {"command": {"type": "array", "items": {"type": "string"}}},
            "required": ["command"],
        }),
        "build",
        SideEffect::Exec,
        Arc::new(CommandHandler { workspace_root: workspace_root.clone() }),
    ));

    registry.register(ToolDescriptor::new(
        "run_tests",
        json!({
            "type": "object",
            "properties": {"command": {"type": "array", "items": {"type": "string"}}},
            "required": ["command"],
        }),
        "build",
        SideEffect::Exec,
        Arc::new(CommandHandler { workspace_root: workspace_root.clone() }),
    ));

    registry.register(ToolDescriptor::new(
        "memory_search",
        json!({
            "type": "object",
            "properties": {
                "scope": {"type": "string", "enum": ["run", "project", "global"]},
                "ref_id": {"type": "string"},
                "query": {"type": "string"},
            },
            "required": ["scope", "query"],
        }),
        "memory",
        SideEffect::Read,
        Arc::new(MemorySearchHandler { memory: memory.clone() }),
    ));

    registry.register(ToolDescriptor::new(
        "memory_store",
        json!({
            "type": "object",
            "properties": {
                "scope": {"type": "string", "enum": ["run", "project", "global"]},
                "ref_id": {"type": "string"},
                "key": {"type": "string"},
                "value": {"type": "string"},
                "confidence": {"type": "number"},
            },
            "required": ["scope", "key", "value"],
        }),
        "memory",
        SideEffect::Write,
        Arc::new(MemoryStoreHandler { memory, agents }),
    ));
}

/// Registers one of the mission-control bridge tools named in spec §4.2
/// (`request_validation`, `launch_ideation`, `launch_group_ideation`,
/// `create_mission`, `set_project_phase`, `get_project_health`,
/// `suggest_next_missions`, `activate_mission`, `pause_mission`,
/// `check_phase_gate`): these reach into external-collaborator concepts the
/// core treats as opaque identifiers (spec Non-goals), so the embedding
/// application supplies the handler; this just wires up the descriptor with
/// the right side-effect class and schema.
pub fn register_mission_control_tool(
    registry: &mut ToolRegistry,
    tool_id: impl Into<String>,
    schema: Value,
    side_effect: SideEffect,
    handler: Arc<dyn ToolHandler>,
) {
    registry.register(ToolDescriptor::new(tool_id, schema, "mission_control", side_effect, handler));
}

fn resolved_path(workspace_root: &Path, arguments: &Value) -> Result<PathBuf, OrchestratorError> {
    let candidate = arguments
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| OrchestratorError::Validation("missing path argument".to_string()))?;
    super::path_guard::confine_to_workspace(workspace_root, candidate, false)
}

struct ReadFileHandler {
    workspace_root: PathBuf,
}

#[async_trait]
impl ToolHandler for ReadFileHandler {
    async fn call(&self, arguments: Value) -> Result<Value, OrchestratorError> {
        let path = resolved_path(&self.workspace_root, &arguments)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| OrchestratorError::Validation(format!("read {}: {e}", path.display())))?;
        Ok(json!({"content": content}))
    }
}

struct WriteFileHandler {
    workspace_root: PathBuf,
}

#[async_trait]
impl ToolHandler for WriteFileHandler {
    async fn call(&self, arguments: Value) -> Result<Value, OrchestratorError> {
        let path = resolved_path(&self.workspace_root, &arguments)?;
        let content = arguments
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::Validation("missing content argument".to_string()))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OrchestratorError::Internal(format!("mkdir {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| OrchestratorError::Internal(format!("write {}: {e}", path.display())))?;
        Ok(json!({"bytes_written": content.len()}))
    }
}

struct EditFileHandler {
    workspace_root: PathBuf,
}

#[async_trait]
impl ToolHandler for EditFileHandler {
    async fn call(&self, arguments: Value) -> Result<Value, OrchestratorError> {
        let path = resolved_path(&self.workspace_root, &arguments)?;
        let find = arguments.get("find").and_then(Value::as_str).unwrap_or_default();
        let replace = arguments.get("replace").and_then(Value::as_str).unwrap_or_default();
        let original = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| OrchestratorError::Validation(format!("read {}: {e}", path.display())))?;
        let occurrences = original.matches(find).count();
        if occurrences == 0 {
            return Err(OrchestratorError::Validation(format!("no occurrences of find text in {}", path.display())));
        }
        let updated = original.replacen(find, replace, 1);
        tokio::fs::write(&path, &updated)
            .await
            .map_err(|e| OrchestratorError::Internal(format!("write {}: {e}", path.display())))?;
        Ok(json!({"occurrences_found": occurrences, "replaced": 1}))
    }
}

struct SearchFilesHandler {
    workspace_root: PathBuf,
}

#[async_trait]
impl ToolHandler for SearchFilesHandler {
    async fn call(&self, arguments: Value) -> Result<Value, OrchestratorError> {
        let pattern = arguments
            .get("pattern")
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::Validation("missing pattern argument".to_string()))?;
        let search_root = match arguments.get("path").and_then(Value::as_str) {
            Some(p) => super::path_guard::confine_to_workspace(&self.workspace_root, p, true)?,
            None => self.workspace_root.clone(),
        };
        let matcher = regex::Regex::new(pattern)
            .map_err(|e| OrchestratorError::Validation(format!("invalid regex: {e}")))?;

        let workspace_root = self.workspace_root.clone();
        let matches = tokio::task::spawn_blocking(move || {
            let mut hits = Vec::new();
            for entry in ignore::WalkBuilder::new(&search_root).build().flatten() {
                if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    continue;
                }
                let Ok(text) = std::fs::read_to_string(entry.path()) else {
                    continue;
                };
                for (line_no, line) in text.lines().enumerate() {
                    if matcher.is_match(line) {
                        let rel = entry.path().strip_prefix(&workspace_root).unwrap_or(entry.path());
                        hits.push(json!({
                            "path": rel.to_string_lossy(),
                            "line": line_no + 1,
                            "text": line,
                        }));
                        if hits.len() >= 200 {
                            return hits;
                        }
                    }
                }
            }
            hits
        })
        .await
        .map_err(|e| OrchestratorError::Internal(format!("search task panicked: {e}")))?;

        Ok(json!({"matches": matches}))
    }
}

struct ListDirectoryHandler {
    workspace_root: PathBuf,
}

#[async_trait]
impl ToolHandler for ListDirectoryHandler {
    async fn call(&self, arguments: Value) -> Result<Value, OrchestratorError> {
        let candidate = arguments
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::Validation("missing path argument".to_string()))?;
        let dir = super::path_guard::confine_to_workspace(&self.workspace_root, candidate, true)?;
        let mut read_dir = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| OrchestratorError::Validation(format!("read_dir {}: {e}", dir.display())))?;
        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| OrchestratorError::Internal(format!("read_dir entry: {e}")))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "is_directory": is_dir,
            }));
        }
        Ok(json!({"entries": entries}))
    }
}

async fn run_git(workspace_root: &Path, args: &[String]) -> Result<Value, OrchestratorError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(workspace_root)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| OrchestratorError::Internal(format!("spawn git: {e}")))?;
    Ok(json!({
        "stdout": String::from_utf8_lossy(&output.stdout),
        "stderr": String::from_utf8_lossy(&output.stderr),
        "exit_code": output.status.code(),
    }))
}

struct GitHandler {
    workspace_root: PathBuf,
    args: Vec<String>,
}

#[async_trait]
impl ToolHandler for GitHandler {
    async fn call(&self, _arguments: Value) -> Result<Value, OrchestratorError> {
        run_git(&self.workspace_root, &self.args).await
    }
}

struct GitCommitHandler {
    workspace_root: PathBuf,
}

#[async_trait]
impl ToolHandler for GitCommitHandler {
    async fn call(&self, arguments: Value) -> Result<Value, OrchestratorError> {
        let message = arguments
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::Validation("missing message argument".to_string()))?;
        run_git(&self.workspace_root, &["commit".to_string(), "-am".to_string(), message.to_string()]).await
    }
}

/// Backs both `run_build` and `run_tests`: the canonical catalogue doesn't
/// prescribe a build system, so the command is supplied by the caller and
/// executed with the workspace root as cwd (§4.2 "shell out under the
/// workspace root, with the Exec timeout class").
struct CommandHandler {
    workspace_root: PathBuf,
}

#[async_trait]
impl ToolHandler for CommandHandler {
    async fn call(&self, arguments: Value) -> Result<Value, OrchestratorError> {
        let parts: Vec<String> = arguments
            .get("command")
            .and_then(Value::as_array)
            .ok_or_else(|| OrchestratorError::Validation("missing command argument".to_string()))?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        let (program, rest) = parts
            .split_first()
            .ok_or_else(|| OrchestratorError::Validation("command must have at least one element".to_string()))?;
        let output = Command::new(program)
            .args(rest)
            .current_dir(&self.workspace_root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| OrchestratorError::Internal(format!("spawn {program}: {e}")))?;
        Ok(json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "exit_code": output.status.code(),
            "success": output.status.success(),
        }))
    }
}

fn parse_scope(arguments: &Value) -> Result<MemoryScope, OrchestratorError> {
    match arguments.get("scope").and_then(Value::as_str) {
        Some("run") => Ok(MemoryScope::Run),
        Some("project") => Ok(MemoryScope::Project),
        Some("global") => Ok(MemoryScope::Global),
        other => Err(OrchestratorError::Validation(format!("unknown memory scope: {other:?}"))),
    }
}

struct MemorySearchHandler {
    memory: Arc<MemoryStore>,
}

#[async_trait]
impl ToolHandler for MemorySearchHandler {
    async fn call(&self, arguments: Value) -> Result<Value, OrchestratorError> {
        let scope = parse_scope(&arguments)?;
        let ref_id = reference_id(&arguments, scope)?;
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::Validation("missing query argument".to_string()))?;
        let hits = self.memory.search_text(scope, &ref_id, query).await;
        Ok(json!({"entries": hits}))
    }
}

struct MemoryStoreHandler {
    memory: Arc<MemoryStore>,
    agents: Arc<DashMap<String, AgentDef>>,
}

#[async_trait]
impl ToolHandler for MemoryStoreHandler {
    async fn call(&self, arguments: Value) -> Result<Value, OrchestratorError> {
        let scope = parse_scope(&arguments)?;
        let key = arguments
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::Validation("missing key argument".to_string()))?;
        let value = arguments
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::Validation("missing value argument".to_string()))?;
        let confidence = arguments.get("confidence").and_then(Value::as_f64).unwrap_or(1.0) as f32;
        let agent_id = arguments
            .get("_agent_id")
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::Internal("memory_store missing call context".to_string()))?;

        let entry = MemoryEntry::new(scope, key, value, agent_id, confidence);

        match scope {
            MemoryScope::Run => {
                let run_id = reference_id(&arguments, scope)?;
                self.memory.put_run(&run_id, entry);
            }
            MemoryScope::Project => {
                let project_ref = reference_id(&arguments, scope)?;
                let author = self
                    .agents
                    .get(agent_id)
                    .ok_or_else(|| OrchestratorError::Validation(format!("unknown agent {agent_id}")))?;
                self.memory.put_project(&project_ref, &author, entry)?;
            }
            MemoryScope::Global => {
                self.memory.put_global(entry).await;
            }
        }
        Ok(json!({"stored": true}))
    }
}

fn reference_id(arguments: &Value, scope: MemoryScope) -> Result<String, OrchestratorError> {
    if scope == MemoryScope::Global {
        return Ok(String::new());
    }
    arguments
        .get("ref_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| OrchestratorError::Validation("missing ref_id for run/project scope".to_string()))
}
