//! Tool descriptor: the declarative shape of one registered tool (spec §4.2).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OrchestratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    Read,
    Write,
    Exec,
    Network,
}

/// Per-tool timeout; build/test handlers get a longer budget than file ops
/// (§4.2 "run the handler with a timeout").
pub fn default_timeout_for(side_effect: SideEffect) -> std::time::Duration {
    match side_effect {
        SideEffect::Exec => std::time::Duration::from_secs(300),
        _ => std::time::Duration::from_secs(30),
    }
}

/// One tool's business logic. Registered under a stable id in the
/// [`super::registry::ToolRegistry`]; invoked only after ACL, schema, path,
/// and quota checks have all passed (§4.2 "Dispatch contract").
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<Value, OrchestratorError>;
}

/// Static descriptor for one tool.
pub struct ToolDescriptor {
    pub id: String,
    pub schema: Value,
    pub category: String,
    pub side_effect: SideEffect,
    pub handler: std::sync::Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn new(
        id: impl Into<String>,
        schema: Value,
        category: impl Into<String>,
        side_effect: SideEffect,
        handler: std::sync::Arc<dyn ToolHandler>,
    ) -> Self {
        Self { id: id.into(), schema, category: category.into(), side_effect, handler }
    }

    pub fn timeout(&self) -> std::time::Duration {
        default_timeout_for(self.side_effect)
    }

    /// Names of arguments declared with `"format": "path"` in the JSON
    /// schema (a standard annotation keyword, ignored by validation but read
    /// by [`super::registry`] for path confinement, §4.2 step 3).
    pub fn path_arguments(&self) -> Vec<String> {
        let Some(props) = self.schema.get("properties").and_then(Value::as_object) else {
            return Vec::new();
        };
        props
            .iter()
            .filter(|(_, v)| v.get("format").and_then(Value::as_str) == Some("path"))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Whether the tool's schema marks `arg_name` as accepting a directory
    /// (as opposed to a file); used for the `workspace_path` boundary case
    /// (§8 "Tool call with a path exactly equal to workspace_path").
    pub fn accepts_directory(&self, arg_name: &str) -> bool {
        self.schema
            .get("properties")
            .and_then(|p| p.get(arg_name))
            .and_then(|a| a.get("path_kind"))
            .and_then(Value::as_str)
            == Some("directory")
    }
}
