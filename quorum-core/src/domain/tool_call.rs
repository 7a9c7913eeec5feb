//! `ToolCallRecord`: the audit record written after every tool invocation (spec §3, §4.2 step 6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub agent_id: String,
    pub run_id: String,
    pub tool_name: String,
    /// Digest of the arguments, not the raw arguments, to keep the audit log
    /// compact and avoid leaking large payloads (e.g. whole file contents)
    /// into the durable trail.
    pub arguments_digest: String,
    pub result_summary: String,
    pub success: bool,
    pub duration_ms: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ToolCallRecord {
    pub fn digest_arguments(arguments: &serde_json::Value) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        arguments.to_string().hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_for_equal_arguments() {
        let a = serde_json::json!({"path": "a.txt"});
        let b = serde_json::json!({"path": "a.txt"});
        assert_eq!(ToolCallRecord::digest_arguments(&a), ToolCallRecord::digest_arguments(&b));
    }

    #[test]
    fn digest_differs_for_different_arguments() {
        let a = serde_json::json!({"path": "a.txt"});
        let b = serde_json::json!({"path": "b.txt"});
        assert_ne!(ToolCallRecord::digest_arguments(&a), ToolCallRecord::digest_arguments(&b));
    }
}
