//! `MemoryEntry`: a durable entry in the Memory Store (spec §3, §4.4).

use serde::{Deserialize, Serialize};

/// Persistent scopes. `Run` covers both the durable scratchpad entries and
/// the ephemeral per-phase scratchpad described in §3; the ephemeral
/// scratchpad itself is not a `MemoryEntry` (it never survives run teardown)
/// and is modeled separately in [`crate::memory::scratchpad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    Run,
    Project,
    Global,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub scope: MemoryScope,
    pub key: String,
    pub value: String,
    pub author_agent: String,
    pub confidence: f32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl MemoryEntry {
    pub fn new(
        scope: MemoryScope,
        key: impl Into<String>,
        value: impl Into<String>,
        author_agent: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            scope,
            key: key.into(),
            value: value.into(),
            author_agent: author_agent.into(),
            confidence: confidence.clamp(0.0, 1.0),
            created_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped_to_unit_interval() {
        let e = MemoryEntry::new(MemoryScope::Project, "k", "v", "alpha", 5.0);
        assert_eq!(e.confidence, 1.0);
        let e2 = MemoryEntry::new(MemoryScope::Project, "k", "v", "alpha", -1.0);
        assert_eq!(e2.confidence, 0.0);
    }
}
