//! `AgentDef`: declarative description of one worker (spec §3).

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Capability grade: organizers drive decisions, executors produce artefacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityGrade {
    Organizer,
    Executor,
}

/// How much weight an agent's `veto` carries.
///
/// Ordered `Absolute > Strong > Advisory > None` for gate evaluation (§4.6):
/// `absolute` blocks unconditionally, `strong` blocks a `no_veto` gate,
/// `advisory` is informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VetoClass {
    None,
    Advisory,
    Strong,
    Absolute,
}

/// Declarative description of one worker.
///
/// Immutable once referenced by a live run: a mid-flight edit to an `AgentDef`
/// that is already bound to a running `PatternRun` must not alter that run's
/// behaviour, which is why the registry versions definitions by content hash
/// (see [`AgentDef::content_hash`]) rather than by mutation in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDef {
    pub id: String,
    pub name: String,
    pub role: String,
    pub system_prompt: String,
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Tool ids this agent may call (§4.2 ACL).
    pub tools: HashSet<String>,
    pub capability_grade: CapabilityGrade,
    pub veto_class: VetoClass,
    /// Opaque prompt fragments (e.g. loaded from embedded YAML skill packs).
    #[serde(default)]
    pub skills: Vec<String>,
    /// Set by an organizer-grade agent with this flag to write project memory (§4.4).
    #[serde(default)]
    pub can_write_project_memory: bool,
}

impl AgentDef {
    /// Deterministic content hash used to version definitions (Design Notes:
    /// "AgentDefs and WorkflowDefs are globally shared, read-mostly, and
    /// versioned by content hash so a mid-flight change cannot silently
    /// alter a running workflow").
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.id.hash(&mut hasher);
        self.name.hash(&mut hasher);
        self.role.hash(&mut hasher);
        self.system_prompt.hash(&mut hasher);
        self.provider.hash(&mut hasher);
        self.model.hash(&mut hasher);
        self.temperature.to_bits().hash(&mut hasher);
        self.max_tokens.hash(&mut hasher);
        let mut tools: Vec<&String> = self.tools.iter().collect();
        tools.sort();
        tools.hash(&mut hasher);
        self.capability_grade.hash(&mut hasher);
        self.veto_class.hash(&mut hasher);
        self.skills.hash(&mut hasher);
        self.can_write_project_memory.hash(&mut hasher);
        hasher.finish()
    }

    pub fn may_call_tool(&self, tool_id: &str) -> bool {
        self.tools.contains(tool_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AgentDef {
        AgentDef {
            id: "alpha".into(),
            name: "Alpha".into(),
            role: "reviewer".into(),
            system_prompt: "Review the diff.".into(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            temperature: 0.2,
            max_tokens: 4096,
            tools: ["read_file".to_string()].into_iter().collect(),
            capability_grade: CapabilityGrade::Organizer,
            veto_class: VetoClass::Strong,
            skills: vec![],
            can_write_project_memory: false,
        }
    }

    #[test]
    fn veto_class_ordering_matches_escalation() {
        assert!(VetoClass::Absolute > VetoClass::Strong);
        assert!(VetoClass::Strong > VetoClass::Advisory);
        assert!(VetoClass::Advisory > VetoClass::None);
    }

    #[test]
    fn identical_content_hashes_equal() {
        let a = sample();
        let b = sample();
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn changed_field_changes_hash() {
        let a = sample();
        let mut b = sample();
        b.system_prompt = "Different prompt.".into();
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn may_call_tool_checks_acl() {
        let a = sample();
        assert!(a.may_call_tool("read_file"));
        assert!(!a.may_call_tool("write_file"));
    }
}
