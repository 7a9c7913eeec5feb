//! `Message`: the append-only unit of record on the bus (spec §3, §4.3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed tagged variant for a message's kind (Design Notes: "Stringly-typed
/// message kinds -> model as a closed tagged variant").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Inform,
    Request,
    Propose,
    Counter,
    Approve,
    Veto,
    ToolCall,
    ToolResult,
    System,
}

/// Highest mailbox priority; reserved for veto messages (§3 "priority always = 10 for veto").
pub const VETO_PRIORITY: u8 = 10;
/// Default priority for anything not otherwise specified.
pub const DEFAULT_PRIORITY: u8 = 5;

/// One append-only unit on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub run_id: String,
    pub phase_id: String,
    pub from_agent: String,
    /// Absent means broadcast to every participant in the phase.
    pub to_agent: Option<String>,
    pub kind: MessageKind,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub parent_id: Option<Uuid>,
    pub priority: u8,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Message {
    /// Builds a message, clamping priority to 1..=10 and forcing vetoes to
    /// the top priority regardless of what the caller passed (§3 invariant).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: impl Into<String>,
        phase_id: impl Into<String>,
        from_agent: impl Into<String>,
        to_agent: Option<String>,
        kind: MessageKind,
        content: impl Into<String>,
        priority: u8,
    ) -> Self {
        let priority = if kind == MessageKind::Veto {
            VETO_PRIORITY
        } else {
            priority.clamp(1, 10)
        };
        Self {
            id: Uuid::new_v4(),
            run_id: run_id.into(),
            phase_id: phase_id.into(),
            from_agent: from_agent.into(),
            to_agent,
            kind,
            content: content.into(),
            metadata: HashMap::new(),
            parent_id: None,
            priority,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn broadcast(
        run_id: impl Into<String>,
        phase_id: impl Into<String>,
        from_agent: impl Into<String>,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Self {
        Self::new(run_id, phase_id, from_agent, None, kind, content, DEFAULT_PRIORITY)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn is_verdict(&self) -> bool {
        matches!(self.kind, MessageKind::Approve | MessageKind::Veto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn veto_message_always_gets_top_priority() {
        let m = Message::new("r1", "p1", "beta", None, MessageKind::Veto, "no", 1);
        assert_eq!(m.priority, VETO_PRIORITY);
    }

    #[test]
    fn priority_is_clamped_to_valid_range() {
        let m = Message::new("r1", "p1", "beta", None, MessageKind::Inform, "hi", 200);
        assert_eq!(m.priority, 10);
        let m2 = Message::new("r1", "p1", "beta", None, MessageKind::Inform, "hi", 0);
        assert_eq!(m2.priority, 1);
    }

    #[test]
    fn broadcast_has_no_recipient() {
        let m = Message::broadcast("r1", "p1", "alpha", MessageKind::Inform, "hi");
        assert!(m.to_agent.is_none());
    }

    #[test]
    fn is_verdict_only_true_for_approve_and_veto() {
        assert!(Message::broadcast("r", "p", "a", MessageKind::Approve, "").is_verdict());
        assert!(Message::broadcast("r", "p", "a", MessageKind::Veto, "").is_verdict());
        assert!(!Message::broadcast("r", "p", "a", MessageKind::Inform, "").is_verdict());
    }
}
