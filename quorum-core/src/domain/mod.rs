//! Domain types (spec §3): the data model shared by every component.
//!
//! `AgentDef` and `WorkflowDef` are read-mostly and content-hash versioned so a
//! mid-flight change can't silently alter a running workflow. `PatternRun` /
//! `PhaseState` are the mutable runtime record a `PatternRun` is exclusively
//! owned by the Mission Supervisor (C7); C6 borrows it while executing.

mod agent_def;
mod memory_entry;
mod message;
mod pattern_run;
mod phase_state;
mod tool_call;
mod visualization;
mod workflow_def;

pub use agent_def::{AgentDef, CapabilityGrade, VetoClass};
pub use memory_entry::{MemoryEntry, MemoryScope};
pub use message::{Message, MessageKind};
pub use pattern_run::{PatternRun, RunStatus};
pub use phase_state::{PhaseState, PhaseStatus, Verdict};
pub use tool_call::ToolCallRecord;
pub use visualization::{generate_dot, generate_text};
pub use workflow_def::{GateKind, PatternType, Phase, WorkflowDef};
