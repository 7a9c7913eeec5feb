//! # quorum-core
//!
//! The orchestration core underneath a multi-agent software-development
//! platform: a pattern/workflow execution engine, a bounded tool-calling
//! agent executor, an inter-agent message bus, and a multi-provider model
//! gateway.
//!
//! ## Design principles
//!
//! - **No global singletons**: every component takes its dependencies
//!   (gateway, registry, bus, store) through an explicit [`Runtime`],
//!   constructed once per process and threaded down through constructors.
//! - **Closed error taxonomy**: every fallible boundary returns
//!   [`error::OrchestratorError`], never a raw string or `anyhow::Error`.
//! - **Content-hash versioning**: [`domain::AgentDef`] and
//!   [`domain::WorkflowDef`] are read-mostly and hashed so an in-flight
//!   change can't silently mutate a running mission.
//!
//! ## Main modules
//!
//! - [`domain`]: the shared data model — [`domain::AgentDef`],
//!   [`domain::WorkflowDef`], [`domain::Message`], [`domain::PatternRun`],
//!   [`domain::PhaseState`], [`domain::MemoryEntry`], [`domain::ToolCallRecord`].
//! - [`gateway`]: C1, the model gateway — provider trait, circuit breaker,
//!   fallback chain, usage accounting.
//! - [`tools`]: C2, the tool registry — ACL, schema validation, path
//!   confinement, quotas, audit.
//! - [`bus`]: C3, the inter-agent message bus — priority mailboxes,
//!   durable-before-ack publish, dead-letter handling.
//! - [`memory`]: C4, the memory store — run/project/global scopes.
//! - [`executor`]: C5, the bounded reason-act agent executor.
//! - [`pattern`]: C6, the pattern engine — phase graph execution, gates.
//! - [`supervisor`]: C7, the mission supervisor — run lifecycle, resume,
//!   compliance verdicts.
//! - [`registry`]: the agent/workflow registration surface — content-hash
//!   versioned upsert, list, get.
//! - [`model_spec`]: context-window/output-limit resolution per model.
//! - [`compress`]: context compaction configuration and the compaction hook.
//! - [`error`]: [`error::OrchestratorError`], the closed error taxonomy.
//! - [`runtime`]: [`runtime::Runtime`], the explicit dependency-injection context.

pub mod bus;
pub mod compress;
pub mod domain;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod memory;
pub mod model_spec;
pub mod pattern;
pub mod registry;
pub mod runtime;
pub mod supervisor;
pub mod tools;

pub use domain::{
    AgentDef, CapabilityGrade, GateKind, MemoryEntry, MemoryScope, Message, MessageKind,
    PatternRun, PatternType, Phase, PhaseState, PhaseStatus, RunStatus, ToolCallRecord, Verdict,
    VetoClass, WorkflowDef,
};
pub use error::OrchestratorError;
pub use model_spec::{CachedResolver, ModelLimitResolver, ModelSpec, StaticTableResolver};
pub use registry::{AgentRegistry, Registration, UpsertOutcome, WorkflowRegistry};
pub use runtime::Runtime;
