//! Closed error taxonomy for the orchestration core (spec §7).
//!
//! Every fallible public API in this crate returns `Result<_, OrchestratorError>`
//! (or a narrower per-component error that `From`-converts into it). Variants
//! map directly onto the taxonomy: per-call failures an agent can adapt to,
//! engine-level failures that transition a phase, and infrastructure failures
//! that pause a run for human intervention.

use thiserror::Error;

/// Closed error type returned by components of the orchestration core.
#[derive(Debug, Error, Clone)]
pub enum OrchestratorError {
    /// Bad input from a caller; recoverable by fixing the request.
    #[error("validation error: {0}")]
    Validation(String),

    /// Tool call to a tool not in the agent's ACL.
    #[error("tool {tool_name} forbidden for agent {agent_id}")]
    ToolForbidden { agent_id: String, tool_name: String },

    /// A "path" argument resolved outside the run's workspace root.
    #[error("path escapes workspace: {0}")]
    PathEscape(String),

    /// A per-run tool-call or write quota was exceeded.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Tool call arguments failed schema validation.
    #[error("invalid arguments for tool {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    /// The gateway exhausted its fallback chain for a completion request.
    #[error("all providers exhausted for request")]
    ProvidersExhausted,

    /// A single gateway call could not be completed (e.g. cancelled mid-stream).
    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),

    /// The message bus is in degraded mode (persistence layer unavailable).
    #[error("message bus unavailable")]
    BusUnavailable,

    /// The backing key/value store is unavailable.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A phase or tool call exceeded its deadline.
    #[error("timed out: {0}")]
    TimedOut(String),

    /// An external cancellation signal was observed.
    #[error("cancelled")]
    Cancelled,

    /// Assertion-like internal failure; the run is paused for inspection.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// True for errors the spec says pause the run for human intervention
    /// rather than fail a phase (infrastructure failures, §7 "Propagation").
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            OrchestratorError::BusUnavailable
                | OrchestratorError::StorageUnavailable(_)
                | OrchestratorError::Internal(_)
        )
    }

    /// True for errors surfaced to the originating agent (it may retry or adapt)
    /// rather than the engine.
    pub fn is_agent_recoverable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::ToolForbidden { .. }
                | OrchestratorError::PathEscape(_)
                | OrchestratorError::QuotaExceeded(_)
                | OrchestratorError::InvalidArguments { .. }
        )
    }
}
