//! Wire-level events carried on the live observer stream (§4.3 "Live fan-out").
//!
//! State-carrying variants use `serde_json::Value` so this crate has no
//! dependency on `quorum-core`'s domain types; the bridge in `quorum-core`
//! serializes a `Message`/`Usage` into one of these.

use serde::Serialize;
use serde_json::Value;

/// One event on an observer's live stream for a run.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// A phase began executing.
    PhaseEnter { phase_id: String },
    /// A phase reached a terminal state.
    PhaseExit { phase_id: String, state: Value },
    /// Token-level streaming delta from an in-flight completion.
    TokenDelta {
        agent_id: String,
        content: String,
    },
    /// A durable message was appended to the bus.
    MessageAppended { message: Value },
    /// Usage/cost update for a completed gateway call.
    Usage {
        provider_id: String,
        model_id: String,
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
        cost: f64,
    },
    /// A message was dropped because the recipient's mailbox was full.
    MessageDropped {
        from_agent: String,
        to_agent: String,
    },
    /// Circuit breaker transition for a provider.
    CircuitState { provider_id: String, state: String },
    /// A full checkpoint of run state was persisted (resume support).
    Checkpoint {
        run_id: String,
        phase_id: String,
        timestamp: String,
    },
    /// Free-form event for out-of-scope collaborators to piggyback on.
    Custom { value: Value },
}

impl ProtocolEvent {
    /// Serializes this event to a JSON object (type + payload only; no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
