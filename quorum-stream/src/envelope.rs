//! Envelope (run_id, phase_id, event_id) wrapping each [`ProtocolEvent`].
//! `EnvelopeState` tracks the current phase and injects the envelope into each event.

use crate::event::ProtocolEvent;
use serde_json::Value;

/// Envelope fields attached to every observer-stream event.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Run id; constant for the lifetime of a subscription.
    pub run_id: Option<String>,
    /// Phase currently executing when the event was emitted.
    pub phase_id: Option<String>,
    /// Per-stream sequence number; monotonically increasing.
    pub event_id: Option<u64>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    pub fn with_phase_id(mut self, id: impl Into<String>) -> Self {
        self.phase_id = Some(id.into());
        self
    }

    pub fn with_event_id(mut self, id: u64) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Merges envelope fields into the given JSON object (top-level only).
    /// Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.run_id {
            obj.entry("run_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(ref id) = self.phase_id {
            obj.entry("phase_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(id) = self.event_id {
            obj.entry("event_id")
                .or_insert_with(|| Value::Number(serde_json::Number::from(id)));
        }
    }
}

/// Envelope state for one subscription: run id, current phase, next event_id.
pub struct EnvelopeState {
    pub run_id: String,
    pub current_phase_id: String,
    pub next_event_id: u64,
}

impl EnvelopeState {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            current_phase_id: String::new(),
            next_event_id: 1,
        }
    }

    /// Injects envelope into the event value and advances state.
    /// On `type == "phase_enter"`, updates `current_phase_id` from the event's `phase_id`.
    pub fn inject_into(&mut self, value: &mut Value) {
        if let Some(t) = value.get("type").and_then(|v| v.as_str()) {
            if t == "phase_enter" {
                if let Some(id) = value.get("phase_id").and_then(|v| v.as_str()) {
                    self.current_phase_id = id.to_string();
                }
            }
        }
        let phase_id = self.current_phase_id.as_str();
        let env = Envelope::new()
            .with_run_id(&self.run_id)
            .with_phase_id(phase_id)
            .with_event_id(self.next_event_id);
        self.next_event_id += 1;
        env.inject_into(value);
    }
}

/// Converts a protocol event to JSON and injects the envelope using the given state.
pub fn to_json(
    event: &ProtocolEvent,
    state: &mut EnvelopeState,
) -> Result<Value, serde_json::Error> {
    let mut value = event.to_value()?;
    state.inject_into(&mut value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ProtocolEvent;

    #[test]
    fn envelope_inject() {
        let mut obj = serde_json::json!({"type":"phase_enter","phase_id":"think"});
        let env = Envelope::new()
            .with_run_id("run-1")
            .with_phase_id("think")
            .with_event_id(1);
        env.inject_into(&mut obj);
        assert_eq!(obj["run_id"], "run-1");
        assert_eq!(obj["phase_id"], "think");
        assert_eq!(obj["event_id"], 1);
        assert_eq!(obj["type"], "phase_enter");
    }

    #[test]
    fn to_json_injects_envelope_and_tracks_phase() {
        let ev = ProtocolEvent::PhaseEnter {
            phase_id: "draft".to_string(),
        };
        let mut state = EnvelopeState::new("run-123".to_string());
        let value = to_json(&ev, &mut state).unwrap();
        assert_eq!(value["type"], "phase_enter");
        assert_eq!(value["phase_id"], "draft");
        assert_eq!(value["run_id"], "run-123");
        assert_eq!(value["event_id"], 1);

        let ev2 = ProtocolEvent::TokenDelta {
            agent_id: "alpha".into(),
            content: "hi".into(),
        };
        let value2 = to_json(&ev2, &mut state).unwrap();
        assert_eq!(value2["phase_id"], "draft");
        assert_eq!(value2["event_id"], 2);
    }
}
