//! Stream event wire protocol: event type + payload + envelope.
//!
//! This crate defines the wire shape of one observer-stream event and envelope
//! injection. It has no dependency on `quorum-core`; `quorum-core`'s bus
//! bridges its internal events into `ProtocolEvent` and calls `to_json`.

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use event::ProtocolEvent;
