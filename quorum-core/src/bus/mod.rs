//! The inter-agent message bus (C3, spec §4.3): per-recipient bounded
//! priority mailboxes, durable-before-ack publish, dead-letter diversion,
//! and live fan-out to observers.

mod bus;
mod mailbox;
mod store;

pub use bus::{MessageBus, DEFAULT_MAILBOX_CAPACITY};
pub use mailbox::Mailbox;
pub use store::{InMemoryMessageStore, MessageStore};
