//! `MessageBus`: per-recipient mailboxes, priority ordering, durable append,
//! live fan-out to observers (spec §4.3).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use quorum_stream::ProtocolEvent;
use tokio::sync::{broadcast, Mutex, Notify};
use tracing::warn;

use crate::domain::{Message, MessageKind};
use crate::error::OrchestratorError;

use super::mailbox::Mailbox;
use super::store::MessageStore;

/// Default mailbox capacity (spec §4.3, overridable via `MAILBOX_CAPACITY`).
pub const DEFAULT_MAILBOX_CAPACITY: usize = 2000;
/// Replay buffer size for the live fan-out channel. Subscribers slower than
/// this lag behind and see a `RecvError::Lagged`; they should fall back to
/// `history()` for the gap.
const OBSERVER_CHANNEL_CAPACITY: usize = 4096;

type MailboxKey = (String, String);

/// Per-run, per-agent bounded priority mailboxes plus durable append and
/// observer fan-out.
pub struct MessageBus {
    store: Arc<dyn MessageStore>,
    mailbox_capacity: usize,
    mailboxes: DashMap<MailboxKey, Arc<Mutex<Mailbox>>>,
    arrivals: DashMap<MailboxKey, Arc<Notify>>,
    dead_letters: DashMap<(String, String, String), Vec<Message>>,
    observers: DashMap<String, broadcast::Sender<Message>>,
    protocol_observers: DashMap<String, broadcast::Sender<ProtocolEvent>>,
}

impl MessageBus {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self::with_capacity(store, DEFAULT_MAILBOX_CAPACITY)
    }

    pub fn with_capacity(store: Arc<dyn MessageStore>, mailbox_capacity: usize) -> Self {
        Self {
            store,
            mailbox_capacity,
            mailboxes: DashMap::new(),
            arrivals: DashMap::new(),
            dead_letters: DashMap::new(),
            observers: DashMap::new(),
            protocol_observers: DashMap::new(),
        }
    }

    fn mailbox_key(run_id: &str, agent_id: &str) -> MailboxKey {
        (run_id.to_string(), agent_id.to_string())
    }

    fn mailbox_for(&self, key: &MailboxKey) -> Arc<Mutex<Mailbox>> {
        self.mailboxes
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Mailbox::new(self.mailbox_capacity))))
            .clone()
    }

    fn notify_for(&self, key: &MailboxKey) -> Arc<Notify> {
        self.arrivals.entry(key.clone()).or_insert_with(|| Arc::new(Notify::new())).clone()
    }

    /// Publishes `msg` to `recipients` (the explicit `to_agent`, or every
    /// phase participant for a broadcast). Durably appends before enqueueing
    /// into any mailbox; a storage failure returns `bus_unavailable` and
    /// enqueues nothing (§4.3 "degraded mode").
    pub async fn publish(&self, msg: Message, recipients: &[String]) -> Result<(), OrchestratorError> {
        self.store.append(&msg).await.map_err(|e| match e {
            OrchestratorError::StorageUnavailable(_) => OrchestratorError::BusUnavailable,
            other => other,
        })?;

        if let Some(tx) = self.observers.get(&msg.run_id) {
            let _ = tx.send(msg.clone());
        }
        if let Ok(value) = serde_json::to_value(&msg) {
            self.publish_event(&msg.run_id, ProtocolEvent::MessageAppended { message: value });
        }

        for recipient in recipients {
            let key = Self::mailbox_key(&msg.run_id, recipient);
            let mailbox = self.mailbox_for(&key);
            let delivered = {
                let mut guard = mailbox.lock().await;
                guard.push(msg.clone())
            };
            if delivered {
                self.notify_for(&key).notify_waiters();
            } else {
                self.divert_to_dead_letter(&msg, recipient).await;
            }
        }
        Ok(())
    }

    async fn divert_to_dead_letter(&self, msg: &Message, recipient: &str) {
        warn!(run_id = %msg.run_id, to = %recipient, "mailbox full, diverting to dead letter");
        self.dead_letters
            .entry((msg.run_id.clone(), msg.from_agent.clone(), recipient.to_string()))
            .or_default()
            .push(msg.clone());

        let notice = Message::broadcast(
            msg.run_id.clone(),
            msg.phase_id.clone(),
            "system",
            MessageKind::System,
            format!("message_dropped: mailbox full for {recipient}"),
        )
        .with_metadata("event", "message_dropped")
        .with_metadata("to_agent", recipient);
        // Best-effort: a dropped-message notice is itself allowed to be
        // dropped rather than recursing into dead-letter handling again.
        let _ = self.store.append(&notice).await;
        if let Some(tx) = self.observers.get(&msg.run_id) {
            let _ = tx.send(notice);
        }
        self.publish_event(
            &msg.run_id,
            ProtocolEvent::MessageDropped { from_agent: msg.from_agent.clone(), to_agent: recipient.to_string() },
        );
    }

    /// Publishes a wire-protocol event to `run_id`'s live observer stream
    /// (token deltas, usage, circuit state, checkpoints — the events that
    /// aren't themselves `Message`s). Fire-and-forget: an event published
    /// with no subscriber listening is simply dropped, same as `subscribe`'s
    /// message channel.
    pub fn publish_event(&self, run_id: &str, event: ProtocolEvent) {
        if let Some(tx) = self.protocol_observers.get(run_id) {
            let _ = tx.send(event);
        }
    }

    /// Subscribes to `run_id`'s live protocol-event stream (spec §6 "Live
    /// observer streaming"). Companion to [`Self::subscribe`]; a full
    /// observer typically consumes both.
    pub fn subscribe_events(&self, run_id: &str) -> broadcast::Receiver<ProtocolEvent> {
        self.protocol_observers
            .entry(run_id.to_string())
            .or_insert_with(|| broadcast::channel(OBSERVER_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn dead_letters_for(&self, run_id: &str, from: &str, to: &str) -> Vec<Message> {
        self.dead_letters
            .get(&(run_id.to_string(), from.to_string(), to.to_string()))
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Blocks until a message is available for `(run_id, agent_id)` or
    /// `deadline` elapses, returning `Ok(None)` (the spec's `empty_mailbox`)
    /// on timeout.
    pub async fn receive(&self, run_id: &str, agent_id: &str, deadline: Duration) -> Result<Option<Message>, OrchestratorError> {
        let key = Self::mailbox_key(run_id, agent_id);
        let mailbox = self.mailbox_for(&key);
        let deadline_at = tokio::time::Instant::now() + deadline;
        loop {
            {
                let mut guard = mailbox.lock().await;
                if let Some(msg) = guard.pop() {
                    return Ok(Some(msg));
                }
            }
            let remaining = deadline_at.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let notify = self.notify_for(&key);
            let _ = tokio::time::timeout(remaining, notify.notified()).await;
        }
    }

    /// Subscribes an observer to `run_id`'s live message stream. The caller
    /// should first call `history()` (optionally phase- and since-filtered)
    /// for the replay window, then consume the returned receiver for live
    /// delivery; messages published between the two calls may be seen twice
    /// and the caller is expected to de-duplicate by `Message::id`.
    pub fn subscribe(&self, run_id: &str) -> broadcast::Receiver<Message> {
        self.observers
            .entry(run_id.to_string())
            .or_insert_with(|| broadcast::channel(OBSERVER_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub async fn history(
        &self,
        run_id: &str,
        phase_filter: Option<&str>,
        since_id: Option<uuid::Uuid>,
    ) -> Result<Vec<Message>, OrchestratorError> {
        self.store.history(run_id, phase_filter, since_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::store::InMemoryMessageStore;
    use crate::domain::MessageKind;

    fn bus() -> MessageBus {
        MessageBus::new(Arc::new(InMemoryMessageStore::new()))
    }

    #[tokio::test]
    async fn publish_then_receive_roundtrips() {
        let bus = bus();
        let msg = Message::new("r1", "p1", "alpha", Some("beta".into()), MessageKind::Inform, "hi", 5);
        bus.publish(msg, &["beta".to_string()]).await.unwrap();
        let received = bus.receive("r1", "beta", Duration::from_millis(50)).await.unwrap();
        assert_eq!(received.unwrap().content, "hi");
    }

    #[tokio::test]
    async fn receive_times_out_on_empty_mailbox() {
        let bus = bus();
        let received = bus.receive("r1", "beta", Duration::from_millis(10)).await.unwrap();
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn full_mailbox_diverts_to_dead_letter() {
        let bus = MessageBus::with_capacity(Arc::new(InMemoryMessageStore::new()), 1);
        let m1 = Message::new("r1", "p1", "alpha", Some("beta".into()), MessageKind::Inform, "one", 5);
        let m2 = Message::new("r1", "p1", "alpha", Some("beta".into()), MessageKind::Inform, "two", 5);
        bus.publish(m1, &["beta".to_string()]).await.unwrap();
        bus.publish(m2.clone(), &["beta".to_string()]).await.unwrap();

        let dead = bus.dead_letters_for("r1", "alpha", "beta");
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].content, "two");

        let history = bus.history("r1", None, None).await.unwrap();
        assert!(history.iter().any(|m| m.metadata.get("event").map(String::as_str) == Some("message_dropped")));
    }

    #[tokio::test]
    async fn degraded_store_rejects_publish() {
        let store = Arc::new(InMemoryMessageStore::new());
        store.set_degraded(true);
        let bus = MessageBus::new(store);
        let msg = Message::broadcast("r1", "p1", "alpha", MessageKind::Inform, "hi");
        let err = bus.publish(msg, &["beta".to_string()]).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::BusUnavailable));
    }

    #[tokio::test]
    async fn subscriber_sees_message_appended_event() {
        let bus = bus();
        let mut events = bus.subscribe_events("r1");
        let msg = Message::new("r1", "p1", "alpha", Some("beta".into()), MessageKind::Inform, "hi", 5);
        bus.publish(msg, &["beta".to_string()]).await.unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event, ProtocolEvent::MessageAppended { .. }));
    }

    #[tokio::test]
    async fn subscriber_sees_message_dropped_event_on_full_mailbox() {
        let bus = MessageBus::with_capacity(Arc::new(InMemoryMessageStore::new()), 1);
        let mut events = bus.subscribe_events("r1");
        let m1 = Message::new("r1", "p1", "alpha", Some("beta".into()), MessageKind::Inform, "one", 5);
        let m2 = Message::new("r1", "p1", "alpha", Some("beta".into()), MessageKind::Inform, "two", 5);
        bus.publish(m1, &["beta".to_string()]).await.unwrap();
        bus.publish(m2, &["beta".to_string()]).await.unwrap();

        let mut saw_dropped = false;
        for _ in 0..4 {
            match events.recv().await {
                Ok(ProtocolEvent::MessageDropped { to_agent, .. }) => {
                    saw_dropped = true;
                    assert_eq!(to_agent, "beta");
                    break;
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        assert!(saw_dropped);
    }

    #[tokio::test]
    async fn veto_outranks_queued_informs_in_mailbox() {
        let bus = bus();
        bus.publish(
            Message::new("r1", "p1", "alpha", Some("beta".into()), MessageKind::Inform, "a", 5),
            &["beta".to_string()],
        )
        .await
        .unwrap();
        bus.publish(
            Message::new("r1", "p1", "gamma", Some("beta".into()), MessageKind::Veto, "no", 1),
            &["beta".to_string()],
        )
        .await
        .unwrap();
        let first = bus.receive("r1", "beta", Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(first.kind, MessageKind::Veto);
    }
}
