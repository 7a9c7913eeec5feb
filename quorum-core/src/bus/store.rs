//! Durable message storage backing the bus (spec §4.3 "Persistence").

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::Message;
use crate::error::OrchestratorError;

/// Durable, append-only message log. The bus calls `append` before a
/// `publish` is allowed to return `ok` (§4.3): readers and live observers
/// only ever see messages that have already cleared this call.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, msg: &Message) -> Result<(), OrchestratorError>;

    /// All messages for `run_id`, in append order, optionally filtered to a
    /// single phase and/or everything after `since_id`.
    async fn history(
        &self,
        run_id: &str,
        phase_id: Option<&str>,
        since_id: Option<uuid::Uuid>,
    ) -> Result<Vec<Message>, OrchestratorError>;
}

/// In-process message log. Suitable as the default backing store and for
/// tests; a production deployment swaps this for a durable key/value store
/// per §6 ("ordered scans by composite keys, atomic append for messages").
pub struct InMemoryMessageStore {
    runs: DashMap<String, Vec<Message>>,
    /// When set, `append` fails with `storage_unavailable` — used to drive
    /// the bus into degraded mode in tests.
    degraded: std::sync::atomic::AtomicBool,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self {
            runs: DashMap::new(),
            degraded: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn set_degraded(&self, degraded: bool) {
        self.degraded.store(degraded, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, msg: &Message) -> Result<(), OrchestratorError> {
        if self.degraded.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(OrchestratorError::StorageUnavailable(
                "message store is degraded".to_string(),
            ));
        }
        self.runs.entry(msg.run_id.clone()).or_default().push(msg.clone());
        Ok(())
    }

    async fn history(
        &self,
        run_id: &str,
        phase_id: Option<&str>,
        since_id: Option<uuid::Uuid>,
    ) -> Result<Vec<Message>, OrchestratorError> {
        let Some(entry) = self.runs.get(run_id) else {
            return Ok(Vec::new());
        };
        let mut found_since = since_id.is_none();
        let mut out = Vec::new();
        for msg in entry.iter() {
            if !found_since {
                if Some(msg.id) == since_id {
                    found_since = true;
                }
                continue;
            }
            if phase_id.is_some_and(|p| p != msg.phase_id) {
                continue;
            }
            out.push(msg.clone());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageKind;

    #[tokio::test]
    async fn append_then_history_roundtrips() {
        let store = InMemoryMessageStore::new();
        let m = Message::broadcast("r1", "p1", "alpha", MessageKind::Inform, "hi");
        store.append(&m).await.unwrap();
        let hist = store.history("r1", None, None).await.unwrap();
        assert_eq!(hist.len(), 1);
        assert_eq!(hist[0].content, "hi");
    }

    #[tokio::test]
    async fn degraded_store_rejects_append() {
        let store = InMemoryMessageStore::new();
        store.set_degraded(true);
        let m = Message::broadcast("r1", "p1", "alpha", MessageKind::Inform, "hi");
        assert!(matches!(
            store.append(&m).await,
            Err(OrchestratorError::StorageUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn history_filters_by_phase_and_since() {
        let store = InMemoryMessageStore::new();
        let m1 = Message::broadcast("r1", "p1", "alpha", MessageKind::Inform, "one");
        let m2 = Message::broadcast("r1", "p2", "alpha", MessageKind::Inform, "two");
        let m3 = Message::broadcast("r1", "p1", "alpha", MessageKind::Inform, "three");
        store.append(&m1).await.unwrap();
        store.append(&m2).await.unwrap();
        store.append(&m3).await.unwrap();

        let p1_only = store.history("r1", Some("p1"), None).await.unwrap();
        assert_eq!(p1_only.len(), 2);

        let after_m1 = store.history("r1", None, Some(m1.id)).await.unwrap();
        assert_eq!(after_m1.len(), 2);
        assert_eq!(after_m1[0].content, "two");
    }
}
