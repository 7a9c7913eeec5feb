//! `MemoryStore`: the four-scope key/value store (spec §4.4).
//!
//! Session-scope memory (read/write within a single executor loop) is never
//! persisted and therefore is not modeled here at all; it lives as a plain
//! local map inside [`crate::executor::Executor`] for the duration of one
//! reason-act loop.

use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::domain::{AgentDef, MemoryEntry, MemoryScope};
use crate::error::OrchestratorError;

/// Four-scope memory store. The core defines scope semantics, not the
/// backing store (§4.4): this in-process implementation is the default and
/// reference backend; a durable deployment swaps the inner maps for a
/// key/value store with the collections named in §6.
pub struct MemoryStore {
    run: DashMap<String, Vec<MemoryEntry>>,
    project: DashMap<String, Vec<MemoryEntry>>,
    global: RwLock<Vec<MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            run: DashMap::new(),
            project: DashMap::new(),
            global: RwLock::new(Vec::new()),
        }
    }

    /// Run scratchpad write. Any agent participating in the run may write;
    /// callers are expected to have already checked phase participation.
    pub fn put_run(&self, run_id: &str, entry: MemoryEntry) {
        self.run.entry(run_id.to_string()).or_default().push(entry);
    }

    /// Destroys a run's scratchpad. Called by the supervisor when a run
    /// reaches a terminal status (§4.4 "destroyed when the run terminates").
    pub fn destroy_run(&self, run_id: &str) {
        self.run.remove(run_id);
    }

    /// Project memory write, gated on `AgentDef.can_write_project_memory`
    /// (§4.4).
    pub fn put_project(&self, project_ref: &str, author: &AgentDef, entry: MemoryEntry) -> Result<(), OrchestratorError> {
        if !author.can_write_project_memory {
            return Err(OrchestratorError::Validation(format!(
                "agent {} is not permitted to write project memory",
                author.id
            )));
        }
        self.project.entry(project_ref.to_string()).or_default().push(entry);
        Ok(())
    }

    /// Global memory write. Only the Mission Supervisor calls this (§4.4
    /// "write only by the Mission Supervisor on retrospective finalisation");
    /// enforced by construction, not at this API boundary.
    pub async fn put_global(&self, entry: MemoryEntry) {
        self.global.write().await.push(entry);
    }

    fn scope_entries<'a>(&'a self, scope: MemoryScope, ref_id: &str, buf: &mut Vec<MemoryEntry>) {
        match scope {
            MemoryScope::Run => {
                if let Some(v) = self.run.get(ref_id) {
                    buf.extend(v.iter().cloned());
                }
            }
            MemoryScope::Project => {
                if let Some(v) = self.project.get(ref_id) {
                    buf.extend(v.iter().cloned());
                }
            }
            MemoryScope::Global => {
                // ref_id is ignored for global scope; filled in by async caller.
                let _ = ref_id;
            }
        }
    }

    async fn all_entries(&self, scope: MemoryScope, ref_id: &str) -> Vec<MemoryEntry> {
        let mut buf = Vec::new();
        if scope == MemoryScope::Global {
            buf.extend(self.global.read().await.iter().cloned());
        } else {
            self.scope_entries(scope, ref_id, &mut buf);
        }
        buf
    }

    /// Most recent entry with an exact key match.
    pub async fn get_exact(&self, scope: MemoryScope, ref_id: &str, key: &str) -> Option<MemoryEntry> {
        self.all_entries(scope, ref_id)
            .await
            .into_iter()
            .filter(|e| e.key == key)
            .max_by_key(|e| e.created_at)
    }

    /// All entries whose key starts with `prefix`, most recent first.
    pub async fn get_prefix(&self, scope: MemoryScope, ref_id: &str, prefix: &str) -> Vec<MemoryEntry> {
        let mut entries: Vec<MemoryEntry> = self
            .all_entries(scope, ref_id)
            .await
            .into_iter()
            .filter(|e| e.key.starts_with(prefix))
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    /// Best-effort full-text match over `value`, ranked by recency × confidence
    /// (§4.4). Matching is a case-insensitive substring test; the core defines
    /// the ranking semantics, not a search engine.
    pub async fn search_text(&self, scope: MemoryScope, ref_id: &str, query: &str) -> Vec<MemoryEntry> {
        let query = query.to_lowercase();
        let now = chrono::Utc::now();
        let mut hits: Vec<(f64, MemoryEntry)> = self
            .all_entries(scope, ref_id)
            .await
            .into_iter()
            .filter(|e| e.value.to_lowercase().contains(&query))
            .map(|e| {
                let age_hours = (now - e.created_at).num_seconds().max(0) as f64 / 3600.0;
                let recency = 1.0 / (1.0 + age_hours);
                (recency * e.confidence as f64, e)
            })
            .collect();
        hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        hits.into_iter().map(|(_, e)| e).collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn writer() -> AgentDef {
        AgentDef {
            id: "alpha".into(),
            name: "Alpha".into(),
            role: "organizer".into(),
            system_prompt: String::new(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            temperature: 0.2,
            max_tokens: 1024,
            tools: HashSet::new(),
            capability_grade: crate::domain::CapabilityGrade::Organizer,
            veto_class: crate::domain::VetoClass::None,
            skills: vec![],
            can_write_project_memory: true,
        }
    }

    #[tokio::test]
    async fn run_scratchpad_destroyed_on_terminate() {
        let store = MemoryStore::new();
        store.put_run("r1", MemoryEntry::new(MemoryScope::Run, "k", "v", "alpha", 1.0));
        assert!(store.get_exact(MemoryScope::Run, "r1", "k").await.is_some());
        store.destroy_run("r1");
        assert!(store.get_exact(MemoryScope::Run, "r1", "k").await.is_none());
    }

    #[tokio::test]
    async fn project_write_requires_flag() {
        let store = MemoryStore::new();
        let mut non_writer = writer();
        non_writer.can_write_project_memory = false;
        let entry = MemoryEntry::new(MemoryScope::Project, "k", "v", "alpha", 1.0);
        assert!(store.put_project("proj", &non_writer, entry).is_err());

        let entry2 = MemoryEntry::new(MemoryScope::Project, "k", "v", "alpha", 1.0);
        assert!(store.put_project("proj", &writer(), entry2).is_ok());
    }

    #[tokio::test]
    async fn get_exact_returns_most_recent() {
        let store = MemoryStore::new();
        store.put_run("r1", MemoryEntry::new(MemoryScope::Run, "k", "old", "alpha", 0.5));
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        store.put_run("r1", MemoryEntry::new(MemoryScope::Run, "k", "new", "alpha", 0.5));
        let latest = store.get_exact(MemoryScope::Run, "r1", "k").await.unwrap();
        assert_eq!(latest.value, "new");
    }

    #[tokio::test]
    async fn prefix_lookup_matches_key_family() {
        let store = MemoryStore::new();
        store.put_run("r1", MemoryEntry::new(MemoryScope::Run, "plan/step1", "a", "alpha", 0.5));
        store.put_run("r1", MemoryEntry::new(MemoryScope::Run, "plan/step2", "b", "alpha", 0.5));
        store.put_run("r1", MemoryEntry::new(MemoryScope::Run, "other", "c", "alpha", 0.5));
        let hits = store.get_prefix(MemoryScope::Run, "r1", "plan/").await;
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn global_write_and_read() {
        let store = MemoryStore::new();
        store.put_global(MemoryEntry::new(MemoryScope::Global, "retro", "learned X", "supervisor", 0.9)).await;
        let hit = store.get_exact(MemoryScope::Global, "ignored", "retro").await;
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn search_text_ranks_by_confidence() {
        let store = MemoryStore::new();
        store.put_run("r1", MemoryEntry::new(MemoryScope::Run, "a", "the quick fox", "alpha", 0.2));
        store.put_run("r1", MemoryEntry::new(MemoryScope::Run, "b", "the quick hare", "alpha", 0.9));
        let hits = store.search_text(MemoryScope::Run, "r1", "quick").await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].value, "the quick hare");
    }
}
