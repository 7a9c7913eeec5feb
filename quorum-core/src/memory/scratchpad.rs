//! Session-scope scratch memory (spec §4.4): read/write within a single
//! executor loop, used for chain-of-thought staging, never persisted.

use std::collections::HashMap;

/// Plain in-memory map owned by one `Executor` invocation. Dropped with the
/// executor at the end of its reason-act loop.
#[derive(Debug, Default, Clone)]
pub struct Scratchpad {
    entries: HashMap<String, String>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(key, value)` pairs for folding into the next round's
    /// assembled transcript.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
