//! Static table resolver: a fixed `(provider_id, model_id) -> ModelSpec` map,
//! populated at construction from config or compiled-in defaults.

use std::collections::HashMap;

use async_trait::async_trait;

use super::resolver::ModelLimitResolver;
use super::spec::ModelSpec;

/// Resolver backed by a fixed in-memory table.
#[derive(Default)]
pub struct StaticTableResolver {
    table: HashMap<(String, String), ModelSpec>,
}

impl StaticTableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(
        mut self,
        provider_id: impl Into<String>,
        model_id: impl Into<String>,
        spec: ModelSpec,
    ) -> Self {
        self.table.insert((provider_id.into(), model_id.into()), spec);
        self
    }

    /// A small set of common defaults, so a fresh gateway has reasonable
    /// ceilings before any operator configuration is applied.
    pub fn with_common_defaults(self) -> Self {
        self.with_entry("openai", "gpt-4o", ModelSpec::new(128_000, 16_384))
            .with_entry("openai", "gpt-4o-mini", ModelSpec::new(128_000, 16_384))
            .with_entry("anthropic-style", "default", ModelSpec::new(200_000, 8_192))
    }
}

#[async_trait]
impl ModelLimitResolver for StaticTableResolver {
    async fn resolve(&self, provider_id: &str, model_id: &str) -> Option<ModelSpec> {
        self.table
            .get(&(provider_id.to_string(), model_id.to_string()))
            .cloned()
    }
}
