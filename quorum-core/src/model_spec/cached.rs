//! Cached resolver: in-memory cache wrapper for any `ModelLimitResolver`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::resolver::ModelLimitResolver;
use super::spec::ModelSpec;

/// Wraps any resolver with an in-memory cache so repeated lookups for the
/// same `(provider_id, model_id)` pair don't re-hit the inner resolver.
pub struct CachedResolver<R> {
    inner: R,
    cache: Arc<RwLock<HashMap<(String, String), ModelSpec>>>,
}

impl<R> CachedResolver<R>
where
    R: ModelLimitResolver,
{
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}

#[async_trait]
impl<R> ModelLimitResolver for CachedResolver<R>
where
    R: ModelLimitResolver,
{
    async fn resolve(&self, provider_id: &str, model_id: &str) -> Option<ModelSpec> {
        let key = (provider_id.to_string(), model_id.to_string());
        if let Some(spec) = self.cache.read().await.get(&key).cloned() {
            return Some(spec);
        }
        let resolved = self.inner.resolve(provider_id, model_id).await?;
        self.cache.write().await.insert(key, resolved.clone());
        Some(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_spec::StaticTableResolver;

    #[tokio::test]
    async fn caches_resolved_value() {
        let cached = CachedResolver::new(StaticTableResolver::new().with_common_defaults());
        let first = cached.resolve("openai", "gpt-4o").await.unwrap();
        let second = cached.resolve("openai", "gpt-4o").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn clear_drops_cached_entries_but_inner_still_resolves() {
        let cached = CachedResolver::new(StaticTableResolver::new().with_common_defaults());
        let _ = cached.resolve("openai", "gpt-4o").await;
        cached.clear().await;
        assert!(cached.resolve("openai", "gpt-4o").await.is_some());
    }
}
