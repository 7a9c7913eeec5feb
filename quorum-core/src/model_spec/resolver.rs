//! Resolver trait for model token-limit lookup.

use async_trait::async_trait;

use super::spec::ModelSpec;

/// Resolves a `(provider_id, model_id)` pair to its token-limit spec.
///
/// Used by the gateway to decide request shaping and by the context-compaction
/// hook to decide when a phase transcript must be summarised before reuse.
#[async_trait]
pub trait ModelLimitResolver: Send + Sync {
    async fn resolve(&self, provider_id: &str, model_id: &str) -> Option<ModelSpec>;
}
