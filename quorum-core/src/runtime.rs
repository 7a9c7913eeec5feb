//! `Runtime`: the explicit dependency-injection context every component
//! constructor takes instead of reaching for a global singleton (Design
//! Notes: "Global singletons for stores ... -> replace with an explicit
//! application context value threaded through component constructors").

use std::sync::Arc;

use quorum_config::OrchestratorConfig;

use crate::bus::MessageBus;
use crate::compress::CompactionConfig;
use crate::gateway::ModelGateway;
use crate::memory::MemoryStore;
use crate::model_spec::ModelLimitResolver;
use crate::tools::ToolRegistry;

/// Bundles the four leaf components (C1/C2/C3/C4) plus the cross-cutting
/// configuration that C5/C6/C7 consume. Constructed once per process and
/// cloned cheaply (every field is an `Arc`) down into executors, pattern
/// nodes, and the supervisor.
#[derive(Clone)]
pub struct Runtime {
    pub gateway: Arc<ModelGateway>,
    pub tools: Arc<ToolRegistry>,
    pub bus: Arc<MessageBus>,
    pub memory: Arc<MemoryStore>,
    pub model_limits: Arc<dyn ModelLimitResolver>,
    pub compaction: CompactionConfig,
    pub config: Arc<OrchestratorConfig>,
}

impl Runtime {
    pub fn new(
        gateway: Arc<ModelGateway>,
        tools: Arc<ToolRegistry>,
        bus: Arc<MessageBus>,
        memory: Arc<MemoryStore>,
        model_limits: Arc<dyn ModelLimitResolver>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            gateway,
            tools,
            bus,
            memory,
            model_limits,
            compaction: CompactionConfig::default(),
            config,
        }
    }

    pub fn with_compaction(mut self, compaction: CompactionConfig) -> Self {
        self.compaction = compaction;
        self
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("provider_default", &self.config.provider_default)
            .field("fallback_chain", &self.config.fallback_chain)
            .field("mailbox_capacity", &self.config.mailbox_capacity)
            .field("workspace_root", &self.config.workspace_root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryMessageStore;
    use crate::gateway::MockProvider;
    use crate::model_spec::StaticTableResolver;

    fn runtime() -> Runtime {
        let gateway = Arc::new(ModelGateway::new(vec![Arc::new(MockProvider::new("openai", "hi"))]));
        let tools = Arc::new(ToolRegistry::new(std::env::temp_dir()));
        let bus = Arc::new(MessageBus::new(Arc::new(InMemoryMessageStore::new())));
        let memory = Arc::new(MemoryStore::new());
        let model_limits = Arc::new(StaticTableResolver::new().with_common_defaults());
        let config = Arc::new(OrchestratorConfig::default());
        Runtime::new(gateway, tools, bus, memory, model_limits, config)
    }

    #[test]
    fn clone_shares_the_same_bus() {
        let rt = runtime();
        let cloned = rt.clone();
        assert!(Arc::ptr_eq(&rt.bus, &cloned.bus));
    }

    #[test]
    fn with_compaction_overrides_default() {
        let rt = runtime().with_compaction(CompactionConfig { compact_keep_recent: 3, ..CompactionConfig::default() });
        assert_eq!(rt.compaction.compact_keep_recent, 3);
    }
}
