//! Typed settings for the orchestration core, read from the environment after
//! [`crate::load_and_apply`] has applied `.env` / XDG config defaults.
//!
//! Every field has the default spec.md §6 states, so a process with no
//! environment configured at all still boots with sane values.

use std::collections::HashMap;
use std::time::Duration;

/// Provider id -> API key, collected from `PROVIDER_<ID>_API_KEY` variables.
pub type ProviderKeys = HashMap<String, String>;

/// Process-wide settings for the orchestration core.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Provider id used when a request does not specify one.
    pub provider_default: String,
    /// Ordered provider ids consulted when the preferred provider is unhealthy.
    pub fallback_chain: Vec<String>,
    /// API keys collected from `PROVIDER_<ID>_API_KEY`.
    pub provider_keys: ProviderKeys,
    /// Timeout for a single tool call (file ops; build/test tools override this).
    pub tool_call_timeout: Duration,
    /// Default phase timeout (`WorkflowDef.timeout` falls back to this).
    pub phase_timeout: Duration,
    /// Bounded mailbox capacity per agent.
    pub mailbox_capacity: usize,
    /// Cooldown applied to a provider after a rate-limit failure.
    pub cooldown: Duration,
    /// Sandbox root all workspace-relative tool paths must resolve under.
    pub workspace_root: std::path::PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider_default: "openai".to_string(),
            fallback_chain: Vec::new(),
            provider_keys: HashMap::new(),
            tool_call_timeout: Duration::from_secs(30),
            phase_timeout: Duration::from_secs(30 * 60),
            mailbox_capacity: 2_000,
            cooldown: Duration::from_secs(90),
            workspace_root: std::env::temp_dir().join("quorum-workspace"),
        }
    }
}

impl OrchestratorConfig {
    /// Reads settings from the process environment, falling back to defaults
    /// for anything unset. Does not itself load `.env`/XDG config; call
    /// [`crate::load_and_apply`] first if those sources should populate the
    /// environment.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("PROVIDER_DEFAULT") {
            cfg.provider_default = v;
        }
        if let Ok(v) = std::env::var("FALLBACK_CHAIN") {
            cfg.fallback_chain = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        for (key, value) in std::env::vars() {
            if let Some(rest) = key
                .strip_prefix("PROVIDER_")
                .and_then(|r| r.strip_suffix("_API_KEY"))
            {
                if !rest.is_empty() {
                    cfg.provider_keys.insert(rest.to_lowercase(), value);
                }
            }
        }
        if let Some(ms) = env_u64("TOOL_CALL_TIMEOUT_MS") {
            cfg.tool_call_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("PHASE_TIMEOUT_MS") {
            cfg.phase_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_u64("MAILBOX_CAPACITY") {
            cfg.mailbox_capacity = n as usize;
        }
        if let Some(s) = env_u64("COOLDOWN_SECONDS") {
            cfg.cooldown = Duration::from_secs(s);
        }
        if let Ok(v) = std::env::var("WORKSPACE_ROOT") {
            cfg.workspace_root = v.into();
        }

        cfg
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear() {
        for key in [
            "PROVIDER_DEFAULT",
            "FALLBACK_CHAIN",
            "TOOL_CALL_TIMEOUT_MS",
            "PHASE_TIMEOUT_MS",
            "MAILBOX_CAPACITY",
            "COOLDOWN_SECONDS",
            "WORKSPACE_ROOT",
            "PROVIDER_OPENAI_API_KEY",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn defaults_match_spec() {
        clear();
        let cfg = OrchestratorConfig::from_env();
        assert_eq!(cfg.provider_default, "openai");
        assert!(cfg.fallback_chain.is_empty());
        assert_eq!(cfg.tool_call_timeout, Duration::from_secs(30));
        assert_eq!(cfg.phase_timeout, Duration::from_secs(1800));
        assert_eq!(cfg.mailbox_capacity, 2_000);
        assert_eq!(cfg.cooldown, Duration::from_secs(90));
    }

    #[test]
    fn reads_fallback_chain_and_provider_keys() {
        clear();
        std::env::set_var("FALLBACK_CHAIN", "openai, anthropic ,local");
        std::env::set_var("PROVIDER_OPENAI_API_KEY", "sk-test");
        let cfg = OrchestratorConfig::from_env();
        assert_eq!(cfg.fallback_chain, vec!["openai", "anthropic", "local"]);
        assert_eq!(cfg.provider_keys.get("openai").map(String::as_str), Some("sk-test"));
        clear();
    }

    #[test]
    fn reads_numeric_overrides() {
        clear();
        std::env::set_var("TOOL_CALL_TIMEOUT_MS", "5000");
        std::env::set_var("MAILBOX_CAPACITY", "10");
        let cfg = OrchestratorConfig::from_env();
        assert_eq!(cfg.tool_call_timeout, Duration::from_millis(5000));
        assert_eq!(cfg.mailbox_capacity, 10);
        clear();
    }
}
