//! `ModelGateway`: multi-provider routing, circuit breaker, fallback chain,
//! cooldown, and usage accounting (C1, spec §4.1).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::warn;

use crate::error::OrchestratorError;

use super::circuit_breaker::CircuitBreaker;
use super::provider::{CompletionRequest, CompletionResponse, Provider, ProviderCallError};
use super::usage::{PriceTable, Usage};

/// Default cooldown after a rate-limit failure (spec §4.1, overridable via
/// `COOLDOWN_SECONDS`).
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(90);

/// Outcome of a successful `complete` call: which provider served it, the
/// response, and the computed cost.
#[derive(Debug, Clone)]
pub struct GatewayResult {
    pub provider_id: String,
    pub response: CompletionResponse,
    pub cost: f64,
}

pub struct ModelGateway {
    providers: HashMap<String, Arc<dyn Provider>>,
    breakers: HashMap<String, CircuitBreaker>,
    cooldowns: DashMap<String, Instant>,
    cooldown_duration: Duration,
    price_tables: HashMap<String, PriceTable>,
}

impl ModelGateway {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self::with_cooldown(providers, DEFAULT_COOLDOWN)
    }

    pub fn with_cooldown(providers: Vec<Arc<dyn Provider>>, cooldown_duration: Duration) -> Self {
        let mut breakers = HashMap::new();
        let mut table = HashMap::new();
        for p in &providers {
            breakers.insert(p.id().to_string(), CircuitBreaker::new());
        }
        for p in &providers {
            table.insert(p.id().to_string(), PriceTable { input_per_million: 0.0, output_per_million: 0.0 });
        }
        Self {
            providers: providers.into_iter().map(|p| (p.id().to_string(), p)).collect(),
            breakers,
            cooldowns: DashMap::new(),
            cooldown_duration,
            price_tables: table,
        }
    }

    pub fn set_price_table(&mut self, provider_id: impl Into<String>, table: PriceTable) {
        self.price_tables.insert(provider_id.into(), table);
    }

    /// A provider is unhealthy if its breaker is open, or its last call was
    /// rate-limited within `cooldown_seconds` (§4.1 "Fallback chain").
    pub fn is_healthy(&self, provider_id: &str) -> bool {
        let breaker_ok = self.breakers.get(provider_id).map(|b| b.allow_request()).unwrap_or(false);
        if !breaker_ok {
            return false;
        }
        if let Some(until) = self.cooldowns.get(provider_id) {
            if Instant::now() < *until {
                return false;
            }
        }
        true
    }

    pub fn breaker_state(&self, provider_id: &str) -> Option<super::circuit_breaker::BreakerState> {
        self.breakers.get(provider_id).map(|b| b.state())
    }

    /// Tries each provider in `fallback_chain` in order, returning the first
    /// successful completion. Coerces temperature for providers that don't
    /// accept it, retries a transient failure once before it counts against
    /// the breaker, and skips unhealthy providers without attempting them.
    pub async fn complete(
        &self,
        fallback_chain: &[String],
        mut request: CompletionRequest,
    ) -> Result<GatewayResult, OrchestratorError> {
        for provider_id in fallback_chain {
            let Some(provider) = self.providers.get(provider_id) else {
                continue;
            };
            if !self.is_healthy(provider_id) {
                continue;
            }
            if !provider.accepts_temperature() {
                request.temperature = provider.default_temperature();
            }

            let outcome = self.attempt(provider.as_ref(), &request).await;
            match outcome {
                Ok(response) => {
                    if let Some(breaker) = self.breakers.get(provider_id) {
                        breaker.record_success();
                    }
                    let cost = self
                        .price_tables
                        .get(provider_id)
                        .map(|t| t.cost(&response.usage))
                        .unwrap_or(0.0);
                    return Ok(GatewayResult { provider_id: provider_id.clone(), response, cost });
                }
                Err(ProviderCallError::RateLimited) => {
                    self.cooldowns.insert(provider_id.clone(), Instant::now() + self.cooldown_duration);
                    warn!(provider = %provider_id, "rate limited, entering cooldown");
                }
                Err(err) => {
                    warn!(provider = %provider_id, error = %err, "provider call failed");
                    if let Some(breaker) = self.breakers.get(provider_id) {
                        breaker.record_hard_failure();
                    }
                }
            }
        }
        Err(OrchestratorError::ProvidersExhausted)
    }

    /// Sends once; a transient failure is retried exactly once at this level
    /// before it is surfaced to the breaker (§4.1 "Circuit breaker").
    async fn attempt(&self, provider: &dyn Provider, request: &CompletionRequest) -> Result<CompletionResponse, ProviderCallError> {
        match provider.send(request).await {
            Err(ProviderCallError::Transient(_)) => provider.send(request).await,
            other => other,
        }
    }
}

/// Token-rate limiter: the gateway maintains a per-provider token-rate
/// limiter (§5 "Provider quotas"); when saturated, callers block up to their
/// deadline rather than failing.
pub struct TokenRateLimiter {
    tokens_per_minute: u32,
    used: std::sync::Mutex<(Instant, u32)>,
}

impl TokenRateLimiter {
    pub fn new(tokens_per_minute: u32) -> Self {
        Self { tokens_per_minute, used: std::sync::Mutex::new((Instant::now(), 0)) }
    }

    /// Reserves `tokens` against the per-minute budget, blocking (via caller
    /// retry) until the budget resets if saturated. Returns `false` if the
    /// caller's `deadline` would be exceeded before the budget resets.
    pub fn try_reserve(&self, tokens: u32, deadline: Instant) -> bool {
        let mut guard = self.used.lock().unwrap();
        let (window_start, used) = *guard;
        let now = Instant::now();
        if now.duration_since(window_start) >= Duration::from_secs(60) {
            *guard = (now, tokens);
            return true;
        }
        if used + tokens <= self.tokens_per_minute {
            guard.1 += tokens;
            true
        } else {
            let reset_at = window_start + Duration::from_secs(60);
            reset_at <= deadline
        }
    }
}
