//! Token/cost usage accounting (spec §4.1 "Usage accounting").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration_ms: u64,
}

/// Per-million-token price in USD for a provider/model pair.
#[derive(Debug, Clone, Copy)]
pub struct PriceTable {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl PriceTable {
    pub fn cost(&self, usage: &Usage) -> f64 {
        let input_cost = usage.input_tokens as f64 / 1_000_000.0 * self.input_per_million;
        let output_cost = usage.output_tokens as f64 / 1_000_000.0 * self.output_per_million;
        input_cost + output_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_scales_with_tokens() {
        let table = PriceTable { input_per_million: 5.0, output_per_million: 15.0 };
        let usage = Usage { input_tokens: 1_000_000, output_tokens: 500_000, duration_ms: 100 };
        let cost = table.cost(&usage);
        assert!((cost - 12.5).abs() < 1e-9);
    }
}
