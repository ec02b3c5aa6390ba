use crate::config::CostConfig;
use crate::providers::TokenUsage;
use serde::{Deserialize, Serialize};

/// Prices applied to completion usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRates {
    /// USD per 1K prompt tokens
    pub prompt_usd_per_1k: f64,
    /// USD per 1K completion tokens
    pub completion_usd_per_1k: f64,
    /// ISO code of the local reporting currency
    pub local_currency: String,
    /// Local currency units per USD
    pub usd_exchange_rate: f64,
}

impl From<&CostConfig> for CostRates {
    fn from(config: &CostConfig) -> Self {
        Self {
            prompt_usd_per_1k: config.prompt_usd_per_1k,
            completion_usd_per_1k: config.completion_usd_per_1k,
            local_currency: config.local_currency.clone(),
            usd_exchange_rate: config.usd_exchange_rate,
        }
    }
}

impl Default for CostRates {
    fn default() -> Self {
        Self::from(&CostConfig::default())
    }
}

/// Cost of one completion in USD and in the local currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CallCost {
    pub usd: f64,
    pub local: f64,
}

impl CostRates {
    #[allow(clippy::cast_precision_loss)]
    pub fn price(&self, usage: &TokenUsage) -> CallCost {
        // Calculate cost: (tokens / 1K) * price_per_1k
        let prompt_cost = (usage.prompt_tokens as f64 / 1000.0) * self.prompt_usd_per_1k;
        let completion_cost =
            (usage.completion_tokens as f64 / 1000.0) * self.completion_usd_per_1k;
        let usd = prompt_cost + completion_cost;
        CallCost {
            usd,
            local: usd * self.usd_exchange_rate,
        }
    }
}
