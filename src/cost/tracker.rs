use super::types::CostRates;
use crate::providers::TokenUsage;
use crate::store::{TokenUsageStats, UsageRecord, UsageStore};
use anyhow::Result;
use std::sync::Arc;

/// Prices completion usage and keeps the per-tenant ledger.
pub struct UsageTracker {
    store: Arc<dyn UsageStore>,
    rates: CostRates,
}

impl UsageTracker {
    pub fn new(store: Arc<dyn UsageStore>, rates: CostRates) -> Self {
        Self { store, rates }
    }

    pub fn rates(&self) -> &CostRates {
        &self.rates
    }

    /// Price and persist one completion call.
    pub fn record(
        &self,
        tenant_identifier: &str,
        chat_id: i64,
        usage: &TokenUsage,
    ) -> Result<UsageRecord> {
        let cost = self.rates.price(usage);
        let record = UsageRecord {
            tenant_identifier: tenant_identifier.to_string(),
            chat_id,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cost_usd: cost.usd,
            cost_local: cost.local,
            timestamp: chrono::Utc::now(),
        };
        self.store.record_usage(&record)?;
        tracing::debug!(
            tenant = tenant_identifier,
            chat_id,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            cost_usd = cost.usd,
            "Usage recorded"
        );
        Ok(record)
    }

    /// Aggregate every recorded call for a tenant.
    pub fn stats(&self, tenant_identifier: &str) -> Result<TokenUsageStats> {
        let records = self.store.usage_for_tenant(tenant_identifier)?;
        let mut stats = TokenUsageStats {
            bot_identifier: tenant_identifier.to_string(),
            total_requests: 0,
            total_prompt_tokens: 0,
            total_completion_tokens: 0,
            total_cost_usd: 0.0,
            total_cost_local: 0.0,
        };
        for record in &records {
            stats.total_requests += 1;
            stats.total_prompt_tokens = stats
                .total_prompt_tokens
                .saturating_add(record.prompt_tokens);
            stats.total_completion_tokens = stats
                .total_completion_tokens
                .saturating_add(record.completion_tokens);
            stats.total_cost_usd += record.cost_usd;
            stats.total_cost_local += record.cost_local;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn tracker() -> UsageTracker {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        UsageTracker::new(store, CostRates::default())
    }

    #[test]
    fn record_prices_and_persists() {
        let tracker = tracker();
        let usage = TokenUsage {
            prompt_tokens: 2000,
            completion_tokens: 1000,
            total_tokens: 3000,
        };
        let record = tracker.record("shopbot", 7, &usage).unwrap();
        assert!((record.cost_usd - 0.005).abs() < 1e-12);
        assert!((record.cost_local - 2.7).abs() < 1e-9);
        assert_eq!(record.total_tokens, 3000);
    }

    #[test]
    fn stats_aggregate_per_tenant() {
        let tracker = tracker();
        let usage = TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 150,
        };
        tracker.record("shopbot", 1, &usage).unwrap();
        tracker.record("shopbot", 2, &usage).unwrap();
        tracker.record("otherbot", 1, &usage).unwrap();

        let stats = tracker.stats("shopbot").unwrap();
        assert_eq!(stats.bot_identifier, "shopbot");
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.total_prompt_tokens, 200);
        assert_eq!(stats.total_completion_tokens, 100);
        assert!(stats.total_cost_usd > 0.0);
    }

    #[test]
    fn stats_for_unknown_tenant_are_zero() {
        let stats = tracker().stats("nobody").unwrap();
        assert_eq!(stats.total_requests, 0);
        assert!(stats.total_cost_local.abs() < f64::EPSILON);
    }
}
