use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use wayfarer_core::domain::usage::{MonthKey, MonthlyUsageStats, SpendState, UsageRecord};
use wayfarer_db::repositories::{LedgerRepository, RepositoryError};
use wayfarer_providers::query::CacheCounters;

use crate::spend::SpendCapGuard;

const RECENT_LIMIT: u32 = 20;

/// Cache effectiveness counters since process start.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
}

impl CacheStats {
    pub fn from_counts(hits: u64, misses: u64) -> Self {
        let total = hits + misses;
        let hit_ratio = if total == 0 { 0.0 } else { hits as f64 / total as f64 };
        Self { hits, misses, hit_ratio }
    }
}

/// Point-in-time admin view over spend and provider-cache health.
#[derive(Clone, Debug, Serialize)]
pub struct AdminSnapshot {
    pub spend: SpendState,
    pub stats: MonthlyUsageStats,
    pub recent_usage: Vec<UsageRecord>,
    pub cache: CacheStats,
}

pub async fn build_snapshot(
    guard: &SpendCapGuard,
    ledger: &Arc<dyn LedgerRepository>,
    counters: &Arc<CacheCounters>,
    now: DateTime<Utc>,
) -> Result<AdminSnapshot, RepositoryError> {
    let month = MonthKey::for_timestamp(now);
    let spend = guard.evaluate(now).await?;
    let stats = ledger.monthly_stats(&month).await?;
    let recent_usage = ledger.recent(RECENT_LIMIT).await?;
    let cache = CacheStats::from_counts(counters.hits(), counters.misses());
    Ok(AdminSnapshot { spend, stats, recent_usage, cache })
}

#[cfg(test)]
mod tests {
    use super::CacheStats;

    #[test]
    fn ratio_is_zero_when_the_cache_is_cold() {
        let stats = CacheStats::from_counts(0, 0);
        assert_eq!(stats.hit_ratio, 0.0);
    }

    #[test]
    fn ratio_reflects_hits_over_lookups() {
        let stats = CacheStats::from_counts(3, 1);
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_ratio, 0.75);
    }
}
