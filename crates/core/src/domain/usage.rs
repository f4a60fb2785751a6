use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::chat::SessionId;

/// Month bucket in `YYYY-MM` form. Every ledger row carries one so monthly
/// aggregation is a plain indexed equality filter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonthKey(pub String);

impl MonthKey {
    pub fn for_timestamp(at: DateTime<Utc>) -> Self {
        Self(format!("{:04}-{:02}", at.year(), at.month()))
    }

    pub fn current() -> Self {
        Self::for_timestamp(Utc::now())
    }
}

/// One completed LLM call. Immutable once written; each round-trip to the
/// provider within a turn produces its own record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: String,
    pub session_id: Option<SessionId>,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd: Decimal,
    pub month_key: MonthKey,
    /// True when this call pushed the monthly total to or past the cap.
    pub blocked_after: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendStatus {
    Ok,
    Warn,
    Blocked,
}

/// Derived monthly spend position. Never persisted; always recomputed from
/// the ledger so the stored records and the derived state cannot drift.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpendState {
    pub month_key: MonthKey,
    pub cap_usd: Decimal,
    pub total_cost_usd: Decimal,
    pub remaining_usd: Decimal,
    pub percent_used: Decimal,
    pub status: SpendStatus,
}

impl SpendState {
    /// Classify a monthly total against the cap. The cap is an exclusive
    /// ceiling on already-spent cost: `total == cap` is Blocked.
    pub fn derive(month_key: MonthKey, cap_usd: Decimal, total_cost_usd: Decimal) -> Self {
        let warn_line = cap_usd * Decimal::new(8, 1);
        let status = if cap_usd > Decimal::ZERO && total_cost_usd >= cap_usd {
            SpendStatus::Blocked
        } else if cap_usd > Decimal::ZERO && total_cost_usd >= warn_line {
            SpendStatus::Warn
        } else {
            SpendStatus::Ok
        };

        let remaining_usd = (cap_usd - total_cost_usd).max(Decimal::ZERO);
        let percent_used = if cap_usd > Decimal::ZERO {
            (total_cost_usd / cap_usd) * Decimal::new(100, 0)
        } else {
            Decimal::ZERO
        };

        Self { month_key, cap_usd, total_cost_usd, remaining_usd, percent_used, status }
    }

    pub fn is_blocked(&self) -> bool {
        self.status == SpendStatus::Blocked
    }
}

/// Aggregate ledger counters for one month, for the admin surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonthlyUsageStats {
    pub month_key: MonthKey,
    pub total_cost_usd: Decimal,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_calls: u64,
    pub blocked_calls: u64,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{MonthKey, SpendState, SpendStatus};

    fn state(total_cents: i64, cap_cents: i64) -> SpendState {
        SpendState::derive(
            MonthKey("2025-06".to_string()),
            Decimal::new(cap_cents, 2),
            Decimal::new(total_cents, 2),
        )
    }

    #[test]
    fn month_key_is_zero_padded() {
        let at = Utc.with_ymd_and_hms(2025, 3, 5, 12, 0, 0).single().expect("timestamp");
        assert_eq!(MonthKey::for_timestamp(at).0, "2025-03");
    }

    #[test]
    fn under_warn_line_is_ok() {
        assert_eq!(state(799, 1000).status, SpendStatus::Ok);
    }

    #[test]
    fn warn_band_starts_at_eighty_percent() {
        assert_eq!(state(800, 1000).status, SpendStatus::Warn);
        assert_eq!(state(999, 1000).status, SpendStatus::Warn);
    }

    #[test]
    fn total_equal_to_cap_is_blocked() {
        assert_eq!(state(1000, 1000).status, SpendStatus::Blocked);
    }

    #[test]
    fn overshoot_is_blocked_with_zero_remaining() {
        let state = state(1010, 1000);
        assert_eq!(state.status, SpendStatus::Blocked);
        assert_eq!(state.remaining_usd, Decimal::ZERO);
    }

    #[test]
    fn zero_cap_reports_ok_rather_than_dividing() {
        let state = state(500, 0);
        assert_eq!(state.status, SpendStatus::Ok);
        assert_eq!(state.percent_used, Decimal::ZERO);
    }
}
