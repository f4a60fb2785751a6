use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

use wayfarer_core::domain::chat::SessionId;
use wayfarer_core::domain::usage::{MonthKey, SpendState, SpendStatus, UsageRecord};
use wayfarer_core::spend::estimate_call_cost;
use wayfarer_db::repositories::{LedgerRepository, RepositoryError};

use crate::llm::TokenUsage;

/// Monthly spend-cap enforcement over the usage ledger. State is always
/// derived by summing the month's records, never kept as a counter.
pub struct SpendCapGuard {
    ledger: Arc<dyn LedgerRepository>,
    cap_usd: Decimal,
}

impl SpendCapGuard {
    pub fn new(ledger: Arc<dyn LedgerRepository>, cap_usd: Decimal) -> Self {
        Self { ledger, cap_usd }
    }

    pub fn cap_usd(&self) -> Decimal {
        self.cap_usd
    }

    pub async fn evaluate(&self, now: DateTime<Utc>) -> Result<SpendState, RepositoryError> {
        let month = MonthKey::for_timestamp(now);
        let total = self.ledger.monthly_total(&month).await?;
        let state = SpendState::derive(month, self.cap_usd, total);
        if state.status == SpendStatus::Warn {
            warn!(
                month = %state.month_key.0,
                spent = %state.total_cost_usd,
                cap = %state.cap_usd,
                "monthly llm spend has passed the warn line"
            );
        }
        Ok(state)
    }

    /// Appends one ledger record for a completed LLM call. `blocked_after`
    /// is computed against the pre-insert total so the call that crosses the
    /// cap carries the flag. The read and the insert are separate statements,
    /// so concurrent crossing calls from different sessions can skew which
    /// record carries it. The flag only feeds the admin `blocked_calls`
    /// counter; enforcement always re-derives from the summed total.
    pub async fn record(
        &self,
        session_id: Option<SessionId>,
        model: &str,
        usage: TokenUsage,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord, RepositoryError> {
        let cost_usd = estimate_call_cost(model, usage.prompt_tokens, usage.completion_tokens);
        let month_key = MonthKey::for_timestamp(now);
        let total_before = self.ledger.monthly_total(&month_key).await?;
        let blocked_after = self.cap_usd > Decimal::ZERO
            && total_before < self.cap_usd
            && total_before + cost_usd >= self.cap_usd;

        let record = UsageRecord {
            id: Uuid::new_v4().to_string(),
            session_id,
            model: model.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cost_usd,
            month_key,
            blocked_after,
            created_at: now,
        };
        self.ledger.append(record.clone()).await?;

        if blocked_after {
            warn!(
                cap = %self.cap_usd,
                "monthly spend cap reached after this call, future calls will be blocked"
            );
        }
        Ok(record)
    }

    /// Budget-reached reply shown instead of calling the model.
    pub fn fallback_message(&self, state: &SpendState) -> String {
        format!(
            "I'm sorry, but I've reached the monthly budget limit of ${:.2} for this service. \
             The budget will reset next month. Currently spent: ${:.2}. \
             You can still view and export any itineraries you've already created.",
            state.cap_usd, state.total_cost_usd
        )
    }

    /// Operator escape hatch; not called from any conversation path.
    pub async fn reset_month(&self, month: &MonthKey) -> Result<u64, RepositoryError> {
        self.ledger.delete_month(month).await
    }
}
