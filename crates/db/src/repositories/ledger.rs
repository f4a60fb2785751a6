use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use wayfarer_core::domain::chat::SessionId;
use wayfarer_core::domain::usage::{MonthKey, MonthlyUsageStats, UsageRecord};

use super::{LedgerRepository, RepositoryError};
use crate::DbPool;

/// Costs are stored as decimal strings and summed in Rust rather than with
/// SQL SUM, which would coerce them through floating point.
pub struct SqlLedgerRepository {
    pool: DbPool,
}

impl SqlLedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LedgerRepository for SqlLedgerRepository {
    async fn append(&self, record: UsageRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO llm_ledger (
                id,
                session_id,
                model,
                prompt_tokens,
                completion_tokens,
                cost_usd,
                month_key,
                blocked_after,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(record.session_id.as_ref().map(|id| id.0.as_str()))
        .bind(&record.model)
        .bind(i64::from(record.prompt_tokens))
        .bind(i64::from(record.completion_tokens))
        .bind(record.cost_usd.to_string())
        .bind(&record.month_key.0)
        .bind(i64::from(record.blocked_after))
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn monthly_total(&self, month: &MonthKey) -> Result<Decimal, RepositoryError> {
        let rows = sqlx::query("SELECT cost_usd FROM llm_ledger WHERE month_key = ?")
            .bind(&month.0)
            .fetch_all(&self.pool)
            .await?;

        let mut total = Decimal::ZERO;
        for row in rows {
            total += parse_cost("cost_usd", row.try_get("cost_usd")?)?;
        }

        Ok(total)
    }

    async fn monthly_stats(&self, month: &MonthKey) -> Result<MonthlyUsageStats, RepositoryError> {
        let rows = sqlx::query(
            "SELECT prompt_tokens, completion_tokens, cost_usd, blocked_after
             FROM llm_ledger
             WHERE month_key = ?",
        )
        .bind(&month.0)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = MonthlyUsageStats {
            month_key: month.clone(),
            total_cost_usd: Decimal::ZERO,
            total_prompt_tokens: 0,
            total_completion_tokens: 0,
            total_calls: 0,
            blocked_calls: 0,
        };

        for row in rows {
            stats.total_cost_usd += parse_cost("cost_usd", row.try_get("cost_usd")?)?;
            stats.total_prompt_tokens += parse_tokens("prompt_tokens", row.try_get("prompt_tokens")?)?;
            stats.total_completion_tokens +=
                parse_tokens("completion_tokens", row.try_get("completion_tokens")?)?;
            stats.total_calls += 1;
            if row.try_get::<i64, _>("blocked_after")? != 0 {
                stats.blocked_calls += 1;
            }
        }

        Ok(stats)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<UsageRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                session_id,
                model,
                prompt_tokens,
                completion_tokens,
                cost_usd,
                month_key,
                blocked_after,
                created_at
             FROM llm_ledger
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }

    async fn delete_month(&self, month: &MonthKey) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM llm_ledger WHERE month_key = ?")
            .bind(&month.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn record_from_row(row: SqliteRow) -> Result<UsageRecord, RepositoryError> {
    Ok(UsageRecord {
        id: row.try_get("id")?,
        session_id: row.try_get::<Option<String>, _>("session_id")?.map(SessionId),
        model: row.try_get("model")?,
        prompt_tokens: parse_u32("prompt_tokens", row.try_get("prompt_tokens")?)?,
        completion_tokens: parse_u32("completion_tokens", row.try_get("completion_tokens")?)?,
        cost_usd: parse_cost("cost_usd", row.try_get("cost_usd")?)?,
        month_key: MonthKey(row.try_get("month_key")?),
        blocked_after: row.try_get::<i64, _>("blocked_after")? != 0,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_cost(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    value.parse::<Decimal>().map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_tokens(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u64): {value}"
        ))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
