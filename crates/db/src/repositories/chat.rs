use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use wayfarer_core::domain::chat::{ChatMessage, MessageRole, SessionId};

use super::{ChatRepository, RepositoryError};
use crate::DbPool;

pub struct SqlChatRepository {
    pool: DbPool,
}

impl SqlChatRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ChatRepository for SqlChatRepository {
    async fn ensure_session(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO sessions (id, created_at, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
        )
        .bind(&session_id.0)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_message(&self, message: ChatMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO messages (
                session_id,
                role,
                content,
                tokens_in,
                tokens_out,
                cost_usd,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.session_id.0)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.tokens_in.map(i64::from))
        .bind(message.tokens_out.map(i64::from))
        .bind(message.cost_usd.map(|cost| cost.to_string()))
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_messages(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT session_id, role, content, tokens_in, tokens_out, cost_usd, created_at
             FROM (
                SELECT id, session_id, role, content, tokens_in, tokens_out, cost_usd, created_at
                FROM messages
                WHERE session_id = ?
                ORDER BY id DESC
                LIMIT ?
             )
             ORDER BY id ASC",
        )
        .bind(&session_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }
}

fn message_from_row(row: SqliteRow) -> Result<ChatMessage, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = role_raw
        .parse::<MessageRole>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    let cost_usd = row
        .try_get::<Option<String>, _>("cost_usd")?
        .map(|value| {
            value.parse::<Decimal>().map_err(|error| {
                RepositoryError::Decode(format!("invalid decimal in `cost_usd`: `{value}` ({error})"))
            })
        })
        .transpose()?;

    Ok(ChatMessage {
        session_id: SessionId(row.try_get("session_id")?),
        role,
        content: row.try_get("content")?,
        tokens_in: parse_optional_u32("tokens_in", row.try_get("tokens_in")?)?,
        tokens_out: parse_optional_u32("tokens_out", row.try_get("tokens_out")?)?,
        cost_usd,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_optional_u32(column: &str, value: Option<i64>) -> Result<Option<u32>, RepositoryError> {
    value
        .map(|raw| {
            u32::try_from(raw).map_err(|_| {
                RepositoryError::Decode(format!(
                    "invalid value for `{column}` (expected non-negative u32): {raw}"
                ))
            })
        })
        .transpose()
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
