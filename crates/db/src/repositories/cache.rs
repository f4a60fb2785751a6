use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use super::{CacheEntry, CacheRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCacheRepository {
    pool: DbPool,
}

impl SqlCacheRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CacheRepository for SqlCacheRepository {
    async fn get(
        &self,
        cache_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, RepositoryError> {
        let row = sqlx::query(
            "SELECT cache_key, provider, payload, created_at, expires_at
             FROM api_cache
             WHERE cache_key = ?",
        )
        .bind(cache_key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let entry = entry_from_row(row)?;
        if entry.is_fresh(now) {
            return Ok(Some(entry));
        }

        // Stale row: evict now rather than waiting for a sweep.
        sqlx::query("DELETE FROM api_cache WHERE cache_key = ?")
            .bind(cache_key)
            .execute(&self.pool)
            .await?;

        Ok(None)
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO api_cache (cache_key, provider, payload, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(cache_key) DO UPDATE SET
                provider = excluded.provider,
                payload = excluded.payload,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at",
        )
        .bind(&entry.cache_key)
        .bind(&entry.provider)
        .bind(entry.payload.to_string())
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM api_cache WHERE expires_at <= ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn entry_from_row(row: SqliteRow) -> Result<CacheEntry, RepositoryError> {
    let payload_raw = row.try_get::<String, _>("payload")?;
    let payload = serde_json::from_str(&payload_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid cached payload JSON: {error}"))
    })?;

    Ok(CacheEntry {
        cache_key: row.try_get("cache_key")?,
        provider: row.try_get("provider")?,
        payload,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        expires_at: parse_timestamp("expires_at", row.try_get("expires_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
