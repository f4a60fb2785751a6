use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::Row;

use wayfarer_core::domain::chat::{ItineraryId, SessionId};
use wayfarer_core::domain::itinerary::{Itinerary, ItineraryDay, ItineraryItem, ItemKind};
use wayfarer_core::domain::travel::BudgetTier;

use super::{ItineraryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlItineraryRepository {
    pool: DbPool,
}

impl SqlItineraryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ItineraryRepository for SqlItineraryRepository {
    /// Writes the header, days, and items in one transaction. Re-saving an
    /// itinerary id replaces its day structure wholesale.
    async fn save(&self, itinerary: Itinerary) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO itineraries (
                id, session_id, city, country, start_date, end_date, budget_tier, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                city = excluded.city,
                country = excluded.country,
                start_date = excluded.start_date,
                end_date = excluded.end_date,
                budget_tier = excluded.budget_tier",
        )
        .bind(&itinerary.id.0)
        .bind(&itinerary.session_id.0)
        .bind(&itinerary.city)
        .bind(itinerary.country.as_deref())
        .bind(itinerary.start_date.to_string())
        .bind(itinerary.end_date.to_string())
        .bind(itinerary.budget_tier.as_str())
        .bind(itinerary.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        // Cascade clears items for the replaced days.
        sqlx::query("DELETE FROM itinerary_days WHERE itinerary_id = ?")
            .bind(&itinerary.id.0)
            .execute(&mut *tx)
            .await?;

        for day in &itinerary.days {
            let day_id = sqlx::query(
                "INSERT INTO itinerary_days (itinerary_id, day_index, date) VALUES (?, ?, ?)",
            )
            .bind(&itinerary.id.0)
            .bind(i64::from(day.day_index))
            .bind(day.date.to_string())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            for (position, item) in day.items.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO itinerary_items (
                        day_id, kind, name, start_time, end_time, notes, position
                     ) VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(day_id)
                .bind(item.kind.as_str())
                .bind(&item.name)
                .bind(item.start_time.map(|t| t.to_string()))
                .bind(item.end_time.map(|t| t.to_string()))
                .bind(item.notes.as_deref())
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ItineraryId) -> Result<Option<Itinerary>, RepositoryError> {
        let header = sqlx::query(
            "SELECT id, session_id, city, country, start_date, end_date, budget_tier, created_at
             FROM itineraries
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let day_rows = sqlx::query(
            "SELECT id, day_index, date
             FROM itinerary_days
             WHERE itinerary_id = ?
             ORDER BY day_index ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut days = Vec::with_capacity(day_rows.len());
        for day_row in day_rows {
            let day_id = day_row.try_get::<i64, _>("id")?;
            let item_rows = sqlx::query(
                "SELECT kind, name, start_time, end_time, notes
                 FROM itinerary_items
                 WHERE day_id = ?
                 ORDER BY position ASC",
            )
            .bind(day_id)
            .fetch_all(&self.pool)
            .await?;

            let mut items = Vec::with_capacity(item_rows.len());
            for item_row in item_rows {
                let kind_raw = item_row.try_get::<String, _>("kind")?;
                items.push(ItineraryItem {
                    kind: kind_raw
                        .parse::<ItemKind>()
                        .map_err(|error| RepositoryError::Decode(error.to_string()))?,
                    name: item_row.try_get("name")?,
                    start_time: parse_optional_time(
                        "start_time",
                        item_row.try_get("start_time")?,
                    )?,
                    end_time: parse_optional_time("end_time", item_row.try_get("end_time")?)?,
                    notes: item_row.try_get("notes")?,
                });
            }

            days.push(ItineraryDay {
                day_index: parse_u32("day_index", day_row.try_get("day_index")?)?,
                date: parse_date("date", day_row.try_get("date")?)?,
                items,
            });
        }

        let tier_raw = header.try_get::<String, _>("budget_tier")?;

        Ok(Some(Itinerary {
            id: ItineraryId(header.try_get("id")?),
            session_id: SessionId(header.try_get("session_id")?),
            city: header.try_get("city")?,
            country: header.try_get("country")?,
            start_date: parse_date("start_date", header.try_get("start_date")?)?,
            end_date: parse_date("end_date", header.try_get("end_date")?)?,
            budget_tier: tier_raw
                .parse::<BudgetTier>()
                .map_err(|error| RepositoryError::Decode(error.to_string()))?,
            days,
            created_at: parse_timestamp("created_at", header.try_get("created_at")?)?,
        }))
    }
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_date(column: &str, value: String) -> Result<NaiveDate, RepositoryError> {
    value.parse::<NaiveDate>().map_err(|error| {
        RepositoryError::Decode(format!("invalid date in `{column}`: `{value}` ({error})"))
    })
}

fn parse_optional_time(
    column: &str,
    value: Option<String>,
) -> Result<Option<NaiveTime>, RepositoryError> {
    value
        .map(|raw| {
            raw.parse::<NaiveTime>().map_err(|error| {
                RepositoryError::Decode(format!("invalid time in `{column}`: `{raw}` ({error})"))
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
