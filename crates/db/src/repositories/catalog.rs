use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use wayfarer_core::domain::travel::{HotelRecord, PlaceRecord};

use super::{CatalogRepository, RepositoryError};
use crate::DbPool;

/// Local mirror of normalized provider results. Rows are keyed by
/// `(external_id, city)` so a refreshed fetch updates in place.
pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn upsert_places(
        &self,
        city: &str,
        country: &str,
        records: &[PlaceRecord],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            let categories = serde_json::to_string(&record.categories)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;

            sqlx::query(
                "INSERT INTO places (
                    id, external_id, name, lat, lon, categories, rating, address,
                    city, country, fetched_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(external_id, city) DO UPDATE SET
                    name = excluded.name,
                    lat = excluded.lat,
                    lon = excluded.lon,
                    categories = excluded.categories,
                    rating = excluded.rating,
                    address = excluded.address,
                    country = excluded.country,
                    fetched_at = excluded.fetched_at",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&record.external_id)
            .bind(&record.name)
            .bind(record.lat)
            .bind(record.lon)
            .bind(categories)
            .bind(record.rating)
            .bind(record.address.as_deref())
            .bind(city)
            .bind(country)
            .bind(fetched_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_places(&self, city: &str) -> Result<Vec<PlaceRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT external_id, name, lat, lon, categories, rating, address, city, country
             FROM places
             WHERE city = ?
             ORDER BY name ASC",
        )
        .bind(city)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(place_from_row).collect()
    }

    async fn upsert_hotels(
        &self,
        records: &[HotelRecord],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                "INSERT INTO hotels (
                    id, external_id, name, city, country, lat, lon, rating,
                    price_eur_per_night, url, fetched_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(external_id, city) DO UPDATE SET
                    name = excluded.name,
                    country = excluded.country,
                    lat = excluded.lat,
                    lon = excluded.lon,
                    rating = excluded.rating,
                    price_eur_per_night = excluded.price_eur_per_night,
                    url = excluded.url,
                    fetched_at = excluded.fetched_at",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&record.external_id)
            .bind(&record.name)
            .bind(&record.city)
            .bind(record.country.as_deref())
            .bind(record.lat)
            .bind(record.lon)
            .bind(record.rating)
            .bind(record.price_eur_per_night)
            .bind(record.url.as_deref())
            .bind(fetched_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_hotels(&self, city: &str) -> Result<Vec<HotelRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT external_id, name, city, country, lat, lon, rating, price_eur_per_night, url
             FROM hotels
             WHERE city = ?
             ORDER BY name ASC",
        )
        .bind(city)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(hotel_from_row).collect()
    }
}

fn place_from_row(row: SqliteRow) -> Result<PlaceRecord, RepositoryError> {
    let categories_raw = row.try_get::<String, _>("categories")?;
    let categories = serde_json::from_str(&categories_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid categories JSON: {error}"))
    })?;

    Ok(PlaceRecord {
        external_id: row.try_get("external_id")?,
        name: row.try_get("name")?,
        lat: row.try_get("lat")?,
        lon: row.try_get("lon")?,
        categories,
        rating: row.try_get("rating")?,
        address: row.try_get("address")?,
        city: Some(row.try_get("city")?),
        country: Some(row.try_get("country")?),
    })
}

fn hotel_from_row(row: SqliteRow) -> Result<HotelRecord, RepositoryError> {
    Ok(HotelRecord {
        external_id: row.try_get("external_id")?,
        name: row.try_get("name")?,
        city: row.try_get("city")?,
        country: row.try_get("country")?,
        lat: row.try_get("lat")?,
        lon: row.try_get("lon")?,
        rating: row.try_get("rating")?,
        price_eur_per_night: row.try_get("price_eur_per_night")?,
        url: row.try_get("url")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use wayfarer_core::domain::travel::{HotelRecord, PlaceRecord};

    use super::SqlCatalogRepository;
    use crate::migrations;
    use crate::repositories::CatalogRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn place_upsert_refreshes_existing_row() {
        let pool = setup_pool().await;
        let repo = SqlCatalogRepository::new(pool.clone());
        let fetched_at = parse_ts("2025-06-01T12:00:00Z");

        let mut place = sample_place();
        repo.upsert_places("Athens", "Greece", &[place.clone()], fetched_at)
            .await
            .expect("first upsert");

        place.rating = Some(4.8);
        repo.upsert_places("Athens", "Greece", &[place.clone()], fetched_at)
            .await
            .expect("second upsert");

        let places = repo.list_places("Athens").await.expect("list");
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].rating, Some(4.8));

        pool.close().await;
    }

    #[tokio::test]
    async fn hotels_are_listed_per_city() {
        let pool = setup_pool().await;
        let repo = SqlCatalogRepository::new(pool.clone());
        let fetched_at = parse_ts("2025-06-01T12:00:00Z");

        let athens = sample_hotel("stub_athens_1", "Athens");
        let paris = sample_hotel("stub_paris_1", "Paris");
        repo.upsert_hotels(&[athens.clone(), paris], fetched_at).await.expect("upsert");

        let hotels = repo.list_hotels("Athens").await.expect("list");
        assert_eq!(hotels, vec![athens]);

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_place() -> PlaceRecord {
        PlaceRecord {
            external_id: "otm:W123".to_string(),
            name: "Acropolis".to_string(),
            lat: 37.9715,
            lon: 23.7257,
            categories: vec!["historic".to_string(), "museums".to_string()],
            rating: Some(4.5),
            address: Some("Athens 105 58".to_string()),
            city: Some("Athens".to_string()),
            country: Some("Greece".to_string()),
        }
    }

    fn sample_hotel(external_id: &str, city: &str) -> HotelRecord {
        HotelRecord {
            external_id: external_id.to_string(),
            name: format!("Hotel {city}"),
            city: city.to_string(),
            country: None,
            lat: None,
            lon: None,
            rating: Some(4.0),
            price_eur_per_night: Some(95.0),
            url: None,
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
