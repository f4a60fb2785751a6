use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use wayfarer_core::domain::travel::{BudgetTier, HotelRecord};
use wayfarer_core::errors::{ProviderError, ProviderErrorKind};
use wayfarer_db::repositories::{CacheEntry, CacheRepository, CatalogRepository};

use crate::http::{error_for_status, error_for_transport};
use crate::query::{cache_key, HotelQuery};
use crate::retry::{with_retry, RetrySettings};

use super::HotelProvider;

const PROVIDER_NAME: &str = "rapidapi_hotels";
const RAPIDAPI_HOST: &str = "booking-com.p.rapidapi.com";
/// Destination ids are effectively static, so they outlive the regular
/// response TTL by a wide margin.
const LOCATION_TTL_MULTIPLIER: i32 = 24;

/// Hotel search backed by the Booking.com RapidAPI gateway. Resolves the
/// city to a destination id first, then queries hotel availability with the
/// budget tier mapped onto a nightly price band.
pub struct RapidApiHotelProvider {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    cache: Arc<dyn CacheRepository>,
    catalog: Arc<dyn CatalogRepository>,
    ttl: Duration,
    retry: RetrySettings,
}

impl RapidApiHotelProvider {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        http: reqwest::Client,
        api_key: SecretString,
        base_url: String,
        cache: Arc<dyn CacheRepository>,
        catalog: Arc<dyn CatalogRepository>,
        ttl: Duration,
        retry: RetrySettings,
    ) -> Self {
        Self { http, api_key, base_url, cache, catalog, ttl, retry }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .get(self.endpoint(path))
            .header("X-RapidAPI-Key", self.api_key.expose_secret())
            .header("X-RapidAPI-Host", RAPIDAPI_HOST)
            .query(params)
            .send()
            .await
            .map_err(|error| error_for_transport(PROVIDER_NAME, &error))?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_for_status(PROVIDER_NAME, status));
        }
        response
            .json::<T>()
            .await
            .map_err(|error| ProviderError::unavailable(PROVIDER_NAME, format!("bad body: {error}")))
    }

    /// Resolves the city to a Booking destination id, consulting the cache
    /// first. Location lookups keep their own long-lived cache entries.
    async fn resolve_dest_id(
        &self,
        query: &HotelQuery,
        now: DateTime<Utc>,
    ) -> Result<String, ProviderError> {
        let params = json!({ "city": query.city, "country": query.country });
        let key = cache_key(PROVIDER_NAME, "locations_search", &params);

        match self.cache.get(&key, now).await {
            Ok(Some(entry)) => {
                if let Some(dest_id) =
                    entry.payload.get("dest_id").and_then(|value| value.as_str())
                {
                    return Ok(dest_id.to_string());
                }
            }
            Ok(None) => {}
            Err(error) => warn!(%error, "location cache lookup failed"),
        }

        let search_term = match &query.country {
            Some(country) => format!("{},{}", query.city, country),
            None => query.city.clone(),
        };
        let params =
            vec![("query", search_term.clone()), ("locale", "en-us".to_string())];
        let hits: Vec<LocationHit> = with_retry(PROVIDER_NAME, self.retry, || {
            self.get_json("locations/search", &params)
        })
        .await?;

        let dest_id = hits
            .into_iter()
            .find_map(|hit| hit.dest_id.map(|id| id.into_string()))
            .ok_or_else(|| {
                ProviderError::new(
                    PROVIDER_NAME,
                    ProviderErrorKind::NotFound,
                    format!("no destination found for `{search_term}`"),
                )
            })?;

        let entry = CacheEntry {
            cache_key: key,
            provider: PROVIDER_NAME.to_string(),
            payload: json!({ "dest_id": dest_id }),
            created_at: now,
            expires_at: now + self.ttl * LOCATION_TTL_MULTIPLIER,
        };
        if let Err(error) = self.cache.put(entry).await {
            warn!(%error, "failed to cache destination id");
        }

        Ok(dest_id)
    }

    async fn fetch_hotels(
        &self,
        dest_id: &str,
        tier: BudgetTier,
        limit: u32,
    ) -> Result<Vec<RapidHotel>, ProviderError> {
        let mut params = vec![
            ("dest_id", dest_id.to_string()),
            ("dest_type", "city".to_string()),
            ("order_by", "popularity".to_string()),
            ("adults_number", "2".to_string()),
            ("room_number", "1".to_string()),
            ("units", "metric".to_string()),
            ("locale", "en-us".to_string()),
            ("filter_by_currency", "EUR".to_string()),
            ("page_number", "0".to_string()),
        ];
        let (min_price, max_price) = tier_price_params(tier);
        if let Some(min) = min_price {
            params.push(("price_min", min.to_string()));
        }
        if let Some(max) = max_price {
            params.push(("price_max", max.to_string()));
        }

        let response: HotelsSearchResponse = with_retry(PROVIDER_NAME, self.retry, || {
            self.get_json("hotels/search", &params)
        })
        .await?;

        let mut hotels = response.result;
        hotels.truncate(limit as usize);
        Ok(hotels)
    }
}

#[async_trait]
impl HotelProvider for RapidApiHotelProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn search(
        &self,
        query: &HotelQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<HotelRecord>, ProviderError> {
        let dest_id = self.resolve_dest_id(query, now).await?;
        let city = query.display_city();
        let hotels: Vec<HotelRecord> = self
            .fetch_hotels(&dest_id, query.budget_tier, query.limit)
            .await?
            .into_iter()
            .filter_map(|hotel| hotel.into_record(&city, query.country.as_deref()))
            .collect();

        debug!(city = %city, tier = query.budget_tier.as_str(), count = hotels.len(), "hotel search completed");
        if !hotels.is_empty() {
            if let Err(error) = self.catalog.upsert_hotels(&hotels, now).await {
                warn!(%error, city = %city, "failed to persist hotel catalog rows");
            }
        }

        Ok(hotels)
    }
}

/// Nightly EUR bounds sent to the search endpoint per tier.
fn tier_price_params(tier: BudgetTier) -> (Option<u32>, Option<u32>) {
    match tier {
        BudgetTier::Budget => (None, Some(80)),
        BudgetTier::Mid => (Some(80), Some(150)),
        BudgetTier::Premium => (Some(150), None),
    }
}

#[derive(Debug, Deserialize)]
struct LocationHit {
    dest_id: Option<IdValue>,
}

#[derive(Debug, Deserialize)]
struct HotelsSearchResponse {
    #[serde(default)]
    result: Vec<RapidHotel>,
}

#[derive(Debug, Deserialize)]
struct RapidHotel {
    hotel_id: Option<IdValue>,
    hotel_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    /// Booking scores are on a 0..10 scale.
    review_score: Option<f64>,
    min_total_price: Option<f64>,
    url: Option<String>,
}

/// The gateway is inconsistent about numeric ids; some payloads carry them
/// as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(i64),
}

impl IdValue {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
        }
    }
}

impl RapidHotel {
    fn into_record(self, city: &str, country: Option<&str>) -> Option<HotelRecord> {
        let id = self.hotel_id?.into_string();
        let name = self.hotel_name.filter(|name| !name.trim().is_empty())?;
        Some(HotelRecord {
            external_id: format!("rapidapi_{id}"),
            name,
            city: city.to_string(),
            country: country.map(str::to_string),
            lat: self.latitude,
            lon: self.longitude,
            rating: self.review_score.map(|score| score / 2.0),
            price_eur_per_night: self.min_total_price,
            url: self.url,
        })
    }
}
