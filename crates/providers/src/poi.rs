use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use wayfarer_core::domain::travel::PlaceRecord;
use wayfarer_core::errors::ProviderError;
use wayfarer_db::repositories::CatalogRepository;

use crate::geo::{city_coordinates, map_category_to_kinds};
use crate::http::{error_for_status, error_for_transport};
use crate::query::PoiQuery;
use crate::retry::{with_retry, RetrySettings};

const PROVIDER_NAME: &str = "opentripmap";
const SEARCH_RADIUS_METERS: u32 = 5_000;

#[async_trait]
pub trait PoiProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Searches points of interest near the query city. An unsupported city
    /// is not an error; it returns an empty result set.
    async fn search(
        &self,
        query: &PoiQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<PlaceRecord>, ProviderError>;
}

/// POI search backed by the OpenTripMap radius endpoint. Fetched records are
/// upserted into the local places catalog as a side effect.
pub struct OpenTripMapProvider {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    catalog: Arc<dyn CatalogRepository>,
    retry: RetrySettings,
}

impl OpenTripMapProvider {
    pub fn new(
        http: reqwest::Client,
        api_key: SecretString,
        base_url: String,
        catalog: Arc<dyn CatalogRepository>,
        retry: RetrySettings,
    ) -> Self {
        Self { http, api_key, base_url, catalog, retry }
    }

    async fn fetch_radius(
        &self,
        lat: f64,
        lon: f64,
        kinds: &str,
        limit: u32,
    ) -> Result<RadiusResponse, ProviderError> {
        let url = format!("{}/radius", self.base_url.trim_end_matches('/'));
        let mut request = self.http.get(&url).query(&[
            ("apikey", self.api_key.expose_secret()),
            ("lat", &lat.to_string()),
            ("lon", &lon.to_string()),
            ("radius", &SEARCH_RADIUS_METERS.to_string()),
            ("limit", &limit.to_string()),
            ("format", "json"),
        ]);
        if !kinds.is_empty() {
            request = request.query(&[("kinds", kinds)]);
        }

        let response = request
            .send()
            .await
            .map_err(|error| error_for_transport(PROVIDER_NAME, &error))?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_for_status(PROVIDER_NAME, status));
        }
        response
            .json::<RadiusResponse>()
            .await
            .map_err(|error| ProviderError::unavailable(PROVIDER_NAME, format!("bad body: {error}")))
    }
}

#[async_trait]
impl PoiProvider for OpenTripMapProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn search(
        &self,
        query: &PoiQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<PlaceRecord>, ProviderError> {
        let Some((lat, lon)) = city_coordinates(&query.city) else {
            debug!(city = %query.city, "city not in gazetteer, returning no places");
            return Ok(Vec::new());
        };

        let kinds = query
            .categories
            .iter()
            .map(|category| map_category_to_kinds(category))
            .collect::<Vec<_>>()
            .join(",");

        let response = with_retry(PROVIDER_NAME, self.retry, || {
            self.fetch_radius(lat, lon, &kinds, query.limit)
        })
        .await?;

        let city = capitalize(&query.city);
        let country = query.country.as_deref().map(capitalize);
        let places: Vec<PlaceRecord> = response
            .features
            .into_iter()
            .filter_map(|feature| feature.into_place(&city, country.as_deref()))
            .collect();

        debug!(city = %city, count = places.len(), "poi radius search completed");
        if !places.is_empty() {
            let country = country.as_deref().unwrap_or_default();
            if let Err(error) = self.catalog.upsert_places(&city, country, &places, now).await {
                warn!(%error, city = %city, "failed to persist poi catalog rows");
            }
        }

        Ok(places)
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct RadiusResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: FeatureProperties,
    geometry: Option<Geometry>,
}

#[derive(Debug, Default, Deserialize)]
struct FeatureProperties {
    #[serde(default)]
    xid: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    kinds: String,
    rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// GeoJSON order: longitude first.
    coordinates: Vec<f64>,
}

impl Feature {
    fn into_place(self, city: &str, country: Option<&str>) -> Option<PlaceRecord> {
        if self.properties.name.trim().is_empty() {
            return None;
        }
        let geometry = self.geometry?;
        let [lon, lat] = geometry.coordinates[..] else {
            return None;
        };
        Some(PlaceRecord {
            external_id: self.properties.xid,
            name: self.properties.name,
            lat,
            lon,
            categories: self
                .properties
                .kinds
                .split(',')
                .map(|kind| kind.trim().to_string())
                .filter(|kind| !kind.is_empty())
                .collect(),
            rating: self.properties.rate,
            address: None,
            city: Some(city.to_string()),
            country: country.map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use secrecy::SecretString;
    use serde_json::json;

    use wayfarer_db::repositories::InMemoryCatalogRepository;

    use crate::query::PoiQuery;
    use crate::retry::RetrySettings;

    use super::{Feature, OpenTripMapProvider, PoiProvider, RadiusResponse};

    fn provider() -> OpenTripMapProvider {
        OpenTripMapProvider::new(
            reqwest::Client::new(),
            SecretString::from("test-key"),
            // Never reached; the gazetteer miss short-circuits first.
            "http://127.0.0.1:9".to_string(),
            Arc::new(InMemoryCatalogRepository::default()),
            RetrySettings::with_max_retries(0),
        )
    }

    #[tokio::test]
    async fn unknown_city_is_an_empty_success() {
        let query = PoiQuery::new("atlantis", None, vec![], 20);
        let places = provider().search(&query, Utc::now()).await.expect("search");
        assert!(places.is_empty());
    }

    #[test]
    fn features_without_a_name_are_dropped() {
        let response: RadiusResponse = serde_json::from_value(json!({
            "features": [
                {
                    "properties": {"xid": "W1", "name": "", "kinds": "museums"},
                    "geometry": {"coordinates": [23.7285, 37.9684]},
                },
                {
                    "properties": {"xid": "W2", "name": "Parthenon", "kinds": "historic,architecture", "rate": 7},
                    "geometry": {"coordinates": [23.7267, 37.9715]},
                },
            ]
        }))
        .expect("decode");

        let places: Vec<_> = response
            .features
            .into_iter()
            .filter_map(|feature: Feature| feature.into_place("Athens", Some("Greece")))
            .collect();

        assert_eq!(places.len(), 1);
        assert_eq!(places[0].external_id, "W2");
        assert_eq!(places[0].lat, 37.9715);
        assert_eq!(places[0].categories, vec!["historic", "architecture"]);
    }

    #[test]
    fn malformed_geometry_is_dropped() {
        let feature: Feature = serde_json::from_value(json!({
            "properties": {"xid": "W3", "name": "Somewhere"},
            "geometry": {"coordinates": [23.7]},
        }))
        .expect("decode");
        assert!(feature.into_place("Athens", None).is_none());
    }
}
