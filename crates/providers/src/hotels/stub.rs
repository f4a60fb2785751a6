use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use wayfarer_core::domain::travel::HotelRecord;
use wayfarer_core::errors::ProviderError;
use wayfarer_db::repositories::CatalogRepository;

use crate::query::HotelQuery;

use super::HotelProvider;

const PROVIDER_NAME: &str = "static_stub";

/// Hotel search over the seeded catalog rows. The default offline backend;
/// it never touches the network, so there is no caching or retry layer.
pub struct StaticStubHotelProvider {
    catalog: Arc<dyn CatalogRepository>,
}

impl StaticStubHotelProvider {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl HotelProvider for StaticStubHotelProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn search(
        &self,
        query: &HotelQuery,
        _now: DateTime<Utc>,
    ) -> Result<Vec<HotelRecord>, ProviderError> {
        let city = query.display_city();
        let mut hotels: Vec<HotelRecord> = self
            .catalog
            .list_hotels(&city)
            .await
            .map_err(|error| ProviderError::unavailable(PROVIDER_NAME, error.to_string()))?
            .into_iter()
            .filter(|hotel| hotel.within_tier(query.budget_tier))
            .collect();
        hotels.truncate(query.limit as usize);
        debug!(
            city = %city,
            tier = query.budget_tier.as_str(),
            count = hotels.len(),
            "stub hotel search"
        );
        Ok(hotels)
    }
}
