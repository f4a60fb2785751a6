use async_trait::async_trait;
use chrono::{DateTime, Utc};

use wayfarer_core::domain::travel::HotelRecord;
use wayfarer_core::errors::ProviderError;

use crate::query::HotelQuery;

pub mod rapid;
pub mod stub;

pub use rapid::RapidApiHotelProvider;
pub use stub::StaticStubHotelProvider;

#[async_trait]
pub trait HotelProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Searches hotels in the query city, filtered to the budget tier's
    /// nightly price band.
    async fn search(
        &self,
        query: &HotelQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<HotelRecord>, ProviderError>;
}
