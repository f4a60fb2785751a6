use chrono::{DateTime, Utc};

use wayfarer_core::domain::travel::HotelRecord;

use crate::repositories::{CatalogRepository, RepositoryError};

#[derive(Clone, Debug, PartialEq)]
pub struct SeedResult {
    pub hotels_inserted: usize,
}

/// Deterministic hotel dataset covering one hotel per budget tier in four
/// cities. Used by the stub hotel provider and the `seed` CLI command.
pub fn stub_hotels() -> Vec<HotelRecord> {
    fn hotel(
        external_id: &str,
        name: &str,
        city: &str,
        country: &str,
        lat: f64,
        lon: f64,
        rating: f64,
        price: f64,
        url: &str,
    ) -> HotelRecord {
        HotelRecord {
            external_id: external_id.to_string(),
            name: name.to_string(),
            city: city.to_string(),
            country: Some(country.to_string()),
            lat: Some(lat),
            lon: Some(lon),
            rating: Some(rating),
            price_eur_per_night: Some(price),
            url: Some(url.to_string()),
        }
    }

    vec![
        hotel(
            "stub_athens_1",
            "Hotel Grande Bretagne",
            "Athens",
            "Greece",
            37.9755,
            23.7348,
            5.0,
            280.0,
            "https://example.com/grande-bretagne",
        ),
        hotel(
            "stub_athens_2",
            "Hotel Plaka",
            "Athens",
            "Greece",
            37.9719,
            23.7285,
            4.2,
            120.0,
            "https://example.com/hotel-plaka",
        ),
        hotel(
            "stub_athens_3",
            "Athens Budget Inn",
            "Athens",
            "Greece",
            37.9838,
            23.7275,
            3.5,
            45.0,
            "https://example.com/budget-inn",
        ),
        hotel(
            "stub_paris_1",
            "The Ritz Paris",
            "Paris",
            "France",
            48.8681,
            2.3282,
            5.0,
            850.0,
            "https://example.com/ritz-paris",
        ),
        hotel(
            "stub_paris_2",
            "Hotel des Grands Boulevards",
            "Paris",
            "France",
            48.8718,
            2.3428,
            4.3,
            190.0,
            "https://example.com/grands-boulevards",
        ),
        hotel(
            "stub_paris_3",
            "Hotel Jeanne d'Arc",
            "Paris",
            "France",
            48.8534,
            2.3626,
            3.8,
            89.0,
            "https://example.com/jeanne-darc",
        ),
        hotel(
            "stub_london_1",
            "Claridge's",
            "London",
            "United Kingdom",
            51.5129,
            -0.1480,
            5.0,
            650.0,
            "https://example.com/claridges",
        ),
        hotel(
            "stub_london_2",
            "The Z Hotel Piccadilly",
            "London",
            "United Kingdom",
            51.5099,
            -0.1342,
            4.1,
            160.0,
            "https://example.com/z-hotel",
        ),
        hotel(
            "stub_london_3",
            "YHA London Central",
            "London",
            "United Kingdom",
            51.5188,
            -0.1142,
            3.6,
            55.0,
            "https://example.com/yha-central",
        ),
        hotel(
            "stub_rome_1",
            "Hotel de Russie",
            "Rome",
            "Italy",
            41.9109,
            12.4769,
            5.0,
            420.0,
            "https://example.com/de-russie",
        ),
        hotel(
            "stub_rome_2",
            "Hotel Artemide",
            "Rome",
            "Italy",
            41.9028,
            12.4964,
            4.2,
            180.0,
            "https://example.com/artemide",
        ),
        hotel(
            "stub_rome_3",
            "The RomeHello",
            "Rome",
            "Italy",
            41.8967,
            12.4822,
            3.9,
            70.0,
            "https://example.com/romehello",
        ),
    ]
}

pub async fn seed_stub_hotels(
    catalog: &dyn CatalogRepository,
    now: DateTime<Utc>,
) -> Result<SeedResult, RepositoryError> {
    let hotels = stub_hotels();
    catalog.upsert_hotels(&hotels, now).await?;
    Ok(SeedResult { hotels_inserted: hotels.len() })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{seed_stub_hotels, stub_hotels};
    use crate::repositories::{CatalogRepository, InMemoryCatalogRepository};

    #[test]
    fn dataset_has_three_hotels_per_city() {
        let hotels = stub_hotels();
        for city in ["Athens", "Paris", "London", "Rome"] {
            assert_eq!(hotels.iter().filter(|h| h.city == city).count(), 3, "city {city}");
        }
    }

    #[test]
    fn athens_covers_all_three_tiers() {
        use wayfarer_core::domain::travel::BudgetTier;

        let hotels = stub_hotels();
        for tier in [BudgetTier::Budget, BudgetTier::Mid, BudgetTier::Premium] {
            assert!(
                hotels.iter().any(|h| h.city == "Athens" && h.within_tier(tier)),
                "missing {} hotel in Athens",
                tier.as_str(),
            );
        }
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let catalog = InMemoryCatalogRepository::default();

        let first = seed_stub_hotels(&catalog, Utc::now()).await.expect("first seed");
        let second = seed_stub_hotels(&catalog, Utc::now()).await.expect("second seed");
        assert_eq!(first, second);

        let athens = catalog.list_hotels("Athens").await.expect("list");
        assert_eq!(athens.len(), 3);
    }
}
