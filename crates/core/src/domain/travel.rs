use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaceId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HotelId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetTier {
    Budget,
    Mid,
    Premium,
}

impl BudgetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Mid => "mid",
            Self::Premium => "premium",
        }
    }

    /// Nightly EUR price band used to filter hotel results.
    pub fn price_band_eur(&self) -> (Option<f64>, Option<f64>) {
        match self {
            Self::Budget => (None, Some(80.0)),
            Self::Mid => (Some(80.0), Some(150.0)),
            Self::Premium => (Some(150.0), None),
        }
    }
}

impl std::str::FromStr for BudgetTier {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "budget" => Ok(Self::Budget),
            "mid" => Ok(Self::Mid),
            "premium" => Ok(Self::Premium),
            other => Err(DomainError::InvariantViolation(format!(
                "unsupported budget tier `{other}` (expected budget|mid|premium)"
            ))),
        }
    }
}

/// Inclusive travel date range. Construction enforces the non-inverted
/// invariant, so a stored range never needs re-checking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DomainError> {
        if end < start {
            return Err(DomainError::InvariantViolation(format!(
                "inverted date range: {start} to {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Normalized point-of-interest record shared by every POI source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub external_id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub categories: Vec<String>,
    pub rating: Option<f64>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// Normalized hotel record shared by every hotel source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HotelRecord {
    pub external_id: String,
    pub name: String,
    pub city: String,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub rating: Option<f64>,
    pub price_eur_per_night: Option<f64>,
    pub url: Option<String>,
}

impl HotelRecord {
    pub fn within_tier(&self, tier: BudgetTier) -> bool {
        let Some(price) = self.price_eur_per_night else {
            return false;
        };
        let (min, max) = tier.price_band_eur();
        min.map_or(true, |floor| price > floor) && max.map_or(true, |ceiling| price <= ceiling)
    }
}
