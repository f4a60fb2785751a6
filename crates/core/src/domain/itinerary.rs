use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::chat::{ItineraryId, SessionId};
use crate::domain::travel::BudgetTier;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Poi,
    Hotel,
    Meal,
    Transit,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poi => "poi",
            Self::Hotel => "hotel",
            Self::Meal => "meal",
            Self::Transit => "transit",
        }
    }
}

impl std::str::FromStr for ItemKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "poi" => Ok(Self::Poi),
            "hotel" => Ok(Self::Hotel),
            "meal" => Ok(Self::Meal),
            "transit" => Ok(Self::Transit),
            other => Err(DomainError::InvariantViolation(format!(
                "unsupported itinerary item kind `{other}` (expected poi|hotel|meal|transit)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItineraryItem {
    pub kind: ItemKind,
    pub name: String,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItineraryDay {
    pub day_index: u32,
    pub date: NaiveDate,
    pub items: Vec<ItineraryItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub id: ItineraryId,
    pub session_id: SessionId,
    pub city: String,
    pub country: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget_tier: BudgetTier,
    pub days: Vec<ItineraryDay>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::ItemKind;

    #[test]
    fn item_kind_round_trips() {
        for kind in [ItemKind::Poi, ItemKind::Hotel, ItemKind::Meal, ItemKind::Transit] {
            assert_eq!(kind.as_str().parse::<ItemKind>().expect("parse"), kind);
        }
    }
}
