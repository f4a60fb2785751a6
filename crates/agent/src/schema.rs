use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::{json, Value};

use wayfarer_core::domain::itinerary::ItemKind;
use wayfarer_core::domain::travel::{BudgetTier, DateRange};

pub const TOOL_NAME: &str = "execute_travel_action";

const DEFAULT_POI_LIMIT: u32 = 20;
const DEFAULT_HOTEL_LIMIT: u32 = 10;
const MAX_RESULT_LIMIT: u32 = 50;

/// A structured tool request emitted by the model. Arguments stay as raw
/// JSON text until validation so malformed payloads become tool-level
/// validation errors.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolInvocation {
    pub invocation_id: String,
    pub tool_name: String,
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PoiSearchArgs {
    pub city: String,
    pub country: Option<String>,
    pub categories: Vec<String>,
    pub limit: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HotelSearchArgs {
    pub city: String,
    pub country: Option<String>,
    pub budget_tier: BudgetTier,
    pub limit: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActivityPlan {
    pub kind: ItemKind,
    pub name: String,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DayPlan {
    pub day_index: u32,
    pub date: NaiveDate,
    pub activities: Vec<ActivityPlan>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FinalizeArgs {
    pub city: String,
    pub country: Option<String>,
    pub date_range: DateRange,
    pub budget_tier: BudgetTier,
    pub days: Vec<DayPlan>,
}

/// One validated travel action.
#[derive(Clone, Debug, PartialEq)]
pub enum TravelAction {
    SearchPois(PoiSearchArgs),
    SearchHotels(HotelSearchArgs),
    FinalizeItinerary(FinalizeArgs),
}

impl TravelAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchPois(_) => "search_pois",
            Self::SearchHotels(_) => "search_hotels",
            Self::FinalizeItinerary(_) => "finalize_itinerary",
        }
    }

    /// Parses and validates raw tool-call arguments. No provider is touched
    /// here; every failure is a local validation error.
    pub fn parse(tool_name: &str, raw_arguments: &str) -> Result<Self, ValidationError> {
        if tool_name != TOOL_NAME {
            return Err(ValidationError(format!("unknown tool `{tool_name}`")));
        }
        let raw: RawAction = serde_json::from_str(raw_arguments)
            .map_err(|error| ValidationError(format!("arguments are not valid JSON: {error}")))?;

        let city = raw
            .city
            .as_deref()
            .map(str::trim)
            .filter(|city| !city.is_empty())
            .ok_or_else(|| ValidationError("city is required".to_string()))?
            .to_string();
        let country = raw.country.filter(|country| !country.trim().is_empty());

        match raw.action.as_deref() {
            Some("search_pois") => Ok(Self::SearchPois(PoiSearchArgs {
                city,
                country,
                categories: raw.categories.unwrap_or_default(),
                limit: clamp_limit(raw.limit, DEFAULT_POI_LIMIT)?,
            })),
            Some("search_hotels") => Ok(Self::SearchHotels(HotelSearchArgs {
                city,
                country,
                budget_tier: parse_tier(raw.budget_tier.as_deref())?.unwrap_or(BudgetTier::Mid),
                limit: clamp_limit(raw.limit, DEFAULT_HOTEL_LIMIT)?,
            })),
            Some("finalize_itinerary") => {
                let start = parse_date("start_date", raw.start_date.as_deref())?;
                let end = parse_date("end_date", raw.end_date.as_deref())?;
                let date_range = DateRange::new(start, end)
                    .map_err(|error| ValidationError(error.to_string()))?;
                let budget_tier =
                    parse_tier(raw.budget_tier.as_deref())?.unwrap_or(BudgetTier::Mid);
                let raw_days = raw.days.unwrap_or_default();
                if raw_days.is_empty() {
                    return Err(ValidationError("days must not be empty".to_string()));
                }
                let days = raw_days
                    .into_iter()
                    .map(RawDay::validate)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::FinalizeItinerary(FinalizeArgs {
                    city,
                    country,
                    date_range,
                    budget_tier,
                    days,
                }))
            }
            Some(other) => Err(ValidationError(format!("unknown action `{other}`"))),
            None => Err(ValidationError("action is required".to_string())),
        }
    }
}

fn clamp_limit(limit: Option<i64>, default: u32) -> Result<u32, ValidationError> {
    match limit {
        None => Ok(default),
        Some(value) if value >= 1 && value <= MAX_RESULT_LIMIT as i64 => Ok(value as u32),
        Some(value) => Err(ValidationError(format!(
            "limit {value} is out of range (expected 1..={MAX_RESULT_LIMIT})"
        ))),
    }
}

fn parse_tier(raw: Option<&str>) -> Result<Option<BudgetTier>, ValidationError> {
    match raw {
        None => Ok(None),
        Some(value) => value
            .parse::<BudgetTier>()
            .map(Some)
            .map_err(|error| ValidationError(error.to_string())),
    }
}

fn parse_date(field: &str, raw: Option<&str>) -> Result<NaiveDate, ValidationError> {
    let raw = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ValidationError(format!("{field} is required")))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ValidationError(format!("{field} `{raw}` is not a YYYY-MM-DD date")))
}

fn parse_time(raw: Option<String>) -> Option<NaiveTime> {
    let raw = raw?;
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

#[derive(Debug, Deserialize)]
struct RawAction {
    action: Option<String>,
    city: Option<String>,
    country: Option<String>,
    categories: Option<Vec<String>>,
    budget_tier: Option<String>,
    limit: Option<i64>,
    start_date: Option<String>,
    end_date: Option<String>,
    days: Option<Vec<RawDay>>,
}

#[derive(Debug, Deserialize)]
struct RawDay {
    day_index: Option<u32>,
    date: Option<String>,
    #[serde(default)]
    activities: Vec<RawActivity>,
}

impl RawDay {
    fn validate(self) -> Result<DayPlan, ValidationError> {
        let day_index = self
            .day_index
            .ok_or_else(|| ValidationError("day_index is required for every day".to_string()))?;
        let date = parse_date("day date", self.date.as_deref())?;
        let activities = self
            .activities
            .into_iter()
            .map(RawActivity::validate)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DayPlan { day_index, date, activities })
    }
}

#[derive(Debug, Deserialize)]
struct RawActivity {
    #[serde(rename = "type")]
    kind: Option<String>,
    name: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    notes: Option<String>,
}

impl RawActivity {
    fn validate(self) -> Result<ActivityPlan, ValidationError> {
        let kind = self
            .kind
            .as_deref()
            .unwrap_or("poi")
            .parse::<ItemKind>()
            .map_err(|error| ValidationError(error.to_string()))?;
        let name = self
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ValidationError("every activity needs a name".to_string()))?;
        Ok(ActivityPlan {
            kind,
            name,
            // Unparseable times are dropped rather than failing the whole
            // itinerary; the plan is still usable without them.
            start_time: parse_time(self.start_time),
            end_time: parse_time(self.end_time),
            notes: self.notes.filter(|notes| !notes.trim().is_empty()),
        })
    }
}

/// Function-calling schema advertised to the model. One declared function
/// multiplexes the three travel actions.
pub fn tool_schema() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": TOOL_NAME,
            "description": "Execute travel planning actions like searching POIs, hotels, or finalizing itinerary",
            "parameters": {
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["search_pois", "search_hotels", "finalize_itinerary"],
                        "description": "The action to execute"
                    },
                    "city": {
                        "type": "string",
                        "description": "City name"
                    },
                    "country": {
                        "type": "string",
                        "description": "Country name (optional)"
                    },
                    "categories": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "POI categories for search_pois action"
                    },
                    "budget_tier": {
                        "type": "string",
                        "enum": ["budget", "mid", "premium"],
                        "description": "Budget tier for hotels or itinerary"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of results to return"
                    },
                    "start_date": {
                        "type": "string",
                        "description": "Start date in YYYY-MM-DD format for finalize_itinerary"
                    },
                    "end_date": {
                        "type": "string",
                        "description": "End date in YYYY-MM-DD format for finalize_itinerary"
                    },
                    "days": {
                        "type": "array",
                        "description": "Array of day objects for finalize_itinerary",
                        "items": {
                            "type": "object",
                            "properties": {
                                "day_index": {"type": "integer"},
                                "date": {"type": "string"},
                                "activities": {
                                    "type": "array",
                                    "items": {
                                        "type": "object",
                                        "properties": {
                                            "type": {
                                                "type": "string",
                                                "enum": ["poi", "hotel", "meal", "transit"]
                                            },
                                            "name": {"type": "string"},
                                            "external_id": {"type": "string"},
                                            "start_time": {"type": "string"},
                                            "end_time": {"type": "string"},
                                            "notes": {"type": "string"}
                                        },
                                        "required": ["type", "name"]
                                    }
                                }
                            },
                            "required": ["day_index", "date", "activities"]
                        }
                    }
                },
                "required": ["action", "city"],
                "additionalProperties": false
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use wayfarer_core::domain::travel::BudgetTier;

    use super::{tool_schema, TravelAction, TOOL_NAME};

    #[test]
    fn poi_search_applies_defaults() {
        let action =
            TravelAction::parse(TOOL_NAME, r#"{"action":"search_pois","city":"Athens"}"#)
                .expect("valid");
        let TravelAction::SearchPois(args) = action else {
            panic!("expected poi search");
        };
        assert_eq!(args.city, "Athens");
        assert_eq!(args.limit, 20);
        assert!(args.categories.is_empty());
    }

    #[test]
    fn hotel_search_defaults_to_mid_tier() {
        let action =
            TravelAction::parse(TOOL_NAME, r#"{"action":"search_hotels","city":"Paris"}"#)
                .expect("valid");
        let TravelAction::SearchHotels(args) = action else {
            panic!("expected hotel search");
        };
        assert_eq!(args.budget_tier, BudgetTier::Mid);
        assert_eq!(args.limit, 10);
    }

    #[test]
    fn missing_city_is_rejected() {
        let error = TravelAction::parse(TOOL_NAME, r#"{"action":"search_pois"}"#)
            .expect_err("city missing");
        assert!(error.0.contains("city"));
    }

    #[test]
    fn unknown_tool_is_rejected() {
        assert!(TravelAction::parse("delete_everything", "{}").is_err());
    }

    #[test]
    fn unknown_action_is_rejected() {
        let error =
            TravelAction::parse(TOOL_NAME, r#"{"action":"book_flight","city":"Rome"}"#)
                .expect_err("unknown action");
        assert!(error.0.contains("book_flight"));
    }

    #[test]
    fn out_of_range_limit_is_rejected() {
        assert!(TravelAction::parse(
            TOOL_NAME,
            r#"{"action":"search_pois","city":"Athens","limit":500}"#
        )
        .is_err());
        assert!(TravelAction::parse(
            TOOL_NAME,
            r#"{"action":"search_pois","city":"Athens","limit":0}"#
        )
        .is_err());
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let error = TravelAction::parse(
            TOOL_NAME,
            r#"{"action":"finalize_itinerary","city":"Rome","start_date":"2025-06-10",
               "end_date":"2025-06-08","budget_tier":"mid",
               "days":[{"day_index":0,"date":"2025-06-10","activities":[]}]}"#,
        )
        .expect_err("inverted range");
        assert!(error.0.contains("inverted"));
    }

    #[test]
    fn finalize_parses_days_and_activities() {
        let action = TravelAction::parse(
            TOOL_NAME,
            r#"{"action":"finalize_itinerary","city":"Athens","country":"Greece",
               "start_date":"2025-06-10","end_date":"2025-06-11","budget_tier":"budget",
               "days":[{"day_index":0,"date":"2025-06-10","activities":[
                   {"type":"poi","name":"Acropolis","start_time":"09:00","notes":"buy tickets ahead"},
                   {"type":"meal","name":"Lunch in Plaka","start_time":"not a time"}
               ]}]}"#,
        )
        .expect("valid");
        let TravelAction::FinalizeItinerary(args) = action else {
            panic!("expected finalize");
        };
        assert_eq!(args.days.len(), 1);
        assert_eq!(args.days[0].date, NaiveDate::from_ymd_opt(2025, 6, 10).expect("date"));
        let activities = &args.days[0].activities;
        assert_eq!(activities[0].start_time.map(|t| t.to_string()), Some("09:00:00".to_string()));
        assert!(activities[1].start_time.is_none());
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        assert!(TravelAction::parse(TOOL_NAME, "not json at all").is_err());
    }

    #[test]
    fn schema_declares_the_three_actions() {
        let schema = tool_schema();
        let actions = &schema["function"]["parameters"]["properties"]["action"]["enum"];
        assert_eq!(actions.as_array().map(Vec::len), Some(3));
    }
}
