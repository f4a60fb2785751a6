use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use wayfarer_core::domain::chat::{ItineraryId, SessionId};
use wayfarer_core::domain::itinerary::{Itinerary, ItineraryDay, ItineraryItem};
use wayfarer_core::errors::ProviderError;
use wayfarer_db::repositories::{CacheEntry, CacheRepository, ItineraryRepository};
use wayfarer_providers::hotels::HotelProvider;
use wayfarer_providers::poi::PoiProvider;
use wayfarer_providers::query::{cache_key, CacheCounters, HotelQuery, PoiQuery};

use crate::schema::{FinalizeArgs, HotelSearchArgs, PoiSearchArgs, ToolInvocation, TravelAction};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolStatus {
    Success,
    ProviderError,
    ValidationError,
}

/// Outcome of one tool invocation, serialized back to the model as JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolResult {
    pub invocation_id: String,
    pub action: String,
    pub status: ToolStatus,
    pub payload: Value,
}

impl ToolResult {
    fn success(invocation_id: &str, action: &str, payload: Value) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            action: action.to_string(),
            status: ToolStatus::Success,
            payload,
        }
    }

    fn provider_error(invocation_id: &str, action: &str, error: &ProviderError) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            action: action.to_string(),
            status: ToolStatus::ProviderError,
            payload: json!({ "error": error.to_string(), "kind": error.kind.as_str() }),
        }
    }

    fn validation_error(invocation_id: &str, action: &str, detail: String) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            action: action.to_string(),
            status: ToolStatus::ValidationError,
            payload: json!({ "error": detail }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// A search that succeeded but found nothing. The orchestrator uses this
    /// to steer the model toward its own knowledge.
    pub fn is_empty_search(&self) -> bool {
        self.is_success()
            && matches!(self.action.as_str(), "search_pois" | "search_hotels")
            && self.payload.get("count").and_then(Value::as_u64) == Some(0)
    }

    pub fn itinerary_id(&self) -> Option<ItineraryId> {
        if !self.is_success() || self.action != "finalize_itinerary" {
            return None;
        }
        self.payload
            .get("itinerary_id")
            .and_then(Value::as_str)
            .map(|id| ItineraryId(id.to_string()))
    }
}

/// Routes validated tool invocations to provider adapters, consulting the
/// shared response cache before any adapter call.
pub struct ToolDispatcher {
    pois: Arc<dyn PoiProvider>,
    hotels: Arc<dyn HotelProvider>,
    itineraries: Arc<dyn ItineraryRepository>,
    cache: Arc<dyn CacheRepository>,
    counters: Arc<CacheCounters>,
    cache_ttl: Duration,
}

impl ToolDispatcher {
    pub fn new(
        pois: Arc<dyn PoiProvider>,
        hotels: Arc<dyn HotelProvider>,
        itineraries: Arc<dyn ItineraryRepository>,
        cache: Arc<dyn CacheRepository>,
        counters: Arc<CacheCounters>,
        cache_ttl: Duration,
    ) -> Self {
        Self { pois, hotels, itineraries, cache, counters, cache_ttl }
    }

    pub fn cache_counters(&self) -> &Arc<CacheCounters> {
        &self.counters
    }

    pub async fn dispatch(
        &self,
        invocation: &ToolInvocation,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> ToolResult {
        let action = match TravelAction::parse(&invocation.tool_name, &invocation.arguments) {
            Ok(action) => action,
            Err(error) => {
                info!(tool = %invocation.tool_name, %error, "rejected tool invocation");
                return ToolResult::validation_error(
                    &invocation.invocation_id,
                    "unknown",
                    error.to_string(),
                );
            }
        };

        match action {
            TravelAction::SearchPois(args) => {
                self.search_pois(&invocation.invocation_id, args, now).await
            }
            TravelAction::SearchHotels(args) => {
                self.search_hotels(&invocation.invocation_id, args, now).await
            }
            TravelAction::FinalizeItinerary(args) => {
                self.finalize_itinerary(&invocation.invocation_id, args, session_id, now).await
            }
        }
    }

    async fn search_pois(
        &self,
        invocation_id: &str,
        args: PoiSearchArgs,
        now: DateTime<Utc>,
    ) -> ToolResult {
        let query =
            PoiQuery::new(&args.city, args.country.as_deref(), args.categories.clone(), args.limit);
        let key = cache_key(self.pois.name(), "search", &query.params());

        if let Some(payload) = self.cache_lookup(&key, now).await {
            return ToolResult::success(invocation_id, "search_pois", payload);
        }

        match self.pois.search(&query, now).await {
            Ok(places) => {
                let count = places.len();
                let payload = json!({
                    "city": args.city,
                    "country": args.country,
                    "categories": args.categories,
                    "pois": places,
                    "count": count,
                    "use_llm_knowledge": count == 0,
                });
                self.cache_store(key, self.pois.name(), payload.clone(), now).await;
                ToolResult::success(invocation_id, "search_pois", payload)
            }
            Err(error) => ToolResult::provider_error(invocation_id, "search_pois", &error),
        }
    }

    async fn search_hotels(
        &self,
        invocation_id: &str,
        args: HotelSearchArgs,
        now: DateTime<Utc>,
    ) -> ToolResult {
        let query =
            HotelQuery::new(&args.city, args.country.as_deref(), args.budget_tier, args.limit);
        let key = cache_key(self.hotels.name(), "search", &query.params());

        if let Some(payload) = self.cache_lookup(&key, now).await {
            return ToolResult::success(invocation_id, "search_hotels", payload);
        }

        match self.hotels.search(&query, now).await {
            Ok(hotels) => {
                let count = hotels.len();
                let payload = json!({
                    "city": args.city,
                    "budget_tier": args.budget_tier.as_str(),
                    "hotels": hotels,
                    "count": count,
                });
                self.cache_store(key, self.hotels.name(), payload.clone(), now).await;
                ToolResult::success(invocation_id, "search_hotels", payload)
            }
            Err(error) => ToolResult::provider_error(invocation_id, "search_hotels", &error),
        }
    }

    async fn finalize_itinerary(
        &self,
        invocation_id: &str,
        args: FinalizeArgs,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> ToolResult {
        let days_count = args.days.len();
        let itinerary = Itinerary {
            id: ItineraryId(Uuid::new_v4().to_string()),
            session_id: session_id.clone(),
            city: args.city.clone(),
            country: args.country,
            start_date: args.date_range.start(),
            end_date: args.date_range.end(),
            budget_tier: args.budget_tier,
            days: args
                .days
                .into_iter()
                .map(|day| ItineraryDay {
                    day_index: day.day_index,
                    date: day.date,
                    items: day
                        .activities
                        .into_iter()
                        .map(|activity| ItineraryItem {
                            kind: activity.kind,
                            name: activity.name,
                            start_time: activity.start_time,
                            end_time: activity.end_time,
                            notes: activity.notes,
                        })
                        .collect(),
                })
                .collect(),
            created_at: now,
        };
        let id = itinerary.id.clone();

        match self.itineraries.save(itinerary).await {
            Ok(()) => {
                info!(itinerary_id = %id.0, city = %args.city, days = days_count, "itinerary finalized");
                ToolResult::success(
                    invocation_id,
                    "finalize_itinerary",
                    json!({
                        "itinerary_id": id.0,
                        "city": args.city,
                        "days_count": days_count,
                    }),
                )
            }
            Err(error) => {
                warn!(%error, "failed to persist itinerary");
                let error = ProviderError::unavailable("itinerary_store", error.to_string());
                ToolResult::provider_error(invocation_id, "finalize_itinerary", &error)
            }
        }
    }

    async fn cache_lookup(&self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        match self.cache.get(key, now).await {
            Ok(Some(entry)) => {
                self.counters.record_hit();
                Some(entry.payload)
            }
            Ok(None) => {
                self.counters.record_miss();
                None
            }
            Err(error) => {
                // Cache outage degrades to a miss, never to a failed call.
                warn!(%error, "cache lookup failed, treating as miss");
                self.counters.record_miss();
                None
            }
        }
    }

    async fn cache_store(&self, key: String, provider: &str, payload: Value, now: DateTime<Utc>) {
        let entry = CacheEntry {
            cache_key: key,
            provider: provider.to_string(),
            payload,
            created_at: now,
            expires_at: now + self.cache_ttl,
        };
        if let Err(error) = self.cache.put(entry).await {
            warn!(%error, "failed to store cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};

    use wayfarer_core::domain::chat::SessionId;
    use wayfarer_core::domain::travel::PlaceRecord;
    use wayfarer_core::errors::ProviderError;
    use wayfarer_db::repositories::{
        InMemoryCacheRepository, InMemoryCatalogRepository, InMemoryItineraryRepository,
        ItineraryRepository,
    };
    use wayfarer_db::seed_stub_hotels;
    use wayfarer_providers::hotels::StaticStubHotelProvider;
    use wayfarer_providers::poi::PoiProvider;
    use wayfarer_providers::query::{CacheCounters, PoiQuery};

    use crate::schema::{ToolInvocation, TOOL_NAME};

    use super::{ToolDispatcher, ToolStatus};

    struct CountingPoiProvider {
        calls: AtomicU32,
        places: Vec<PlaceRecord>,
        fail: bool,
    }

    impl CountingPoiProvider {
        fn empty() -> Self {
            Self { calls: AtomicU32::new(0), places: Vec::new(), fail: false }
        }

        fn with_places(places: Vec<PlaceRecord>) -> Self {
            Self { calls: AtomicU32::new(0), places, fail: false }
        }

        fn failing() -> Self {
            Self { calls: AtomicU32::new(0), places: Vec::new(), fail: true }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PoiProvider for CountingPoiProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn search(
            &self,
            _query: &PoiQuery,
            _now: DateTime<Utc>,
        ) -> Result<Vec<PlaceRecord>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::unavailable("counting", "timeout"));
            }
            Ok(self.places.clone())
        }
    }

    fn place(external_id: &str, name: &str) -> PlaceRecord {
        PlaceRecord {
            external_id: external_id.to_string(),
            name: name.to_string(),
            lat: 37.97,
            lon: 23.72,
            categories: vec!["museums".to_string()],
            rating: Some(7.0),
            address: None,
            city: Some("Athens".to_string()),
            country: Some("Greece".to_string()),
        }
    }

    async fn dispatcher_with(
        pois: Arc<CountingPoiProvider>,
    ) -> (ToolDispatcher, Arc<InMemoryItineraryRepository>) {
        let catalog = Arc::new(InMemoryCatalogRepository::default());
        seed_stub_hotels(catalog.as_ref(), Utc::now()).await.expect("seed");
        let itineraries = Arc::new(InMemoryItineraryRepository::default());
        let dispatcher = ToolDispatcher::new(
            pois,
            Arc::new(StaticStubHotelProvider::new(catalog)),
            itineraries.clone(),
            Arc::new(InMemoryCacheRepository::default()),
            Arc::new(CacheCounters::default()),
            Duration::hours(1),
        );
        (dispatcher, itineraries)
    }

    fn invocation(arguments: &str) -> ToolInvocation {
        ToolInvocation {
            invocation_id: "call_1".to_string(),
            tool_name: TOOL_NAME.to_string(),
            arguments: arguments.to_string(),
        }
    }

    fn session() -> SessionId {
        SessionId("sess-dispatch".to_string())
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_provider() {
        let pois = Arc::new(CountingPoiProvider::empty());
        let (dispatcher, _) = dispatcher_with(pois.clone()).await;

        let result = dispatcher
            .dispatch(&invocation(r#"{"action":"search_pois"}"#), &session(), Utc::now())
            .await;

        assert_eq!(result.status, ToolStatus::ValidationError);
        assert_eq!(pois.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_tool_name_is_a_validation_error() {
        let pois = Arc::new(CountingPoiProvider::empty());
        let (dispatcher, _) = dispatcher_with(pois.clone()).await;

        let bad = ToolInvocation {
            invocation_id: "call_9".to_string(),
            tool_name: "launch_rockets".to_string(),
            arguments: "{}".to_string(),
        };
        let result = dispatcher.dispatch(&bad, &session(), Utc::now()).await;

        assert_eq!(result.status, ToolStatus::ValidationError);
        assert_eq!(pois.calls(), 0);
    }

    #[tokio::test]
    async fn identical_searches_hit_the_provider_once() {
        let pois =
            Arc::new(CountingPoiProvider::with_places(vec![place("W1", "Acropolis Museum")]));
        let (dispatcher, _) = dispatcher_with(pois.clone()).await;
        let args = r#"{"action":"search_pois","city":"Athens","categories":["museums"]}"#;

        let first = dispatcher.dispatch(&invocation(args), &session(), Utc::now()).await;
        let second = dispatcher.dispatch(&invocation(args), &session(), Utc::now()).await;

        assert!(first.is_success());
        assert!(second.is_success());
        assert_eq!(first.payload, second.payload);
        assert_eq!(pois.calls(), 1);
        assert_eq!(dispatcher.cache_counters().hits(), 1);
        assert_eq!(dispatcher.cache_counters().misses(), 1);
    }

    #[tokio::test]
    async fn empty_poi_search_flags_llm_knowledge_fallback() {
        let pois = Arc::new(CountingPoiProvider::empty());
        let (dispatcher, _) = dispatcher_with(pois).await;

        let result = dispatcher
            .dispatch(
                &invocation(r#"{"action":"search_pois","city":"Athens"}"#),
                &session(),
                Utc::now(),
            )
            .await;

        assert!(result.is_success());
        assert!(result.is_empty_search());
        assert_eq!(result.payload["use_llm_knowledge"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn provider_failure_becomes_a_tool_level_error() {
        let pois = Arc::new(CountingPoiProvider::failing());
        let (dispatcher, _) = dispatcher_with(pois).await;

        let result = dispatcher
            .dispatch(
                &invocation(r#"{"action":"search_pois","city":"Athens"}"#),
                &session(),
                Utc::now(),
            )
            .await;

        assert_eq!(result.status, ToolStatus::ProviderError);
        assert_eq!(result.payload["kind"], serde_json::json!("unavailable"));
    }

    #[tokio::test]
    async fn hotel_search_uses_the_stub_catalog() {
        let pois = Arc::new(CountingPoiProvider::empty());
        let (dispatcher, _) = dispatcher_with(pois).await;

        let result = dispatcher
            .dispatch(
                &invocation(r#"{"action":"search_hotels","city":"Athens","budget_tier":"budget"}"#),
                &session(),
                Utc::now(),
            )
            .await;

        assert!(result.is_success());
        assert_eq!(result.payload["count"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn finalize_persists_and_reports_the_itinerary_id() {
        let pois = Arc::new(CountingPoiProvider::empty());
        let (dispatcher, itineraries) = dispatcher_with(pois).await;

        let result = dispatcher
            .dispatch(
                &invocation(
                    r#"{"action":"finalize_itinerary","city":"Athens","country":"Greece",
                       "start_date":"2025-06-10","end_date":"2025-06-11","budget_tier":"mid",
                       "days":[{"day_index":0,"date":"2025-06-10","activities":[
                           {"type":"poi","name":"Acropolis"}]}]}"#,
                ),
                &session(),
                Utc::now(),
            )
            .await;

        assert!(result.is_success());
        let id = result.itinerary_id().expect("itinerary id");
        let stored = itineraries.find_by_id(&id).await.expect("lookup").expect("stored");
        assert_eq!(stored.city, "Athens");
        assert_eq!(stored.days.len(), 1);
    }
}
