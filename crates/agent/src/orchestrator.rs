use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info};

use wayfarer_core::domain::chat::{
    ChatMessage, ChatRequest, ChatResponse, ItineraryId, MessageRole, SessionId, TurnStatus,
};
use wayfarer_core::spend::{estimate_call_cost, estimate_tokens};
use wayfarer_db::repositories::{ChatRepository, RepositoryError};

use crate::dispatch::{ToolDispatcher, ToolResult, ToolStatus};
use crate::llm::{CompletionRequest, LlmClient, LlmMessage, TokenUsage};
use crate::spend::SpendCapGuard;

/// Tool round-trips allowed within one turn before the loop forces a
/// best-effort completion.
const MAX_TOOL_ROUNDS: u32 = 4;
const HISTORY_LIMIT: u32 = 10;

const LLM_FAILURE_MESSAGE: &str =
    "I encountered an error processing your request. Please try again.";
const BEST_EFFORT_MESSAGE: &str = "I've gathered the available information for your trip. \
     Let me know if you'd like me to finalize the itinerary or adjust any part of the plan.";

const SYSTEM_PROMPT: &str = "You are a helpful travel assistant that creates personalized city trip itineraries.

Your capabilities:
- Search for points of interest (POIs) using search_pois action (this may return no results from APIs)
- Search for hotels using search_hotels action
- Create and save complete itineraries using finalize_itinerary action

CRITICAL: You have extensive knowledge of major destinations. When API tools return no POI results, DO NOT STOP - instead, use your own knowledge to create excellent itineraries with famous attractions!

Guidelines:
- Always be helpful and enthusiastic about travel planning
- Ask clarifying questions if destination, dates, or budget are unclear
- Try using tools first, but don't let API failures stop you from creating great itineraries
- ALWAYS create detailed day-by-day itineraries, whether you get API data or not
- Use your extensive knowledge of popular destinations when APIs fail
- Consider the budget tier when making recommendations (budget/mid/premium)
- Include a mix of must-see attractions, local experiences, and practical information
- Always finalize the itinerary at the end so the user can export it

Budget tiers:
- Budget: Focus on free activities, budget accommodations (under \u{20ac}80/night), local food
- Mid: Mix of paid attractions, mid-range hotels (\u{20ac}80-150/night), good restaurants
- Premium: High-end experiences, luxury hotels (\u{20ac}150+/night), fine dining

When creating itineraries:
1. Try search_pois to find attractions (but continue even if it returns no results)
2. Try search_hotels to find accommodations (but continue even if it returns no results)
3. Use your knowledge to create excellent recommendations with famous attractions and experiences
4. Organize into a logical day-by-day structure
5. Always use finalize_itinerary to save the complete plan

IMPORTANT: Never say you \"can't find POIs\" and then stop. Always proceed to create itineraries using your knowledge!

Keep responses engaging and informative. Focus on creating memorable travel experiences!";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Drives one conversation turn: cap check, LLM calls, tool dispatch, and
/// ledger/chat persistence. The sole caller of the spend guard and the
/// dispatcher.
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    guard: SpendCapGuard,
    dispatcher: ToolDispatcher,
    chat: Arc<dyn ChatRepository>,
    session_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        guard: SpendCapGuard,
        dispatcher: ToolDispatcher,
        chat: Arc<dyn ChatRepository>,
    ) -> Self {
        Self { llm, guard, dispatcher, chat, session_locks: Mutex::new(HashMap::new()) }
    }

    pub fn spend_guard(&self) -> &SpendCapGuard {
        &self.guard
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Handles one user message end to end. Turns for the same session run
    /// strictly sequentially; different sessions proceed concurrently.
    pub async fn handle_turn(
        &self,
        request: ChatRequest,
    ) -> Result<ChatResponse, OrchestratorError> {
        let session_lock = self.session_lock(&request.session_id);
        let _turn = session_lock.lock().await;

        let now = Utc::now();
        self.chat.ensure_session(&request.session_id, now).await?;

        let spend = self.guard.evaluate(now).await?;
        if spend.is_blocked() {
            info!(session_id = %request.session_id.0, "turn blocked by spend cap");
            let fallback = self.guard.fallback_message(&spend);
            self.persist_user_message(&request).await?;
            self.persist_assistant_message(&request.session_id, &fallback, TokenUsage::default())
                .await?;
            return Ok(ChatResponse {
                assistant_text: fallback,
                itinerary_id: None,
                status: TurnStatus::CapBlocked,
            });
        }

        // History is read before the current message is stored so the
        // message appears exactly once in the context.
        let history = self.chat.recent_messages(&request.session_id, HISTORY_LIMIT).await?;
        self.persist_user_message(&request).await?;

        let mut messages = build_context(&request, &history);
        let mut use_tools = true;
        let mut tool_rounds = 0u32;
        let mut itinerary_id: Option<ItineraryId> = None;
        let mut turn_usage = TokenUsage::default();

        let final_text = loop {
            let completion = CompletionRequest { messages: messages.clone(), use_tools };
            let response = match self.llm.complete(completion).await {
                Ok(response) => response,
                Err(llm_error) => {
                    error!(%llm_error, session_id = %request.session_id.0, "llm call failed");
                    // A malformed response can still carry billed token counts.
                    if let Some(partial) = llm_error.usage() {
                        self.guard
                            .record(
                                Some(request.session_id.clone()),
                                self.llm.model(),
                                partial,
                                Utc::now(),
                            )
                            .await?;
                    }
                    self.persist_assistant_message(
                        &request.session_id,
                        LLM_FAILURE_MESSAGE,
                        TokenUsage::default(),
                    )
                    .await?;
                    return Ok(ChatResponse {
                        assistant_text: LLM_FAILURE_MESSAGE.to_string(),
                        itinerary_id,
                        status: TurnStatus::LlmUnavailable,
                    });
                }
            };

            turn_usage.prompt_tokens += response.usage.prompt_tokens;
            turn_usage.completion_tokens += response.usage.completion_tokens;
            self.guard
                .record(
                    Some(request.session_id.clone()),
                    self.llm.model(),
                    response.usage,
                    Utc::now(),
                )
                .await?;

            if response.tool_calls.is_empty() {
                break response.content;
            }
            if tool_rounds >= MAX_TOOL_ROUNDS {
                info!(
                    session_id = %request.session_id.0,
                    rounds = tool_rounds,
                    "tool round budget exhausted, completing with best-effort message"
                );
                break BEST_EFFORT_MESSAGE.to_string();
            }
            tool_rounds += 1;

            let mut results = Vec::with_capacity(response.tool_calls.len());
            for invocation in &response.tool_calls {
                results.push(self.dispatcher.dispatch(invocation, &request.session_id, now).await);
            }
            if itinerary_id.is_none() {
                itinerary_id = results.iter().find_map(ToolResult::itinerary_id);
            }

            let empty_search = results.iter().any(ToolResult::is_empty_search);
            messages.push(LlmMessage::new(
                MessageRole::System,
                format!("Tool results: {}", summarize_for_llm(&results)),
            ));
            // When every lead came back empty and nothing was finalized, the
            // next call is made without tools so the model answers from its
            // own knowledge instead of re-searching.
            if empty_search && itinerary_id.is_none() {
                use_tools = false;
            }
        };

        self.persist_assistant_message(&request.session_id, &final_text, turn_usage).await?;

        Ok(ChatResponse {
            assistant_text: final_text,
            itinerary_id,
            status: TurnStatus::Completed,
        })
    }

    fn session_lock(&self, session_id: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.session_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(session_id.0.clone()).or_default().clone()
    }

    async fn persist_user_message(&self, request: &ChatRequest) -> Result<(), RepositoryError> {
        self.chat
            .append_message(ChatMessage {
                session_id: request.session_id.clone(),
                role: MessageRole::User,
                content: request.message.clone(),
                tokens_in: Some(estimate_tokens(&request.message)),
                tokens_out: None,
                cost_usd: None,
                created_at: Utc::now(),
            })
            .await
    }

    async fn persist_assistant_message(
        &self,
        session_id: &SessionId,
        content: &str,
        usage: TokenUsage,
    ) -> Result<(), RepositoryError> {
        let has_usage = usage.prompt_tokens > 0 || usage.completion_tokens > 0;
        self.chat
            .append_message(ChatMessage {
                session_id: session_id.clone(),
                role: MessageRole::Assistant,
                content: content.to_string(),
                tokens_in: has_usage.then_some(usage.prompt_tokens),
                tokens_out: if has_usage {
                    Some(usage.completion_tokens)
                } else {
                    Some(estimate_tokens(content))
                },
                cost_usd: has_usage.then(|| {
                    estimate_call_cost(
                        self.llm.model(),
                        usage.prompt_tokens,
                        usage.completion_tokens,
                    )
                }),
                created_at: Utc::now(),
            })
            .await
    }
}

fn build_context(request: &ChatRequest, history: &[ChatMessage]) -> Vec<LlmMessage> {
    let mut messages = vec![LlmMessage::new(MessageRole::System, SYSTEM_PROMPT)];

    let mut context_parts = Vec::new();
    if let Some(destination) = &request.destination {
        match &request.country {
            Some(country) => context_parts.push(format!("Destination: {destination}, {country}")),
            None => context_parts.push(format!("Destination: {destination}")),
        }
    }
    if let Some(range) = &request.date_range {
        context_parts.push(format!("Travel dates: {} to {}", range.start(), range.end()));
    }
    if let Some(tier) = request.budget_tier {
        context_parts.push(format!("Budget tier: {}", tier.as_str()));
    }
    if !context_parts.is_empty() {
        messages.push(LlmMessage::new(
            MessageRole::System,
            format!("Travel planning context:\n{}", context_parts.join("\n")),
        ));
    }

    for message in history {
        if matches!(message.role, MessageRole::User | MessageRole::Assistant) {
            messages.push(LlmMessage::new(message.role, message.content.clone()));
        }
    }
    messages.push(LlmMessage::new(MessageRole::User, request.message.clone()));

    messages
}

/// Condenses tool outcomes into the continuation context for the model.
fn summarize_for_llm(results: &[ToolResult]) -> String {
    let mut parts = Vec::with_capacity(results.len());
    for result in results {
        match result.status {
            ToolStatus::Success => parts.push(summarize_success(result)),
            ToolStatus::ProviderError | ToolStatus::ValidationError => {
                let detail = result
                    .payload
                    .get("error")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unknown error");
                parts.push(format!("{} failed: {detail}", result.action));
            }
        }
    }
    if parts.is_empty() {
        return "Tool execution completed. Ready to proceed with itinerary creation.".to_string();
    }
    parts.push("I'm ready to create a detailed itinerary.".to_string());
    parts.join(" ")
}

fn summarize_success(result: &ToolResult) -> String {
    let payload = &result.payload;
    let city = payload.get("city").and_then(serde_json::Value::as_str).unwrap_or("the city");
    let count = payload.get("count").and_then(serde_json::Value::as_u64).unwrap_or(0);
    match result.action.as_str() {
        "search_pois" => {
            if count == 0 {
                format!(
                    "POI search for {city} returned no results from external APIs, \
                     but I have extensive knowledge of {city}'s attractions."
                )
            } else {
                format!("Found {count} POIs in {city} from external data.")
            }
        }
        "search_hotels" => {
            let tier = payload
                .get("budget_tier")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("mid");
            if count == 0 {
                format!(
                    "Hotel search for {city} returned no results, \
                     but I can recommend excellent {tier}-tier accommodations."
                )
            } else {
                format!("Found {count} {tier}-tier hotels in {city}.")
            }
        }
        "finalize_itinerary" => {
            let days = payload.get("days_count").and_then(serde_json::Value::as_u64).unwrap_or(0);
            format!("Saved a {days}-day itinerary for {city}.")
        }
        other => format!("{other} completed."),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;

    use wayfarer_core::domain::chat::{ChatRequest, MessageRole, SessionId, TurnStatus};
    use wayfarer_core::domain::travel::PlaceRecord;
    use wayfarer_core::errors::ProviderError;
    use wayfarer_db::repositories::{
        ChatRepository, InMemoryCacheRepository, InMemoryCatalogRepository, InMemoryChatRepository,
        InMemoryItineraryRepository, InMemoryLedgerRepository, LedgerRepository,
    };
    use wayfarer_db::seed_stub_hotels;
    use wayfarer_providers::hotels::StaticStubHotelProvider;
    use wayfarer_providers::poi::PoiProvider;
    use wayfarer_providers::query::{CacheCounters, PoiQuery};

    use crate::dispatch::ToolDispatcher;
    use crate::llm::{
        CompletionRequest, CompletionResponse, LlmClient, LlmError, TokenUsage,
    };
    use crate::schema::{ToolInvocation, TOOL_NAME};
    use crate::spend::SpendCapGuard;

    use super::{Orchestrator, BEST_EFFORT_MESSAGE, LLM_FAILURE_MESSAGE};

    struct ScriptedLlm {
        responses: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<Result<CompletionResponse, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        fn model(&self) -> &str {
            "gpt-4"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.requests.lock().expect("lock").push(request);
            self.responses
                .lock()
                .expect("lock")
                .pop_front()
                .expect("script exhausted: unexpected llm call")
        }
    }

    fn text_response(content: &str) -> Result<CompletionResponse, LlmError> {
        Ok(CompletionResponse {
            content: content.to_string(),
            tool_calls: Vec::new(),
            usage: TokenUsage { prompt_tokens: 100, completion_tokens: 20 },
        })
    }

    fn tool_response(arguments: &str) -> Result<CompletionResponse, LlmError> {
        Ok(CompletionResponse {
            content: String::new(),
            tool_calls: vec![ToolInvocation {
                invocation_id: "call_1".to_string(),
                tool_name: TOOL_NAME.to_string(),
                arguments: arguments.to_string(),
            }],
            usage: TokenUsage { prompt_tokens: 200, completion_tokens: 40 },
        })
    }

    struct FakePoiProvider {
        calls: AtomicU32,
        places: Vec<PlaceRecord>,
        fail: bool,
    }

    #[async_trait]
    impl PoiProvider for FakePoiProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn search(
            &self,
            _query: &PoiQuery,
            _now: DateTime<Utc>,
        ) -> Result<Vec<PlaceRecord>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::unavailable("fake", "timed out"));
            }
            Ok(self.places.clone())
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        llm: Arc<ScriptedLlm>,
        ledger: Arc<InMemoryLedgerRepository>,
        chat: Arc<InMemoryChatRepository>,
        itineraries: Arc<InMemoryItineraryRepository>,
    }

    async fn harness(
        responses: Vec<Result<CompletionResponse, LlmError>>,
        pois: FakePoiProvider,
        cap_cents: i64,
    ) -> Harness {
        let llm = ScriptedLlm::new(responses);
        let ledger = Arc::new(InMemoryLedgerRepository::default());
        let chat = Arc::new(InMemoryChatRepository::default());
        let itineraries = Arc::new(InMemoryItineraryRepository::default());
        let catalog = Arc::new(InMemoryCatalogRepository::default());
        seed_stub_hotels(catalog.as_ref(), Utc::now()).await.expect("seed");

        let dispatcher = ToolDispatcher::new(
            Arc::new(pois),
            Arc::new(StaticStubHotelProvider::new(catalog)),
            itineraries.clone(),
            Arc::new(InMemoryCacheRepository::default()),
            Arc::new(CacheCounters::default()),
            Duration::hours(1),
        );
        let guard = SpendCapGuard::new(ledger.clone(), Decimal::new(cap_cents, 2));
        let orchestrator = Orchestrator::new(llm.clone(), guard, dispatcher, chat.clone());

        Harness { orchestrator, llm, ledger, chat, itineraries }
    }

    fn poi_fake(places: Vec<PlaceRecord>) -> FakePoiProvider {
        FakePoiProvider { calls: AtomicU32::new(0), places, fail: false }
    }

    fn failing_poi_fake() -> FakePoiProvider {
        FakePoiProvider { calls: AtomicU32::new(0), places: Vec::new(), fail: true }
    }

    fn place() -> PlaceRecord {
        PlaceRecord {
            external_id: "W1".to_string(),
            name: "Acropolis Museum".to_string(),
            lat: 37.9684,
            lon: 23.7285,
            categories: vec!["museums".to_string()],
            rating: Some(7.0),
            address: None,
            city: Some("Athens".to_string()),
            country: Some("Greece".to_string()),
        }
    }

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            session_id: SessionId("sess-orc".to_string()),
            message: message.to_string(),
            destination: Some("Athens".to_string()),
            country: Some("Greece".to_string()),
            date_range: None,
            budget_tier: None,
        }
    }

    const POI_CALL: &str = r#"{"action":"search_pois","city":"Athens","categories":["museums"]}"#;

    #[tokio::test]
    async fn plain_reply_completes_and_records_usage() {
        let h = harness(vec![text_response("Happy to help!")], poi_fake(vec![]), 1000).await;

        let response = h.orchestrator.handle_turn(request("hi")).await.expect("turn");

        assert_eq!(response.status, TurnStatus::Completed);
        assert_eq!(response.assistant_text, "Happy to help!");
        let records = h.ledger.recent(10).await.expect("recent");
        assert_eq!(records.len(), 1);
        let messages = h
            .chat
            .recent_messages(&SessionId("sess-orc".to_string()), 10)
            .await
            .expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn blocked_cap_short_circuits_without_llm_call() {
        let h = harness(Vec::new(), poi_fake(vec![]), 100).await;
        // Pre-spend past the 1.00 cap.
        h.orchestrator
            .spend_guard()
            .record(None, "gpt-4", TokenUsage { prompt_tokens: 40_000, completion_tokens: 0 }, Utc::now())
            .await
            .expect("seed spend");

        let response = h.orchestrator.handle_turn(request("plan my trip")).await.expect("turn");

        assert_eq!(response.status, TurnStatus::CapBlocked);
        assert!(response.assistant_text.contains("monthly budget limit"));
        assert!(h.llm.requests().is_empty());
        // User message and fallback are still part of the transcript.
        let messages = h
            .chat
            .recent_messages(&SessionId("sess-orc".to_string()), 10)
            .await
            .expect("messages");
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn tool_round_feeds_results_back_to_the_model() {
        let h = harness(
            vec![tool_response(POI_CALL), text_response("Here is your plan.")],
            poi_fake(vec![place()]),
            1000,
        )
        .await;

        let response = h.orchestrator.handle_turn(request("plan athens")).await.expect("turn");

        assert_eq!(response.status, TurnStatus::Completed);
        assert_eq!(response.assistant_text, "Here is your plan.");
        // One usage record per LLM round-trip.
        assert_eq!(h.ledger.recent(10).await.expect("recent").len(), 2);

        let requests = h.llm.requests();
        assert_eq!(requests.len(), 2);
        let follow_up = &requests[1];
        assert!(follow_up.use_tools);
        let tool_message = follow_up
            .messages
            .iter()
            .find(|message| message.content.starts_with("Tool results:"))
            .expect("tool results fed back");
        assert!(tool_message.content.contains("Found 1 POIs in Athens"));
    }

    #[tokio::test]
    async fn empty_searches_force_a_no_tools_follow_up() {
        let h = harness(
            vec![tool_response(POI_CALL), text_response("From my own knowledge...")],
            poi_fake(vec![]),
            1000,
        )
        .await;

        let response = h.orchestrator.handle_turn(request("plan athens")).await.expect("turn");

        assert_eq!(response.status, TurnStatus::Completed);
        let requests = h.llm.requests();
        assert_eq!(requests.len(), 2);
        assert!(!requests[1].use_tools);
        assert!(requests[1]
            .messages
            .iter()
            .any(|message| message.content.contains("returned no results")));
    }

    #[tokio::test]
    async fn iteration_cap_forces_a_best_effort_completion() {
        // The model keeps asking for tools; after four dispatched rounds the
        // fifth tool request is not honored.
        let h = harness(
            vec![
                tool_response(POI_CALL),
                tool_response(POI_CALL),
                tool_response(POI_CALL),
                tool_response(POI_CALL),
                tool_response(POI_CALL),
            ],
            poi_fake(vec![place()]),
            10_000,
        )
        .await;

        let response = h.orchestrator.handle_turn(request("plan athens")).await.expect("turn");

        assert_eq!(response.status, TurnStatus::Completed);
        assert_eq!(response.assistant_text, BEST_EFFORT_MESSAGE);
        assert_eq!(h.llm.requests().len(), 5);
        // Every round-trip is ledgered, including the final unhonored one.
        assert_eq!(h.ledger.recent(10).await.expect("recent").len(), 5);
    }

    #[tokio::test]
    async fn llm_failure_yields_an_apology_turn() {
        let h = harness(
            vec![Err(LlmError::Transport("connection reset".to_string()))],
            poi_fake(vec![]),
            1000,
        )
        .await;

        let response = h.orchestrator.handle_turn(request("hello")).await.expect("turn");

        assert_eq!(response.status, TurnStatus::LlmUnavailable);
        assert_eq!(response.assistant_text, LLM_FAILURE_MESSAGE);
        let messages = h
            .chat
            .recent_messages(&SessionId("sess-orc".to_string()), 10)
            .await
            .expect("messages");
        assert_eq!(messages[1].content, LLM_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn malformed_response_still_ledgers_reported_usage() {
        // The provider billed the prompt even though the response was unusable.
        let h = harness(
            vec![Err(LlmError::Malformed {
                detail: "response carried no choices".to_string(),
                usage: Some(TokenUsage { prompt_tokens: 90, completion_tokens: 0 }),
            })],
            poi_fake(vec![]),
            1000,
        )
        .await;

        let response = h.orchestrator.handle_turn(request("hello")).await.expect("turn");

        assert_eq!(response.status, TurnStatus::LlmUnavailable);
        let records = h.ledger.recent(10).await.expect("recent");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].prompt_tokens, 90);
        assert_eq!(records[0].completion_tokens, 0);
    }

    #[tokio::test]
    async fn provider_failure_is_surfaced_to_the_model_not_the_user() {
        let h = harness(
            vec![tool_response(POI_CALL), text_response("Plan built without live data.")],
            failing_poi_fake(),
            1000,
        )
        .await;

        let response = h.orchestrator.handle_turn(request("plan athens")).await.expect("turn");

        assert_eq!(response.status, TurnStatus::Completed);
        let requests = h.llm.requests();
        assert!(requests[1]
            .messages
            .iter()
            .any(|message| message.content.contains("search_pois failed")));
    }

    #[tokio::test]
    async fn finalize_reports_the_itinerary_id() {
        let finalize_args = r#"{"action":"finalize_itinerary","city":"Athens",
            "start_date":"2025-06-10","end_date":"2025-06-11","budget_tier":"mid",
            "days":[{"day_index":0,"date":"2025-06-10","activities":[
                {"type":"poi","name":"Acropolis"}]}]}"#;
        let h = harness(
            vec![tool_response(finalize_args), text_response("Itinerary saved!")],
            poi_fake(vec![]),
            1000,
        )
        .await;

        let response = h.orchestrator.handle_turn(request("finalize it")).await.expect("turn");

        assert_eq!(response.status, TurnStatus::Completed);
        let id = response.itinerary_id.expect("itinerary id");
        use wayfarer_db::repositories::ItineraryRepository;
        let stored = h.itineraries.find_by_id(&id).await.expect("lookup").expect("stored");
        assert_eq!(stored.city, "Athens");
    }

    /// Blocks inside `complete` until the test hands out a permit, so the
    /// tests below can observe which turns have reached the LLM.
    struct GatedLlm {
        gate: tokio::sync::Semaphore,
        entered: AtomicU32,
    }

    impl GatedLlm {
        fn new() -> Arc<Self> {
            Arc::new(Self { gate: tokio::sync::Semaphore::new(0), entered: AtomicU32::new(0) })
        }
    }

    #[async_trait]
    impl LlmClient for GatedLlm {
        fn model(&self) -> &str {
            "gpt-4"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.entered.fetch_add(1, Ordering::SeqCst);
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| LlmError::Transport("gate closed".to_string()))?;
            permit.forget();
            Ok(CompletionResponse {
                content: "done".to_string(),
                tool_calls: Vec::new(),
                usage: TokenUsage { prompt_tokens: 10, completion_tokens: 2 },
            })
        }
    }

    async fn gated_harness(
        llm: Arc<GatedLlm>,
    ) -> (Arc<Orchestrator>, Arc<InMemoryChatRepository>) {
        let ledger = Arc::new(InMemoryLedgerRepository::default());
        let chat = Arc::new(InMemoryChatRepository::default());
        let itineraries = Arc::new(InMemoryItineraryRepository::default());
        let catalog = Arc::new(InMemoryCatalogRepository::default());
        seed_stub_hotels(catalog.as_ref(), Utc::now()).await.expect("seed");

        let dispatcher = ToolDispatcher::new(
            Arc::new(poi_fake(vec![])),
            Arc::new(StaticStubHotelProvider::new(catalog)),
            itineraries,
            Arc::new(InMemoryCacheRepository::default()),
            Arc::new(CacheCounters::default()),
            Duration::hours(1),
        );
        let guard = SpendCapGuard::new(ledger, Decimal::new(1000, 2));
        let orchestrator = Arc::new(Orchestrator::new(llm, guard, dispatcher, chat.clone()));
        (orchestrator, chat)
    }

    fn request_for(session: &str, message: &str) -> ChatRequest {
        ChatRequest { session_id: SessionId(session.to_string()), ..request(message) }
    }

    #[tokio::test(start_paused = true)]
    async fn turns_for_one_session_run_strictly_in_order() {
        let llm = GatedLlm::new();
        let (orchestrator, chat) = gated_harness(llm.clone()).await;

        let first = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.handle_turn(request_for("sess-a", "first")).await }
        });
        let second = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.handle_turn(request_for("sess-a", "second")).await }
        });

        // With time paused the sleep resolves only once every other task is
        // blocked. Exactly one turn may hold the session lock by then.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(llm.entered.load(Ordering::SeqCst), 1);

        llm.gate.add_permits(1);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(llm.entered.load(Ordering::SeqCst), 2);
        llm.gate.add_permits(1);

        first.await.expect("join").expect("turn");
        second.await.expect("join").expect("turn");

        // Serialized turns leave an alternating transcript, never two user
        // messages back to back.
        let messages = chat
            .recent_messages(&SessionId("sess-a".to_string()), 10)
            .await
            .expect("messages");
        let roles: Vec<MessageRole> = messages.iter().map(|message| message.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::Assistant,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn turns_for_different_sessions_proceed_concurrently() {
        let llm = GatedLlm::new();
        let (orchestrator, _chat) = gated_harness(llm.clone()).await;

        let first = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.handle_turn(request_for("sess-a", "plan athens")).await }
        });
        let second = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.handle_turn(request_for("sess-b", "plan paris")).await }
        });

        // Both sessions reach the LLM before either completes.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(llm.entered.load(Ordering::SeqCst), 2);

        llm.gate.add_permits(2);
        let first = first.await.expect("join").expect("turn");
        let second = second.await.expect("join").expect("turn");
        assert_eq!(first.status, TurnStatus::Completed);
        assert_eq!(second.status, TurnStatus::Completed);
    }
}
