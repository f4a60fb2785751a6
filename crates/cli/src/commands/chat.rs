use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate};
use secrecy::SecretString;
use uuid::Uuid;

use crate::commands::CommandResult;
use wayfarer_agent::{
    CacheCounters, OpenAiClient, Orchestrator, SpendCapGuard, ToolDispatcher,
};
use wayfarer_core::config::{AppConfig, LoadOptions};
use wayfarer_core::domain::chat::{ChatRequest, SessionId};
use wayfarer_core::domain::travel::{BudgetTier, DateRange};
use wayfarer_db::repositories::{
    SqlCacheRepository, SqlCatalogRepository, SqlChatRepository, SqlItineraryRepository,
    SqlLedgerRepository,
};
use wayfarer_db::{connect_with_settings, migrations};
use wayfarer_providers::hotels::{HotelProvider, RapidApiHotelProvider, StaticStubHotelProvider};
use wayfarer_providers::{OpenTripMapProvider, RetrySettings};

pub struct ChatArgs {
    pub message: String,
    pub session: Option<String>,
    pub destination: Option<String>,
    pub country: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub tier: Option<String>,
}

pub fn run(args: ChatArgs) -> CommandResult {
    let request = match build_request(&args) {
        Ok(request) => request,
        Err(message) => {
            return CommandResult::failure("chat", "invalid_argument", message, 2);
        }
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    init_logging(&config);
    let Some(llm_api_key) = config.llm.api_key.clone() else {
        return CommandResult::failure(
            "chat",
            "config_validation",
            "llm.api_key is required for chat (file, WAYFARER_LLM_API_KEY, or override)",
            2,
        );
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let orchestrator = assemble(&config, llm_api_key, &pool)
            .map_err(|error| ("bootstrap", error, 3u8))?;
        let response = orchestrator
            .handle_turn(request)
            .await
            .map_err(|error| ("turn", error.to_string(), 6u8))?;

        pool.close().await;
        serde_json::to_string_pretty(&response)
            .map_err(|error| ("serialization", error.to_string(), 6u8))
    });

    match result {
        Ok(rendered) => CommandResult { exit_code: 0, output: rendered },
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("chat", error_class, message, exit_code)
        }
    }
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use wayfarer_core::config::LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // try_init so a second command in the same process does not panic.
    let result = match config.logging.format {
        Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init(),
        Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init(),
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().try_init()
        }
    };
    let _ = result;
}

fn build_request(args: &ChatArgs) -> Result<ChatRequest, String> {
    if args.message.trim().is_empty() {
        return Err("message must not be empty".to_string());
    }

    let session_id = SessionId(
        args.session.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
    );

    let budget_tier = match &args.tier {
        Some(raw) => Some(BudgetTier::from_str(raw).map_err(|error| error.to_string())?),
        None => None,
    };

    let date_range = match (&args.start_date, &args.end_date) {
        (Some(start), Some(end)) => {
            let start = parse_date(start)?;
            let end = parse_date(end)?;
            Some(DateRange::new(start, end).map_err(|error| error.to_string())?)
        }
        (None, None) => None,
        _ => return Err("--start-date and --end-date must be given together".to_string()),
    };

    Ok(ChatRequest {
        session_id,
        message: args.message.clone(),
        destination: args.destination.clone(),
        country: args.country.clone(),
        date_range,
        budget_tier,
    })
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("`{raw}` is not a YYYY-MM-DD date"))
}

fn assemble(
    config: &AppConfig,
    llm_api_key: SecretString,
    pool: &wayfarer_db::DbPool,
) -> Result<Orchestrator, String> {
    let ledger = Arc::new(SqlLedgerRepository::new(pool.clone()));
    let chat = Arc::new(SqlChatRepository::new(pool.clone()));
    let cache = Arc::new(SqlCacheRepository::new(pool.clone()));
    let catalog = Arc::new(SqlCatalogRepository::new(pool.clone()));
    let itineraries = Arc::new(SqlItineraryRepository::new(pool.clone()));

    let http = reqwest::Client::builder()
        .timeout(StdDuration::from_secs(config.providers.timeout_secs))
        .build()
        .map_err(|error| format!("failed to build HTTP client: {error}"))?;
    let llm_http = reqwest::Client::builder()
        .timeout(StdDuration::from_secs(config.llm.timeout_secs))
        .build()
        .map_err(|error| format!("failed to build HTTP client: {error}"))?;

    let retry = RetrySettings::with_max_retries(config.providers.max_retries);
    let cache_ttl = Duration::seconds(i64::from(config.cache.ttl_seconds));

    // An unkeyed OpenTripMap client degrades to provider errors at dispatch,
    // which the orchestrator already treats as "answer from model knowledge".
    let opentripmap_key = config
        .providers
        .opentripmap
        .api_key
        .clone()
        .unwrap_or_else(|| SecretString::from(""));
    let pois = Arc::new(OpenTripMapProvider::new(
        http.clone(),
        opentripmap_key,
        config.providers.opentripmap.base_url.clone(),
        catalog.clone(),
        retry,
    ));

    let hotels: Arc<dyn HotelProvider> = if config.rapidapi_active() {
        let rapidapi_key = config
            .providers
            .hotels
            .rapidapi_key
            .clone()
            .ok_or_else(|| "rapidapi_key missing despite rapidapi_active".to_string())?;
        Arc::new(RapidApiHotelProvider::new(
            http,
            rapidapi_key,
            config.providers.hotels.rapidapi_base_url.clone(),
            cache.clone(),
            catalog,
            cache_ttl,
            retry,
        ))
    } else {
        Arc::new(StaticStubHotelProvider::new(catalog))
    };

    let dispatcher = ToolDispatcher::new(
        pois,
        hotels,
        itineraries,
        cache,
        Arc::new(CacheCounters::default()),
        cache_ttl,
    );
    let guard = SpendCapGuard::new(ledger, config.spend.monthly_cap_usd);
    let llm = Arc::new(OpenAiClient::new(
        llm_http,
        llm_api_key,
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.temperature,
        config.llm.max_tokens,
    ));

    Ok(Orchestrator::new(llm, guard, dispatcher, chat))
}
