pub mod config;
pub mod domain;
pub mod errors;
pub mod spend;

pub use config::{
    AppConfig, CacheConfig, ConfigError, ConfigOverrides, DatabaseConfig, HotelsConfig,
    LlmConfig, LoadOptions, LogFormat, LoggingConfig, OpenTripMapConfig, ProvidersConfig,
    SpendConfig,
};
pub use domain::chat::{
    ChatMessage, ChatRequest, ChatResponse, ItineraryId, MessageRole, SessionId, TurnStatus,
};
pub use domain::itinerary::{Itinerary, ItineraryDay, ItineraryItem, ItemKind};
pub use domain::travel::{BudgetTier, DateRange, HotelId, HotelRecord, PlaceId, PlaceRecord};
pub use domain::usage::{MonthKey, MonthlyUsageStats, SpendState, SpendStatus, UsageRecord};
pub use errors::{DomainError, ProviderError, ProviderErrorKind};
pub use spend::{estimate_call_cost, estimate_tokens};
