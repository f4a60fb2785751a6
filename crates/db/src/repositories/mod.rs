use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use wayfarer_core::domain::chat::{ChatMessage, ItineraryId, SessionId};
use wayfarer_core::domain::itinerary::Itinerary;
use wayfarer_core::domain::travel::{HotelRecord, PlaceRecord};
use wayfarer_core::domain::usage::{MonthKey, MonthlyUsageStats, UsageRecord};

pub mod cache;
pub mod catalog;
pub mod chat;
pub mod itinerary;
pub mod ledger;
pub mod memory;

pub use cache::SqlCacheRepository;
pub use catalog::SqlCatalogRepository;
pub use chat::SqlChatRepository;
pub use itinerary::SqlItineraryRepository;
pub use ledger::SqlLedgerRepository;
pub use memory::{
    InMemoryCacheRepository, InMemoryCatalogRepository, InMemoryChatRepository,
    InMemoryItineraryRepository, InMemoryLedgerRepository,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// One cached provider response. `payload` is the normalized result JSON,
/// stored verbatim so a hit can be replayed without re-normalizing.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub cache_key: String,
    pub provider: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Append-only record of LLM spend. There is deliberately no update or
/// single-row delete operation; monthly state is always derived by summing.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn append(&self, record: UsageRecord) -> Result<(), RepositoryError>;

    async fn monthly_total(&self, month: &MonthKey) -> Result<Decimal, RepositoryError>;

    async fn monthly_stats(&self, month: &MonthKey) -> Result<MonthlyUsageStats, RepositoryError>;

    async fn recent(&self, limit: u32) -> Result<Vec<UsageRecord>, RepositoryError>;

    /// Admin escape hatch: drops every record for a month. Used by the CLI
    /// reset command, never by the orchestrator.
    async fn delete_month(&self, month: &MonthKey) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait CacheRepository: Send + Sync {
    /// Returns the entry only while fresh. An expired row is treated as a
    /// miss; eviction is lazy.
    async fn get(
        &self,
        cache_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, RepositoryError>;

    async fn put(&self, entry: CacheEntry) -> Result<(), RepositoryError>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn ensure_session(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn append_message(&self, message: ChatMessage) -> Result<(), RepositoryError>;

    /// Most recent `limit` messages for a session, oldest first.
    async fn recent_messages(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn upsert_places(
        &self,
        city: &str,
        country: &str,
        records: &[PlaceRecord],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn list_places(&self, city: &str) -> Result<Vec<PlaceRecord>, RepositoryError>;

    async fn upsert_hotels(
        &self,
        records: &[HotelRecord],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn list_hotels(&self, city: &str) -> Result<Vec<HotelRecord>, RepositoryError>;
}

#[async_trait]
pub trait ItineraryRepository: Send + Sync {
    async fn save(&self, itinerary: Itinerary) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &ItineraryId) -> Result<Option<Itinerary>, RepositoryError>;
}
