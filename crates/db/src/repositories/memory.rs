use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use wayfarer_core::domain::chat::{ChatMessage, ItineraryId, SessionId};
use wayfarer_core::domain::itinerary::Itinerary;
use wayfarer_core::domain::travel::{HotelRecord, PlaceRecord};
use wayfarer_core::domain::usage::{MonthKey, MonthlyUsageStats, UsageRecord};

use super::{
    CacheEntry, CacheRepository, CatalogRepository, ChatRepository, ItineraryRepository,
    LedgerRepository, RepositoryError,
};

#[derive(Default)]
pub struct InMemoryLedgerRepository {
    records: RwLock<Vec<UsageRecord>>,
}

#[async_trait::async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn append(&self, record: UsageRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.push(record);
        Ok(())
    }

    async fn monthly_total(&self, month: &MonthKey) -> Result<Decimal, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|record| &record.month_key == month)
            .map(|record| record.cost_usd)
            .sum())
    }

    async fn monthly_stats(&self, month: &MonthKey) -> Result<MonthlyUsageStats, RepositoryError> {
        let records = self.records.read().await;
        let mut stats = MonthlyUsageStats {
            month_key: month.clone(),
            total_cost_usd: Decimal::ZERO,
            total_prompt_tokens: 0,
            total_completion_tokens: 0,
            total_calls: 0,
            blocked_calls: 0,
        };

        for record in records.iter().filter(|record| &record.month_key == month) {
            stats.total_cost_usd += record.cost_usd;
            stats.total_prompt_tokens += u64::from(record.prompt_tokens);
            stats.total_completion_tokens += u64::from(record.completion_tokens);
            stats.total_calls += 1;
            if record.blocked_after {
                stats.blocked_calls += 1;
            }
        }

        Ok(stats)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<UsageRecord>, RepositoryError> {
        let records = self.records.read().await;
        let mut recent: Vec<UsageRecord> = records.clone();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit as usize);
        Ok(recent)
    }

    async fn delete_month(&self, month: &MonthKey) -> Result<u64, RepositoryError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| &record.month_key != month);
        Ok((before - records.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryCacheRepository {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

#[async_trait::async_trait]
impl CacheRepository for InMemoryCacheRepository {
    async fn get(
        &self,
        cache_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, RepositoryError> {
        let mut entries = self.entries.write().await;
        match entries.get(cache_key) {
            Some(entry) if entry.is_fresh(now) => Ok(Some(entry.clone())),
            Some(_) => {
                entries.remove(cache_key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.cache_key.clone(), entry);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        Ok((before - entries.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryChatRepository {
    sessions: RwLock<HashMap<String, DateTime<Utc>>>,
    messages: RwLock<Vec<ChatMessage>>,
}

#[async_trait::async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn ensure_session(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.entry(session_id.0.clone()).or_insert(now);
        Ok(())
    }

    async fn append_message(&self, message: ChatMessage) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.push(message);
        Ok(())
    }

    async fn recent_messages(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let for_session: Vec<ChatMessage> = messages
            .iter()
            .filter(|message| &message.session_id == session_id)
            .cloned()
            .collect();

        let skip = for_session.len().saturating_sub(limit as usize);
        Ok(for_session.into_iter().skip(skip).collect())
    }
}

#[derive(Default)]
pub struct InMemoryCatalogRepository {
    places: RwLock<HashMap<String, Vec<PlaceRecord>>>,
    hotels: RwLock<HashMap<String, Vec<HotelRecord>>>,
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn upsert_places(
        &self,
        city: &str,
        _country: &str,
        records: &[PlaceRecord],
        _fetched_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut places = self.places.write().await;
        let bucket = places.entry(city.to_string()).or_default();
        for record in records {
            bucket.retain(|existing| existing.external_id != record.external_id);
            bucket.push(record.clone());
        }
        Ok(())
    }

    async fn list_places(&self, city: &str) -> Result<Vec<PlaceRecord>, RepositoryError> {
        let places = self.places.read().await;
        Ok(places.get(city).cloned().unwrap_or_default())
    }

    async fn upsert_hotels(
        &self,
        records: &[HotelRecord],
        _fetched_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut hotels = self.hotels.write().await;
        for record in records {
            let bucket = hotels.entry(record.city.clone()).or_default();
            bucket.retain(|existing| existing.external_id != record.external_id);
            bucket.push(record.clone());
        }
        Ok(())
    }

    async fn list_hotels(&self, city: &str) -> Result<Vec<HotelRecord>, RepositoryError> {
        let hotels = self.hotels.read().await;
        Ok(hotels.get(city).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryItineraryRepository {
    itineraries: RwLock<HashMap<String, Itinerary>>,
}

#[async_trait::async_trait]
impl ItineraryRepository for InMemoryItineraryRepository {
    async fn save(&self, itinerary: Itinerary) -> Result<(), RepositoryError> {
        let mut itineraries = self.itineraries.write().await;
        itineraries.insert(itinerary.id.0.clone(), itinerary);
        Ok(())
    }

    async fn find_by_id(&self, id: &ItineraryId) -> Result<Option<Itinerary>, RepositoryError> {
        let itineraries = self.itineraries.read().await;
        Ok(itineraries.get(&id.0).cloned())
    }
}
