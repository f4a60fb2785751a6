use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use wayfarer_core::domain::travel::BudgetTier;

/// Normalized POI search input. City and country are lowercased and trimmed
/// so that equivalent requests derive the same cache key.
#[derive(Clone, Debug, PartialEq)]
pub struct PoiQuery {
    pub city: String,
    pub country: Option<String>,
    pub categories: Vec<String>,
    pub limit: u32,
}

impl PoiQuery {
    pub fn new(city: &str, country: Option<&str>, categories: Vec<String>, limit: u32) -> Self {
        Self {
            city: normalize_place_name(city),
            country: country.map(normalize_place_name),
            categories: categories
                .into_iter()
                .map(|category| category.trim().to_ascii_lowercase())
                .filter(|category| !category.is_empty())
                .collect(),
            limit,
        }
    }

    pub fn params(&self) -> Value {
        json!({
            "city": self.city,
            "country": self.country,
            "categories": self.categories,
            "limit": self.limit,
        })
    }
}

/// Normalized hotel search input.
#[derive(Clone, Debug, PartialEq)]
pub struct HotelQuery {
    pub city: String,
    pub country: Option<String>,
    pub budget_tier: BudgetTier,
    pub limit: u32,
}

impl HotelQuery {
    pub fn new(city: &str, country: Option<&str>, budget_tier: BudgetTier, limit: u32) -> Self {
        Self {
            city: normalize_place_name(city),
            country: country.map(normalize_place_name),
            budget_tier,
            limit,
        }
    }

    pub fn params(&self) -> Value {
        json!({
            "city": self.city,
            "country": self.country,
            "budget_tier": self.budget_tier.as_str(),
            "limit": self.limit,
        })
    }

    /// City name with the original capitalization style expected by the
    /// catalog tables ("athens" -> "Athens").
    pub fn display_city(&self) -> String {
        let mut chars = self.city.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }
}

fn normalize_place_name(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

/// Cache key for a provider call: sha256 over provider kind, endpoint, and
/// canonical JSON of the normalized query. serde_json serializes object keys
/// in sorted order, which makes the JSON form canonical.
pub fn cache_key(provider: &str, endpoint: &str, params: &Value) -> String {
    let canonical = params.to_string();
    sha256_hex(format!("{provider}:{endpoint}:{canonical}").as_bytes())
}

fn sha256_hex(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest.as_slice() {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

/// Process-wide cache hit/miss counters, shared by every provider instance
/// and read by the admin snapshot.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
