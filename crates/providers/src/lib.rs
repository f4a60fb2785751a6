//! External data providers: POI search, hotel search, and the shared
//! read-through cache and retry layers in front of them.

pub mod geo;
pub mod hotels;
pub mod http;
pub mod poi;
pub mod query;
pub mod retry;

pub use hotels::{HotelProvider, RapidApiHotelProvider, StaticStubHotelProvider};
pub use poi::{OpenTripMapProvider, PoiProvider};
pub use query::{cache_key, CacheCounters, HotelQuery, PoiQuery};
pub use retry::{with_retry, RetrySettings};
