pub mod chat;
pub mod itinerary;
pub mod travel;
pub mod usage;
