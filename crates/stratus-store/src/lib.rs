//! Durable local storage for Stratus: a key-value substrate, the TTL cache
//! used by the query layer, and persisted UI state.
//!
//! All stores share one SQLite file and stay out of each other's way via
//! key prefixes. Concurrent writers race last-write-wins.

pub mod cache;
pub mod kv;
pub mod state;

pub use cache::{CacheEntry, TtlCache, DEFAULT_TTL};
pub use kv::KvStore;
pub use state::{CityRecord, Preferences, StateStore, TemperatureUnit, Theme, RECENT_LIMIT};
