//! Persisted UI state: favorites, recent cities, and preference flags.
//!
//! Each piece of state lives under its own namespaced key with no shared
//! schema or version field, so every read tolerates missing or partial
//! entries and falls back to defaults.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::kv::KvStore;

const FAVORITES_KEY: &str = "state:favorites";
const RECENT_KEY: &str = "state:recent_cities";
const PREF_UNIT_KEY: &str = "pref:temperature_unit";
const PREF_NOTIFICATIONS_KEY: &str = "pref:notifications_enabled";
const PREF_THEME_KEY: &str = "pref:theme";
const PREF_AMBIENCE_KEY: &str = "pref:ambience_enabled";

/// Most-recent-first recents list cap.
pub const RECENT_LIMIT: usize = 5;

/// A saved city. Identity is (name, country); coordinates ride along so the
/// UI can re-query weather without another geocoding round trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CityRecord {
    pub name: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl CityRecord {
    fn same_city(&self, other: &CityRecord) -> bool {
        self.name == other.name && self.country == other.country
    }
}

/// Temperature unit preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

/// Theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

/// User preference flags, each stored as an independent entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preferences {
    pub temperature_unit: TemperatureUnit,
    pub notifications_enabled: bool,
    pub theme: Theme,
    pub ambience_enabled: bool,
}

/// Accessor over the persisted UI state.
#[derive(Clone)]
pub struct StateStore {
    store: Arc<KvStore>,
}

impl StateStore {
    pub fn new(store: Arc<KvStore>) -> Self {
        Self { store }
    }

    /// The favorites list, oldest-added first.
    pub fn favorites(&self) -> Vec<CityRecord> {
        self.read_or_default(FAVORITES_KEY)
    }

    /// Add a city to favorites. Returns false if it was already present
    /// (deduplicated by name + country).
    pub fn add_favorite(&self, city: CityRecord) -> bool {
        let mut favorites = self.favorites();
        if favorites.iter().any(|f| f.same_city(&city)) {
            return false;
        }
        favorites.push(city);
        self.write(FAVORITES_KEY, &favorites);
        true
    }

    /// Remove a city from favorites. Returns true if it was present.
    pub fn remove_favorite(&self, name: &str, country: &str) -> bool {
        let mut favorites = self.favorites();
        let before = favorites.len();
        favorites.retain(|f| !(f.name == name && f.country == country));
        if favorites.len() == before {
            return false;
        }
        self.write(FAVORITES_KEY, &favorites);
        true
    }

    /// Recently viewed cities, most recent first.
    pub fn recent_cities(&self) -> Vec<CityRecord> {
        self.read_or_default(RECENT_KEY)
    }

    /// Record a city view. An existing entry moves to the front instead of
    /// duplicating; the list is capped at [`RECENT_LIMIT`].
    pub fn push_recent(&self, city: CityRecord) {
        let mut recents = self.recent_cities();
        recents.retain(|r| !r.same_city(&city));
        recents.insert(0, city);
        recents.truncate(RECENT_LIMIT);
        self.write(RECENT_KEY, &recents);
    }

    /// Current preference flags; any missing key falls back to its default.
    pub fn preferences(&self) -> Preferences {
        Preferences {
            temperature_unit: self.read_or_default(PREF_UNIT_KEY),
            notifications_enabled: self.read_or_default(PREF_NOTIFICATIONS_KEY),
            theme: self.read_or_default(PREF_THEME_KEY),
            ambience_enabled: self.read_or_default(PREF_AMBIENCE_KEY),
        }
    }

    /// Update the temperature-unit preference. The caller is responsible for
    /// firing `AppEvent::UnitPreferenceChanged` afterwards.
    pub fn set_temperature_unit(&self, unit: TemperatureUnit) {
        self.write(PREF_UNIT_KEY, &unit);
    }

    pub fn set_notifications_enabled(&self, enabled: bool) {
        self.write(PREF_NOTIFICATIONS_KEY, &enabled);
    }

    pub fn set_theme(&self, theme: Theme) {
        self.write(PREF_THEME_KEY, &theme);
    }

    pub fn set_ambience_enabled(&self, enabled: bool) {
        self.write(PREF_AMBIENCE_KEY, &enabled);
    }

    fn read_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.store.get_raw(key) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::debug!(key, "unreadable state entry, using default: {}", e);
                T::default()
            }),
            Ok(None) => T::default(),
            Err(e) => {
                tracing::warn!(key, "failed to read state entry: {}", e);
                T::default()
            }
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key, "failed to serialize state entry: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set_raw(key, &json) {
            tracing::warn!(key, "failed to persist state entry: {}", e);
        }
    }
}
