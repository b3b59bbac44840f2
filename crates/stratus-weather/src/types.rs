use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stratus_core::ErrorKind;

/// A resolved user position. Immutable once produced; a new resolution
/// attempt yields a new value. City and country are only known when the
/// position came from an IP geolocation provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            city: None,
            country: None,
        }
    }
}

/// Primary weather condition as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Provider condition code (e.g. 800 = clear sky)
    pub id: u16,
    pub description: String,
    /// Provider icon identifier (e.g. "01d")
    pub icon: String,
}

impl Condition {
    /// Placeholder for responses with an empty condition array.
    pub fn unknown() -> Self {
        Self {
            id: 0,
            description: "Unknown".to_string(),
            icon: String::new(),
        }
    }
}

/// Current conditions at one point in time. Fetched fresh per request and
/// never partially updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: u8,
    pub pressure: u32,
    pub wind_speed: f64,
    pub wind_deg: u16,
    /// Meters; absent when the provider omits it.
    pub visibility: Option<u32>,
    pub condition: Condition,
    pub place: Option<String>,
    pub country: Option<String>,
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

/// One day of the daily forecast. Entries are chronological ascending,
/// first entry = tomorrow (today is covered by the current snapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub date: NaiveDate,
    /// Local weekday name ("Monday", ...), in the queried location's zone.
    pub day_name: String,
    pub temp_min: f64,
    pub temp_max: f64,
    pub condition: Condition,
    pub humidity: u8,
    pub wind_speed: f64,
    /// Probability of precipitation, 0-100.
    pub precipitation_chance: u8,
}

/// One hour of the hourly forecast, chronological ascending from now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyEntry {
    pub time: DateTime<Utc>,
    pub temperature: f64,
    pub condition: Condition,
    pub humidity: u8,
    pub wind_speed: f64,
    /// Probability of precipitation, 0-100.
    pub precipitation_chance: u8,
}

/// Externally observable state of a query, one instance per cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<ErrorKind>,
}

impl<T> QueryState<T> {
    /// Disabled or not-yet-activated query.
    pub fn idle() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }

    /// Foreground fetch in progress with nothing to show yet.
    pub fn loading() -> Self {
        Self {
            data: None,
            loading: true,
            error: None,
        }
    }

    /// Data available (fresh or stale-but-valid).
    pub fn ready(data: T) -> Self {
        Self {
            data: Some(data),
            loading: false,
            error: None,
        }
    }

    /// Terminal failure with no usable data.
    pub fn failed(error: ErrorKind) -> Self {
        Self {
            data: None,
            loading: false,
            error: Some(error),
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self::idle()
    }
}
