//! Typed client over the weather provider's combined endpoint.
//!
//! Current conditions, daily forecast, and hourly forecast all come from one
//! combined call; the three public operations slice and reshape that single
//! response rather than hitting separate remote endpoints, so callers never
//! amplify one screen refresh into three requests.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use stratus_core::{ErrorKind, WeatherConfig};

use crate::types::{Condition, Coordinates, ForecastEntry, HourlyEntry, WeatherSnapshot};

const ONECALL_PATH: &str = "/data/2.5/onecall";
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Daily entries returned by `forecast` (today is skipped).
pub const FORECAST_DAYS: usize = 7;

#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: Client,
    api_key: String,
    base_url: String,
    units: String,
    lang: String,
}

impl WeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self, ErrorKind> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(ErrorKind::from)?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            units: config.units.clone(),
            lang: config.lang.clone(),
        })
    }

    /// Current conditions at the given position. City/country from the
    /// resolved coordinates ride along for display, since the combined
    /// endpoint reports no place name.
    pub async fn current_weather(
        &self,
        coords: &Coordinates,
    ) -> Result<WeatherSnapshot, ErrorKind> {
        let combined = self.fetch_combined(coords.latitude, coords.longitude).await?;
        let current = combined.current;
        let today = combined.daily.first();

        Ok(WeatherSnapshot {
            temperature: current.temp,
            feels_like: current.feels_like,
            temp_min: today.map_or(current.temp, |d| d.temp.min),
            temp_max: today.map_or(current.temp, |d| d.temp.max),
            humidity: current.humidity,
            pressure: current.pressure,
            wind_speed: current.wind_speed,
            wind_deg: current.wind_deg,
            visibility: current.visibility,
            condition: current
                .weather
                .into_iter()
                .next()
                .map(Condition::from)
                .unwrap_or_else(Condition::unknown),
            place: coords.city.clone(),
            country: coords.country.clone(),
            sunrise: epoch_to_utc(current.sunrise),
            sunset: epoch_to_utc(current.sunset),
        })
    }

    /// Daily forecast, up to [`FORECAST_DAYS`] entries. The provider's first
    /// daily entry is today, which the current snapshot already covers, so
    /// it is skipped; day names are rendered in the location's local zone.
    pub async fn forecast(&self, coords: &Coordinates) -> Result<Vec<ForecastEntry>, ErrorKind> {
        let combined = self.fetch_combined(coords.latitude, coords.longitude).await?;
        let offset = local_offset(combined.timezone_offset);

        Ok(combined
            .daily
            .into_iter()
            .skip(1)
            .take(FORECAST_DAYS)
            .map(|day| {
                let local: DateTime<FixedOffset> =
                    epoch_to_utc(day.dt).with_timezone(&offset);
                ForecastEntry {
                    date: local.date_naive(),
                    day_name: local.format("%A").to_string(),
                    temp_min: day.temp.min,
                    temp_max: day.temp.max,
                    condition: day
                        .weather
                        .into_iter()
                        .next()
                        .map(Condition::from)
                        .unwrap_or_else(Condition::unknown),
                    humidity: day.humidity,
                    wind_speed: day.wind_speed,
                    precipitation_chance: pop_percent(day.pop),
                }
            })
            .collect())
    }

    /// Hourly forecast, chronological from now.
    pub async fn hourly_forecast(
        &self,
        coords: &Coordinates,
    ) -> Result<Vec<HourlyEntry>, ErrorKind> {
        let combined = self.fetch_combined(coords.latitude, coords.longitude).await?;

        Ok(combined
            .hourly
            .into_iter()
            .map(|hour| HourlyEntry {
                time: epoch_to_utc(hour.dt),
                temperature: hour.temp,
                condition: hour
                    .weather
                    .into_iter()
                    .next()
                    .map(Condition::from)
                    .unwrap_or_else(Condition::unknown),
                humidity: hour.humidity,
                wind_speed: hour.wind_speed,
                precipitation_chance: pop_percent(hour.pop),
            })
            .collect())
    }

    async fn fetch_combined(&self, lat: f64, lon: f64) -> Result<OneCallResponse, ErrorKind> {
        if self.api_key.is_empty() {
            return Err(ErrorKind::Config(
                "weather API key is not configured".to_string(),
            ));
        }

        let url = format!("{}{}", self.base_url, ONECALL_PATH);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("exclude", "minutely,alerts".to_string()),
                ("appid", self.api_key.clone()),
                ("units", self.units.clone()),
                ("lang", self.lang.clone()),
            ])
            .send()
            .await
            .map_err(ErrorKind::from)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            tracing::warn!(%status, "weather API returned an error: {}", message);
            return Err(ErrorKind::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<OneCallResponse>()
            .await
            .map_err(|e| ErrorKind::Unknown(format!("unexpected response shape: {}", e)))
    }
}

fn epoch_to_utc(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn local_offset(offset_secs: i32) -> FixedOffset {
    // Out-of-range offsets fall back to UTC.
    FixedOffset::east_opt(offset_secs).unwrap_or_else(|| Utc.fix())
}

fn pop_percent(pop: f64) -> u8 {
    (pop.clamp(0.0, 1.0) * 100.0).round() as u8
}

// Wire format of the combined endpoint.

#[derive(Debug, Deserialize)]
struct OneCallResponse {
    #[serde(default)]
    timezone_offset: i32,
    current: CurrentWire,
    #[serde(default)]
    daily: Vec<DailyWire>,
    #[serde(default)]
    hourly: Vec<HourlyWire>,
}

#[derive(Debug, Deserialize)]
struct CurrentWire {
    #[serde(default)]
    sunrise: i64,
    #[serde(default)]
    sunset: i64,
    temp: f64,
    feels_like: f64,
    pressure: u32,
    humidity: u8,
    #[serde(default)]
    visibility: Option<u32>,
    wind_speed: f64,
    #[serde(default)]
    wind_deg: u16,
    #[serde(default)]
    weather: Vec<ConditionWire>,
}

#[derive(Debug, Deserialize)]
struct DailyWire {
    dt: i64,
    temp: DailyTempWire,
    #[serde(default)]
    humidity: u8,
    #[serde(default)]
    wind_speed: f64,
    #[serde(default)]
    pop: f64,
    #[serde(default)]
    weather: Vec<ConditionWire>,
}

#[derive(Debug, Deserialize)]
struct DailyTempWire {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct HourlyWire {
    dt: i64,
    temp: f64,
    #[serde(default)]
    humidity: u8,
    #[serde(default)]
    wind_speed: f64,
    #[serde(default)]
    pop: f64,
    #[serde(default)]
    weather: Vec<ConditionWire>,
}

#[derive(Debug, Deserialize)]
struct ConditionWire {
    id: u16,
    description: String,
    icon: String,
}

impl From<ConditionWire> for Condition {
    fn from(wire: ConditionWire) -> Self {
        Self {
            id: wire.id,
            description: wire.description,
            icon: wire.icon,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> WeatherConfig {
        WeatherConfig {
            api_key: "test-key".to_string(),
            base_url: base_url.to_string(),
            ..WeatherConfig::default()
        }
    }

    fn onecall_body() -> serde_json::Value {
        // 2026-08-24 12:00 UTC onwards, +3h offset (Istanbul).
        let day = 86_400;
        let base = 1_787_400_000;
        let daily: Vec<_> = (0..8)
            .map(|i| {
                serde_json::json!({
                    "dt": base + i * day,
                    "temp": {"min": 14.0 + i as f64, "max": 22.0 + i as f64},
                    "humidity": 60,
                    "wind_speed": 3.5,
                    "pop": 0.25,
                    "weather": [{"id": 801, "description": "few clouds", "icon": "02d"}]
                })
            })
            .collect();
        let hourly: Vec<_> = (0..12)
            .map(|i| {
                serde_json::json!({
                    "dt": base + i * 3600,
                    "temp": 18.0,
                    "humidity": 65,
                    "wind_speed": 4.0,
                    "pop": 0.1,
                    "weather": [{"id": 800, "description": "clear sky", "icon": "01d"}]
                })
            })
            .collect();

        serde_json::json!({
            "timezone_offset": 10800,
            "current": {
                "dt": base,
                "sunrise": base - 6 * 3600,
                "sunset": base + 7 * 3600,
                "temp": 18.2,
                "feels_like": 17.6,
                "pressure": 1015,
                "humidity": 62,
                "visibility": 10000,
                "wind_speed": 5.1,
                "wind_deg": 240,
                "weather": [{"id": 800, "description": "clear sky", "icon": "01d"}]
            },
            "daily": daily,
            "hourly": hourly,
        })
    }

    async fn mock_onecall(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(ONECALL_PATH))
            .and(query_param("units", "metric"))
            .and(query_param("exclude", "minutely,alerts"))
            .and(query_param("appid", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(onecall_body()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_current_weather_maps_combined_response() {
        let server = MockServer::start().await;
        mock_onecall(&server).await;

        let client = WeatherClient::new(&test_config(&server.uri())).unwrap();
        let mut coords = Coordinates::new(41.0082, 28.9784);
        coords.city = Some("Istanbul".to_string());
        coords.country = Some("TR".to_string());

        let snapshot = client.current_weather(&coords).await.unwrap();
        assert_eq!(snapshot.temperature, 18.2);
        assert_eq!(snapshot.feels_like, 17.6);
        // min/max come from today's daily entry.
        assert_eq!(snapshot.temp_min, 14.0);
        assert_eq!(snapshot.temp_max, 22.0);
        assert_eq!(snapshot.condition.id, 800);
        assert_eq!(snapshot.place.as_deref(), Some("Istanbul"));
        assert!(snapshot.sunset > snapshot.sunrise);
    }

    #[tokio::test]
    async fn test_forecast_skips_today_and_returns_seven_days() {
        let server = MockServer::start().await;
        mock_onecall(&server).await;

        let client = WeatherClient::new(&test_config(&server.uri())).unwrap();
        let forecast = client
            .forecast(&Coordinates::new(41.0082, 28.9784))
            .await
            .unwrap();

        assert_eq!(forecast.len(), FORECAST_DAYS);
        // First entry is tomorrow (daily index 1).
        assert_eq!(forecast[0].temp_min, 15.0);
        assert_eq!(forecast[0].precipitation_chance, 25);
        // Chronological ascending with consecutive local day names.
        for pair in forecast.windows(2) {
            assert_eq!(pair[1].date, pair[0].date.succ_opt().unwrap());
        }
        assert!(!forecast[0].day_name.is_empty());
    }

    #[tokio::test]
    async fn test_hourly_forecast_is_chronological() {
        let server = MockServer::start().await;
        mock_onecall(&server).await;

        let client = WeatherClient::new(&test_config(&server.uri())).unwrap();
        let hourly = client
            .hourly_forecast(&Coordinates::new(41.0082, 28.9784))
            .await
            .unwrap();

        assert_eq!(hourly.len(), 12);
        for pair in hourly.windows(2) {
            assert!(pair[0].time < pair[1].time);
        }
        assert_eq!(hourly[0].precipitation_chance, 10);
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_any_network_call() {
        let server = MockServer::start().await;
        // No mock mounted: a request would 404 and fail differently.

        let mut config = test_config(&server.uri());
        config.api_key = String::new();
        let client = WeatherClient::new(&config).unwrap();

        let err = client
            .current_weather(&Coordinates::new(41.0082, 28.9784))
            .await
            .unwrap_err();
        assert!(matches!(err, ErrorKind::Config(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_2xx_carries_status_and_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ONECALL_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "cod": 401,
                "message": "Invalid API key"
            })))
            .mount(&server)
            .await;

        let client = WeatherClient::new(&test_config(&server.uri())).unwrap();
        let err = client
            .current_weather(&Coordinates::new(41.0082, 28.9784))
            .await
            .unwrap_err();

        match err {
            ErrorKind::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("expected ApiError, got {:?}", other),
        }
    }
}
