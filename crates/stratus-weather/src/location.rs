//! Location resolution with a strict provider fallback chain.
//!
//! Device geolocation → ipapi.co → ip-api.com, strictly linear: a step must
//! fail before the next is tried, and steps are never raced, since device
//! geolocation is user-interactive (a permission prompt must complete or
//! fail before burning quota on IP lookups that would become moot).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use stratus_core::ErrorKind;
use stratus_net::{retry, RetryPolicy};

use crate::types::Coordinates;

/// Timeout for the device geolocation step.
pub const GEOLOCATION_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-request timeout for IP geolocation providers.
pub const IP_PROVIDER_TIMEOUT: Duration = Duration::from_secs(8);
/// Retries per IP provider before falling through to the next step.
pub const IP_PROVIDER_RETRIES: u32 = 2;

const IPAPI_URL: &str = "https://ipapi.co/json/";
const IP_API_COM_URL: &str = "http://ip-api.com/json/";

/// Options for a device geolocation request.
#[derive(Debug, Clone)]
pub struct GeolocationOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Maximum acceptable age of a cached device fix; zero forces a fresh one.
    pub max_staleness: Duration,
}

impl Default for GeolocationOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: GEOLOCATION_TIMEOUT,
            max_staleness: Duration::ZERO,
        }
    }
}

/// Location resolution errors.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Device geolocation unavailable on this platform")]
    Unsupported,
    #[error("Location request timed out")]
    Timeout,
    #[error("Location provider error: {0}")]
    Provider(ErrorKind),
    #[error("location could not be determined; grant permission or search manually")]
    Unavailable,
}

impl LocationError {
    /// User-friendly message for UI display.
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied => {
                "Location access was denied. Grant permission or search for a city.".to_string()
            }
            Self::Unsupported | Self::Unavailable => {
                "Your location could not be determined. Grant location permission or search for a city manually."
                    .to_string()
            }
            Self::Timeout => "Locating you took too long. Please try again.".to_string(),
            Self::Provider(e) => e.user_message(),
        }
    }
}

/// Precise device geolocation (GPS / platform location service).
#[async_trait]
pub trait DeviceLocator: Send + Sync {
    async fn locate(&self, options: &GeolocationOptions) -> Result<Coordinates, LocationError>;
}

/// Coarse IP-based geolocation.
#[async_trait]
pub trait IpLocationProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn lookup(&self) -> Result<Coordinates, ErrorKind>;
}

fn provider_client() -> Result<Client, ErrorKind> {
    Client::builder()
        .timeout(IP_PROVIDER_TIMEOUT)
        .build()
        .map_err(ErrorKind::from)
}

/// Primary IP geolocation service (ipapi.co).
pub struct IpapiProvider {
    client: Client,
    url: String,
}

impl IpapiProvider {
    pub fn new() -> Result<Self, ErrorKind> {
        Ok(Self {
            client: provider_client()?,
            url: IPAPI_URL.to_string(),
        })
    }

    #[cfg(test)]
    pub fn new_with_url(url: &str) -> Result<Self, ErrorKind> {
        Ok(Self {
            client: provider_client()?,
            url: url.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct IpapiResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
    city: Option<String>,
    country_name: Option<String>,
    #[serde(default)]
    error: bool,
    reason: Option<String>,
}

#[async_trait]
impl IpLocationProvider for IpapiProvider {
    fn name(&self) -> &'static str {
        "ipapi.co"
    }

    async fn lookup(&self) -> Result<Coordinates, ErrorKind> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(ErrorKind::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ErrorKind::Api {
                status: status.as_u16(),
                message: "IP geolocation request failed".to_string(),
            });
        }

        let body: IpapiResponse = response
            .json()
            .await
            .map_err(|e| ErrorKind::Unknown(format!("unexpected provider response: {}", e)))?;

        // An error flag or missing coordinates is a failure of this step,
        // never a success with null data.
        if body.error {
            return Err(ErrorKind::Unknown(
                body.reason.unwrap_or_else(|| "provider reported an error".to_string()),
            ));
        }
        match (body.latitude, body.longitude) {
            (Some(latitude), Some(longitude)) => Ok(Coordinates {
                latitude,
                longitude,
                city: body.city,
                country: body.country_name,
            }),
            _ => Err(ErrorKind::Unknown(
                "provider response missing coordinates".to_string(),
            )),
        }
    }
}

/// Fallback IP geolocation service (ip-api.com).
pub struct IpApiComProvider {
    client: Client,
    url: String,
}

impl IpApiComProvider {
    pub fn new() -> Result<Self, ErrorKind> {
        Ok(Self {
            client: provider_client()?,
            url: IP_API_COM_URL.to_string(),
        })
    }

    #[cfg(test)]
    pub fn new_with_url(url: &str) -> Result<Self, ErrorKind> {
        Ok(Self {
            client: provider_client()?,
            url: url.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct IpApiComResponse {
    status: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    city: Option<String>,
    country: Option<String>,
    message: Option<String>,
}

#[async_trait]
impl IpLocationProvider for IpApiComProvider {
    fn name(&self) -> &'static str {
        "ip-api.com"
    }

    async fn lookup(&self) -> Result<Coordinates, ErrorKind> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(ErrorKind::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ErrorKind::Api {
                status: status.as_u16(),
                message: "IP geolocation request failed".to_string(),
            });
        }

        let body: IpApiComResponse = response
            .json()
            .await
            .map_err(|e| ErrorKind::Unknown(format!("unexpected provider response: {}", e)))?;

        if body.status.as_deref() == Some("fail") {
            return Err(ErrorKind::Unknown(
                body.message.unwrap_or_else(|| "provider reported an error".to_string()),
            ));
        }
        match (body.lat, body.lon) {
            (Some(latitude), Some(longitude)) => Ok(Coordinates {
                latitude,
                longitude,
                city: body.city,
                country: body.country,
            }),
            _ => Err(ErrorKind::Unknown(
                "provider response missing coordinates".to_string(),
            )),
        }
    }
}

/// Resolves the user's position through the fallback chain.
pub struct LocationResolver {
    device: Option<Arc<dyn DeviceLocator>>,
    providers: Vec<Arc<dyn IpLocationProvider>>,
    retry_policy: RetryPolicy,
}

impl LocationResolver {
    /// Resolver with the default IP provider chain and no device locator
    /// (platforms without one skip straight to IP geolocation).
    pub fn new() -> Result<Self, ErrorKind> {
        Ok(Self {
            device: None,
            providers: vec![
                Arc::new(IpapiProvider::new()?),
                Arc::new(IpApiComProvider::new()?),
            ],
            retry_policy: RetryPolicy {
                max_retries: IP_PROVIDER_RETRIES,
                ..RetryPolicy::default()
            },
        })
    }

    pub fn with_device(mut self, device: Arc<dyn DeviceLocator>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_providers(mut self, providers: Vec<Arc<dyn IpLocationProvider>>) -> Self {
        self.providers = providers;
        self
    }

    /// Walk the chain. No step is revisited once passed.
    pub async fn resolve(&self) -> Result<Coordinates, LocationError> {
        if let Some(device) = &self.device {
            match device.locate(&GeolocationOptions::default()).await {
                Ok(coords) => {
                    tracing::info!("resolved location via device geolocation");
                    // Precise fixes carry no place name.
                    return Ok(Coordinates::new(coords.latitude, coords.longitude));
                }
                Err(e) => {
                    tracing::debug!("device geolocation failed, falling back: {}", e);
                }
            }
        }

        for provider in &self.providers {
            match retry(&self.retry_policy, || provider.lookup()).await {
                Ok(coords) => {
                    tracing::info!(provider = provider.name(), "resolved location via IP");
                    return Ok(coords);
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), "IP provider failed: {}", e);
                }
            }
        }

        Err(LocationError::Unavailable)
    }
}
