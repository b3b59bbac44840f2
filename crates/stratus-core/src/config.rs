use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable consulted when the config file carries no API key.
pub const API_KEY_ENV: &str = "STRATUS_OWM_API_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Weather provider settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Transport-level response cache settings
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// OpenWeather API key (falls back to `STRATUS_OWM_API_KEY` if empty)
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the weather API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Measurement units requested from the provider
    #[serde(default = "default_units")]
    pub units: String,

    /// Language tag for provider-supplied descriptions
    #[serde(default = "default_lang")]
    pub lang: String,

    /// TTL for application-level cached weather data, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Background refresh interval for mounted queries, in seconds
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openweathermap.org".to_string()
}

fn default_units() -> String {
    "metric".to_string()
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_refresh_interval_secs() -> u64 {
    300
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).unwrap_or_default(),
            base_url: default_base_url(),
            units: default_units(),
            lang: default_lang(),
            cache_ttl_secs: default_cache_ttl_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Hosts treated as weather/geolocation API hosts by the response cache
    #[serde(default = "default_api_hosts")]
    pub api_hosts: Vec<String>,

    /// Maximum number of API responses retained by the response cache
    #[serde(default = "default_max_cached_responses")]
    pub max_cached_responses: usize,

    /// Horizon beyond which a stored API response is no longer served
    /// as an offline fallback, in seconds
    #[serde(default = "default_offline_fallback_secs")]
    pub offline_fallback_secs: u64,
}

fn default_api_hosts() -> Vec<String> {
    vec![
        "api.openweathermap.org".to_string(),
        "ipapi.co".to_string(),
        "ip-api.com".to_string(),
    ]
}

fn default_max_cached_responses() -> usize {
    50
}

fn default_offline_fallback_secs() -> u64 {
    600
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_hosts: default_api_hosts(),
            max_cached_responses: default_max_cached_responses(),
            offline_fallback_secs: default_offline_fallback_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stratus");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        if !validation.warnings.is_empty() {
            for warning in &validation.warnings {
                tracing::warn!("Config warning: {}", warning);
            }
        }

        Ok((config, validation))
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.effective_api_key().is_empty() {
            result.add_warning(
                "weather.api_key",
                format!("No API key configured; set it in the config file or via {}", API_KEY_ENV),
            );
        }

        if url::Url::parse(&self.weather.base_url).is_err() {
            result.add_error("weather.base_url", "Not a valid URL");
        }

        if self.weather.cache_ttl_secs == 0 {
            result.add_error("weather.cache_ttl_secs", "TTL must be greater than 0");
        }

        if self.network.max_cached_responses == 0 {
            result.add_error(
                "network.max_cached_responses",
                "Response cache must hold at least one entry",
            );
        }

        result
    }

    /// API key from the config file, falling back to the environment.
    pub fn effective_api_key(&self) -> String {
        if !self.weather.api_key.is_empty() {
            return self.weather.api_key.clone();
        }
        std::env::var(API_KEY_ENV).unwrap_or_default()
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("stratus");
        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.weather.units, "metric");
        assert_eq!(config.weather.cache_ttl_secs, 300);
        assert_eq!(config.network.max_cached_responses, 50);
        assert_eq!(config.network.offline_fallback_secs, 600);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            config_dir = "/tmp/stratus"

            [weather]
            api_key = "abc123"
            "#,
        )
        .unwrap();

        assert_eq!(config.weather.api_key, "abc123");
        assert_eq!(config.weather.base_url, "https://api.openweathermap.org");
        assert_eq!(config.network.max_cached_responses, 50);
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut config = Config::default();
        config.weather.api_key = "abc123".to_string();
        config.weather.base_url = "not a url".to_string();

        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.error_summary().contains("weather.base_url"));
    }

    #[test]
    fn test_validate_warns_on_missing_api_key() {
        let mut config = Config::default();
        config.weather.api_key = String::new();
        std::env::remove_var(API_KEY_ENV);

        let result = config.validate();
        assert!(result.is_valid());
        assert!(!result.warnings.is_empty());
    }
}
