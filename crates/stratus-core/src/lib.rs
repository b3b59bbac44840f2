pub mod config;
pub mod error;
pub mod events;

pub use config::{Config, NetworkConfig, ValidationResult, WeatherConfig};
pub use error::ErrorKind;
pub use events::{AppEvent, EventBus};

use anyhow::Result;

/// Initialize logging for the application.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Stratus core initialized");
    Ok(())
}
