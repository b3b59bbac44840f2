//! Weather data layer for Stratus: location resolution, the provider client,
//! and the stale-while-revalidate query engine that keeps the dashboard
//! populated across flaky connectivity.

pub mod client;
pub mod location;
pub mod queries;
pub mod query;
pub mod types;

pub use client::{WeatherClient, FORECAST_DAYS};
pub use location::{
    DeviceLocator, GeolocationOptions, IpLocationProvider, LocationError, LocationResolver,
};
pub use queries::WeatherQueries;
pub use query::{SwrOptions, SwrQuery};
pub use types::{
    Condition, Coordinates, ForecastEntry, HourlyEntry, QueryState, WeatherSnapshot,
};
