//! Per-coordinate query registry.
//!
//! Hands out shared `SwrQuery` instances keyed by domain and coordinates, so
//! every consumer of "current weather for Istanbul" observes the same state
//! and the same in-flight fetch. The registry holds only weak handles: a
//! query (and its interval-refresh task) lives exactly as long as some
//! consumer holds it, and the next request after the last drop activates a
//! fresh one (instantly warm again via the persistent cache). Queries created
//! for `None` coordinates are permanently disabled and never touch the
//! network.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use stratus_store::TtlCache;

use crate::client::WeatherClient;
use crate::query::{FetchFuture, SwrOptions, SwrQuery, WeakQuery};
use crate::types::{Coordinates, ForecastEntry, HourlyEntry, WeatherSnapshot};

type Registry<T> = Mutex<HashMap<String, WeakQuery<T>>>;

/// Shared weather queries for the whole app.
pub struct WeatherQueries {
    cache: TtlCache,
    client: Arc<WeatherClient>,
    options: SwrOptions,
    current: Registry<WeatherSnapshot>,
    forecast: Registry<Vec<ForecastEntry>>,
    hourly: Registry<Vec<HourlyEntry>>,
}

impl WeatherQueries {
    pub fn new(cache: TtlCache, client: Arc<WeatherClient>) -> Self {
        Self::with_options(cache, client, SwrOptions::default())
    }

    pub fn with_options(cache: TtlCache, client: Arc<WeatherClient>, options: SwrOptions) -> Self {
        Self {
            cache,
            client,
            options,
            current: Mutex::new(HashMap::new()),
            forecast: Mutex::new(HashMap::new()),
            hourly: Mutex::new(HashMap::new()),
        }
    }

    /// Current conditions for `coords`, or a disabled query when coordinates
    /// are not yet known.
    pub fn current_weather(&self, coords: Option<&Coordinates>) -> SwrQuery<WeatherSnapshot> {
        let Some(coords) = coords else {
            return SwrQuery::disabled();
        };

        let client = self.client.clone();
        let coords_for_fetch = coords.clone();
        self.get_or_activate(
            &self.current,
            Self::query_key("current", coords),
            Arc::new(move || {
                let client = client.clone();
                let coords = coords_for_fetch.clone();
                Box::pin(async move { client.current_weather(&coords).await })
            }),
        )
    }

    /// Daily forecast (today excluded) for `coords`.
    pub fn forecast(&self, coords: Option<&Coordinates>) -> SwrQuery<Vec<ForecastEntry>> {
        let Some(coords) = coords else {
            return SwrQuery::disabled();
        };

        let client = self.client.clone();
        let coords_for_fetch = coords.clone();
        self.get_or_activate(
            &self.forecast,
            Self::query_key("forecast", coords),
            Arc::new(move || {
                let client = client.clone();
                let coords = coords_for_fetch.clone();
                Box::pin(async move { client.forecast(&coords).await })
            }),
        )
    }

    /// Hour-by-hour outlook for `coords`.
    pub fn hourly_forecast(&self, coords: Option<&Coordinates>) -> SwrQuery<Vec<HourlyEntry>> {
        let Some(coords) = coords else {
            return SwrQuery::disabled();
        };

        let client = self.client.clone();
        let coords_for_fetch = coords.clone();
        self.get_or_activate(
            &self.hourly,
            Self::query_key("hourly", coords),
            Arc::new(move || {
                let client = client.clone();
                let coords = coords_for_fetch.clone();
                Box::pin(async move { client.hourly_forecast(&coords).await })
            }),
        )
    }

    /// Refresh every live query. Called when connectivity returns; the
    /// per-query dedup window still applies. Dead entries are pruned.
    pub fn notify_online(&self) {
        tracing::info!("connectivity restored, refreshing live queries");
        Self::refresh_live(&self.current);
        Self::refresh_live(&self.forecast);
        Self::refresh_live(&self.hourly);
    }

    fn get_or_activate<T>(
        &self,
        registry: &Registry<T>,
        key: String,
        fetcher: Arc<dyn Fn() -> FetchFuture<T> + Send + Sync>,
    ) -> SwrQuery<T>
    where
        T: Clone + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static,
    {
        let mut registry = registry.lock();
        if let Some(query) = registry.get(&key).and_then(WeakQuery::upgrade) {
            return query;
        }

        let query = SwrQuery::activate(
            key.clone(),
            self.cache.clone(),
            fetcher,
            self.options.clone(),
        );
        registry.insert(key, query.downgrade());
        query
    }

    fn refresh_live<T>(registry: &Registry<T>)
    where
        T: Clone + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static,
    {
        registry.lock().retain(|_, weak| match weak.upgrade() {
            Some(query) => {
                query.refresh();
                true
            }
            None => false,
        });
    }

    /// Four decimal places is about 11 m of precision, enough that nearby
    /// lookups share a cache entry without colliding across districts.
    fn query_key(domain: &str, coords: &Coordinates) -> String {
        format!("{}:{:.4}:{:.4}", domain, coords.latitude, coords.longitude)
    }
}
