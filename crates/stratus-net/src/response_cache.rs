//! Transport-level response cache.
//!
//! A coarser second cache beneath the application-level TTL cache, keeping
//! the app minimally functional offline even when the query layer is
//! bypassed. The two layers share no keys and no eviction policy.
//!
//! Policy by request class:
//! - same-origin static assets: cache-first, stored on a 200 miss;
//! - recognized API hosts: network-first with a bounded FIFO store and a
//!   freshness horizon on offline fallback;
//! - everything else (non-GET, unrecognized hosts): passed straight through.

use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL};
use reqwest::{Method, StatusCode};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use stratus_core::{ErrorKind, NetworkConfig};

use crate::gateway::{GatewayRequest, GatewayResponse, Transport};

/// Header injected into stored API responses, carrying the storage time in
/// epoch milliseconds.
pub const CACHED_AT_HEADER: &str = "x-cached-at";

/// How requests are routed through the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestClass {
    StaticAsset,
    ApiHost,
    Bypass,
}

/// Classification and bounds for the interception layer.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    /// Origin whose GETs are treated as static application assets.
    pub app_origin: Option<Url>,
    /// Hosts treated as weather/geolocation API hosts.
    pub api_hosts: Vec<String>,
    /// Bound on the API response store.
    pub max_api_entries: usize,
    /// Horizon beyond which a stored API response is no longer served.
    pub fallback_ttl: Duration,
}

impl CachePolicy {
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            app_origin: None,
            api_hosts: config.api_hosts.clone(),
            max_api_entries: config.max_cached_responses,
            fallback_ttl: Duration::from_secs(config.offline_fallback_secs),
        }
    }

    fn classify(&self, request: &GatewayRequest) -> RequestClass {
        // Only idempotent reads participate; mutations are never intercepted.
        if request.method != Method::GET {
            return RequestClass::Bypass;
        }

        if let Some(origin) = &self.app_origin {
            if request.url.scheme() == origin.scheme()
                && request.url.host_str() == origin.host_str()
                && request.url.port_or_known_default() == origin.port_or_known_default()
            {
                return RequestClass::StaticAsset;
            }
        }

        if let Some(host) = request.url.host_str() {
            if self.api_hosts.iter().any(|h| h == host) {
                return RequestClass::ApiHost;
            }
        }

        RequestClass::Bypass
    }
}

struct CachedResponse {
    response: GatewayResponse,
    cached_at: Instant,
}

/// URL-keyed store with optional FIFO bound (oldest-inserted evicted first).
struct ResponseStore {
    entries: HashMap<String, CachedResponse>,
    order: VecDeque<String>,
    cap: Option<usize>,
}

impl ResponseStore {
    fn new(cap: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    fn insert(&mut self, key: String, response: GatewayResponse) {
        if self.entries.remove(&key).is_some() {
            self.order.retain(|k| k != &key);
        }
        self.entries.insert(
            key.clone(),
            CachedResponse {
                response,
                cached_at: Instant::now(),
            },
        );
        self.order.push_back(key);

        if let Some(cap) = self.cap {
            while self.entries.len() > cap {
                match self.order.pop_front() {
                    Some(oldest) => {
                        tracing::debug!(url = %oldest, "evicting oldest cached response");
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
    }

    fn get(&self, key: &str) -> Option<&CachedResponse> {
        self.entries.get(key)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The interception layer: routes every outgoing request through the cache
/// policy before it reaches the transport.
pub struct CachingGateway<T: Transport> {
    transport: T,
    policy: CachePolicy,
    assets: Mutex<ResponseStore>,
    api: Mutex<ResponseStore>,
}

impl<T: Transport> CachingGateway<T> {
    pub fn new(transport: T, policy: CachePolicy) -> Self {
        let api = Mutex::new(ResponseStore::new(Some(policy.max_api_entries)));
        Self {
            transport,
            policy,
            assets: Mutex::new(ResponseStore::new(None)),
            api,
        }
    }

    /// Fetch a response, applying the cache policy for the request's class.
    pub async fn fetch(&self, request: GatewayRequest) -> Result<GatewayResponse, ErrorKind> {
        match self.policy.classify(&request) {
            RequestClass::Bypass => self.transport.execute(&request).await,
            RequestClass::StaticAsset => self.fetch_asset(request).await,
            RequestClass::ApiHost => self.fetch_api(request).await,
        }
    }

    /// Number of stored API responses (for diagnostics).
    pub fn cached_api_responses(&self) -> usize {
        self.api.lock().len()
    }

    async fn fetch_asset(&self, request: GatewayRequest) -> Result<GatewayResponse, ErrorKind> {
        let key = request.url.to_string();

        if let Some(cached) = self.assets.lock().get(&key) {
            tracing::trace!(url = %key, "asset served from cache");
            return Ok(cached.response.clone());
        }

        let response = self.transport.execute(&request).await?;
        if response.status == StatusCode::OK {
            self.assets.lock().insert(key, response.clone());
        }
        Ok(response)
    }

    async fn fetch_api(&self, request: GatewayRequest) -> Result<GatewayResponse, ErrorKind> {
        let key = request.url.to_string();

        // Bypass any intermediary HTTP cache; freshness is our job here.
        let request = request.with_header(CACHE_CONTROL, "no-store");

        match self.transport.execute(&request).await {
            Ok(response) if response.status.is_success() => {
                let mut stored = response.clone();
                inject_cached_at(&mut stored.headers);
                self.api.lock().insert(key, stored);
                Ok(response)
            }
            // A non-2xx reply is still a reply; it is returned live and
            // never stored.
            Ok(response) => Ok(response),
            Err(err) => {
                let store = self.api.lock();
                match store.get(&key) {
                    Some(cached) if cached.cached_at.elapsed() < self.policy.fallback_ttl => {
                        tracing::info!(url = %key, "network failed, serving cached API response");
                        Ok(cached.response.clone())
                    }
                    _ => {
                        tracing::warn!(url = %key, "network failed with no usable cached copy: {}", err);
                        Ok(offline_response())
                    }
                }
            }
        }
    }
}

fn inject_cached_at(headers: &mut HeaderMap) {
    let now_ms = chrono::Utc::now().timestamp_millis();
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(CACHED_AT_HEADER.as_bytes()),
        HeaderValue::from_str(&now_ms.to_string()),
    ) {
        headers.insert(name, value);
    }
}

/// Synthetic 503 returned when the network is down and no sufficiently
/// fresh copy exists. Callers treat it like any other failed fetch.
fn offline_response() -> GatewayResponse {
    GatewayResponse::json(
        StatusCode::SERVICE_UNAVAILABLE,
        &serde_json::json!({
            "error": "offline",
            "message": "You appear to be offline and no recent data is available.",
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-process transport: serves a canned 200 JSON body per URL path, or
    /// a connection error when `offline` is set.
    struct FakeTransport {
        offline: AtomicBool,
        calls: AtomicUsize,
    }

    impl FakeTransport {
        fn new() -> Self {
            Self {
                offline: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }

        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn execute(&self, request: &GatewayRequest) -> Result<GatewayResponse, ErrorKind> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(ErrorKind::Network("connection refused".to_string()));
            }
            Ok(GatewayResponse::json(
                StatusCode::OK,
                &serde_json::json!({ "path": request.url.path() }),
            ))
        }
    }

    fn policy() -> CachePolicy {
        CachePolicy {
            app_origin: Some(Url::parse("https://app.example").unwrap()),
            api_hosts: vec!["api.openweathermap.org".to_string()],
            max_api_entries: 50,
            fallback_ttl: Duration::from_secs(600),
        }
    }

    fn api_request(path: &str) -> GatewayRequest {
        let url = Url::parse(&format!("https://api.openweathermap.org{}", path)).unwrap();
        GatewayRequest::get(url)
    }

    #[tokio::test(start_paused = true)]
    async fn test_api_fallback_within_horizon() {
        let gateway = CachingGateway::new(FakeTransport::new(), policy());

        let live = gateway.fetch(api_request("/data")).await.unwrap();
        assert_eq!(live.status, StatusCode::OK);

        gateway.transport.set_offline(true);
        tokio::time::advance(Duration::from_secs(5 * 60)).await;

        let fallback = gateway.fetch(api_request("/data")).await.unwrap();
        assert_eq!(fallback.status, StatusCode::OK);
        assert_eq!(fallback.body_json().unwrap()["path"], "/data");
        // The stored copy carries the synthetic timestamp header.
        assert!(fallback.headers.contains_key(CACHED_AT_HEADER));
    }

    #[tokio::test(start_paused = true)]
    async fn test_api_fallback_beyond_horizon_is_503() {
        let gateway = CachingGateway::new(FakeTransport::new(), policy());
        gateway.fetch(api_request("/data")).await.unwrap();

        gateway.transport.set_offline(true);
        tokio::time::advance(Duration::from_secs(11 * 60)).await;

        let response = gateway.fetch(api_request("/data")).await.unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.body_json().unwrap()["error"], "offline");
    }

    #[tokio::test]
    async fn test_api_failure_with_empty_cache_is_503() {
        let gateway = CachingGateway::new(FakeTransport::new(), policy());
        gateway.transport.set_offline(true);

        let response = gateway.fetch(api_request("/data")).await.unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_api_store_evicts_oldest_beyond_50() {
        let gateway = CachingGateway::new(FakeTransport::new(), policy());

        for i in 0..51 {
            gateway
                .fetch(api_request(&format!("/data/{}", i)))
                .await
                .unwrap();
        }
        assert_eq!(gateway.cached_api_responses(), 50);

        gateway.transport.set_offline(true);

        // The single oldest-inserted entry is gone...
        let evicted = gateway.fetch(api_request("/data/0")).await.unwrap();
        assert_eq!(evicted.status, StatusCode::SERVICE_UNAVAILABLE);

        // ...while the second-oldest still falls back.
        let kept = gateway.fetch(api_request("/data/1")).await.unwrap();
        assert_eq!(kept.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_static_assets_are_cache_first() {
        let gateway = CachingGateway::new(FakeTransport::new(), policy());
        let url = Url::parse("https://app.example/app.js").unwrap();

        gateway.fetch(GatewayRequest::get(url.clone())).await.unwrap();
        assert_eq!(gateway.transport.calls(), 1);

        // Second fetch is served from cache, even with the network down.
        gateway.transport.set_offline(true);
        let cached = gateway.fetch(GatewayRequest::get(url)).await.unwrap();
        assert_eq!(cached.status, StatusCode::OK);
        assert_eq!(gateway.transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_non_get_requests_pass_through() {
        let gateway = CachingGateway::new(FakeTransport::new(), policy());
        let url = Url::parse("https://api.openweathermap.org/data").unwrap();

        gateway
            .fetch(GatewayRequest::new(Method::POST, url.clone()))
            .await
            .unwrap();
        assert_eq!(gateway.cached_api_responses(), 0);

        gateway.transport.set_offline(true);
        let response = gateway
            .fetch(GatewayRequest::new(Method::POST, url))
            .await;
        // No interception: the transport error propagates untouched.
        assert!(matches!(response, Err(ErrorKind::Network(_))));
    }

    #[tokio::test]
    async fn test_unrecognized_hosts_pass_through() {
        let gateway = CachingGateway::new(FakeTransport::new(), policy());
        let url = Url::parse("https://elsewhere.example/thing").unwrap();

        gateway.fetch(GatewayRequest::get(url)).await.unwrap();
        assert_eq!(gateway.cached_api_responses(), 0);
        assert_eq!(gateway.assets.lock().len(), 0);
    }
}
