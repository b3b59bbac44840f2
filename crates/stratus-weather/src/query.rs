//! Stale-while-revalidate query engine.
//!
//! One `SwrQuery` per cache key. On activation the persistent cache is
//! consulted synchronously: a hit is surfaced immediately (no loading state)
//! and refreshed silently in the background; a miss goes through a foreground
//! fetch with retries. State is observable through a `watch` channel, so the
//! UI only ever sees read-only snapshots.
//!
//! Per-key ordering: fetches for one key are serialized by an in-flight gate,
//! so a newer surfaced result is never overwritten by an older one. Cross-key
//! ordering is not coordinated. Queries refresh on a fixed interval while
//! alive and on explicit online notification; regaining focus never triggers
//! a refetch.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use stratus_core::ErrorKind;
use stratus_store::TtlCache;

use crate::types::QueryState;

/// Boxed fetch future produced by a query's fetcher.
pub type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<T, ErrorKind>> + Send>>;

type Fetcher<T> = Arc<dyn Fn() -> FetchFuture<T> + Send + Sync>;

/// Tuning knobs for a query.
#[derive(Debug, Clone)]
pub struct SwrOptions {
    /// TTL written through to the persistent cache.
    pub ttl: Duration,
    /// Fixed background refresh interval while the query is alive.
    pub refresh_interval: Duration,
    /// Window within which concurrent work for one key collapses into a
    /// single in-flight fetch.
    pub dedup_window: Duration,
    /// Foreground fetch retries before surfacing an error.
    pub retry_attempts: u32,
    /// Spacing between those retries.
    pub retry_delay: Duration,
}

impl Default for SwrOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            refresh_interval: Duration::from_secs(300),
            dedup_window: Duration::from_secs(2),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

struct FetchGate {
    in_flight: bool,
    last_started: Option<Instant>,
}

struct QueryInner<T> {
    key: String,
    cache: Option<TtlCache>,
    fetcher: Option<Fetcher<T>>,
    options: SwrOptions,
    tx: watch::Sender<QueryState<T>>,
    gate: Mutex<FetchGate>,
}

/// A subscribable stale-while-revalidate query for one cache key.
///
/// Clones share state; the query stays live (interval refresh included)
/// while any clone exists.
pub struct SwrQuery<T> {
    inner: Arc<QueryInner<T>>,
}

impl<T> Clone for SwrQuery<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Non-owning handle to a query. Holders (the registry) observe liveness
/// without extending it, so a query's tasks die with its last real consumer.
pub(crate) struct WeakQuery<T> {
    inner: std::sync::Weak<QueryInner<T>>,
}

impl<T> WeakQuery<T> {
    pub(crate) fn upgrade(&self) -> Option<SwrQuery<T>> {
        self.inner.upgrade().map(|inner| SwrQuery { inner })
    }
}

impl<T> SwrQuery<T> {
    pub(crate) fn downgrade(&self) -> WeakQuery<T> {
        WeakQuery {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<T> SwrQuery<T>
where
    T: Clone + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Activate a query: consult the cache, surface what it has, and start
    /// fetching and interval-refreshing.
    pub(crate) fn activate(
        key: String,
        cache: TtlCache,
        fetcher: Fetcher<T>,
        options: SwrOptions,
    ) -> Self {
        let initial = match cache.get::<T>(&key) {
            Some(data) => {
                tracing::debug!(key = %key, "query activated on cached data");
                QueryState::ready(data)
            }
            None => QueryState::loading(),
        };

        let (tx, _) = watch::channel(initial);
        let query = Self {
            inner: Arc::new(QueryInner {
                key,
                cache: Some(cache),
                fetcher: Some(fetcher),
                options,
                tx,
                gate: Mutex::new(FetchGate {
                    in_flight: false,
                    last_started: None,
                }),
            }),
        };

        // Cache hit or miss, a fetch starts right away; on a hit it is a
        // silent revalidation because data is already surfaced.
        query.spawn_fetch();
        query.spawn_interval();
        query
    }

    /// A query that stays idle forever (null coordinates).
    pub(crate) fn disabled() -> Self {
        let (tx, _) = watch::channel(QueryState::idle());
        Self {
            inner: Arc::new(QueryInner {
                key: String::new(),
                cache: None,
                fetcher: None,
                options: SwrOptions::default(),
                tx,
                gate: Mutex::new(FetchGate {
                    in_flight: false,
                    last_started: None,
                }),
            }),
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> QueryState<T> {
        self.inner.tx.borrow().clone()
    }

    /// Subscribe to state changes. The receiver's initial value is the
    /// current state.
    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.inner.tx.subscribe()
    }

    /// Force a refresh, subject to deduplication.
    pub fn refresh(&self) {
        self.spawn_fetch();
    }

    /// Imperative escape hatch: inject a value directly into the surfaced
    /// state (and write it through to the cache), or force a refresh when
    /// called with `None`.
    pub fn mutate(&self, value: Option<T>) {
        if self.inner.fetcher.is_none() {
            return;
        }
        match value {
            Some(data) => {
                if let Some(cache) = &self.inner.cache {
                    cache.set_with_ttl(&self.inner.key, &data, self.inner.options.ttl);
                }
                self.inner.tx.send_replace(QueryState::ready(data));
            }
            None => self.refresh(),
        }
    }

    fn spawn_fetch(&self) {
        let Some(fetcher) = self.inner.fetcher.clone() else {
            return;
        };

        {
            let mut gate = self.inner.gate.lock();
            let now = Instant::now();
            if gate.in_flight {
                return;
            }
            if let Some(last) = gate.last_started {
                if now.duration_since(last) < self.inner.options.dedup_window {
                    tracing::trace!(key = %self.inner.key, "fetch deduplicated");
                    return;
                }
            }
            gate.in_flight = true;
            gate.last_started = Some(now);
        }

        // Foreground only when there is nothing to show yet.
        if self.inner.tx.borrow().data.is_none() {
            self.inner.tx.send_replace(QueryState::loading());
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let result = run_with_retries(&fetcher, &inner.options).await;
            inner.gate.lock().in_flight = false;

            match result {
                Ok(data) => {
                    if let Some(cache) = &inner.cache {
                        cache.set_with_ttl(&inner.key, &data, inner.options.ttl);
                    }
                    inner.tx.send_replace(QueryState::ready(data));
                }
                Err(err) => {
                    if inner.tx.borrow().data.is_some() {
                        // Stale data beats an error banner; the user already
                        // has something usable.
                        tracing::debug!(
                            key = %inner.key,
                            "background revalidation failed, keeping stale data: {}",
                            err
                        );
                    } else {
                        tracing::warn!(key = %inner.key, "foreground fetch failed: {}", err);
                        inner.tx.send_replace(QueryState::failed(err));
                    }
                }
            }
        });
    }

    fn spawn_interval(&self) {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.options.refresh_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; activation already fetched.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(inner) => SwrQuery { inner }.spawn_fetch(),
                    None => break,
                }
            }
        });
    }
}

async fn run_with_retries<T>(fetcher: &Fetcher<T>, options: &SwrOptions) -> Result<T, ErrorKind> {
    let policy = stratus_net::RetryPolicy {
        max_retries: options.retry_attempts,
        initial_delay: options.retry_delay,
        ..stratus_net::RetryPolicy::default()
    };

    let mut attempt = 0;
    loop {
        match fetcher().await {
            Ok(data) => return Ok(data),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                attempt += 1;
                tracing::debug!("fetch attempt {} failed ({}), retrying in {:?}", attempt, err, delay);
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
