//! Generic retry with exponential backoff.
//!
//! The executor retries every failure of the wrapped operation and re-raises
//! the last error once retries are exhausted; it never swallows a terminal
//! failure. Callers that want to bail early on permanent errors classify
//! before retrying (see `ErrorKind::is_retryable`).

use std::future::Future;
use std::time::Duration;

use stratus_core::ErrorKind;

/// Default retry configuration
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Per-attempt request timeout for the network-flavored variant.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the initial one
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on the backoff delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            backoff_multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt + 1`, computed from the
    /// pre-increment attempt index so the sequence is canonical:
    /// `initial, initial*mult, initial*mult^2, ...` capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_multiplier).saturating_pow(attempt);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64))
    }
}

/// Run `operation`, retrying failures per `policy`.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_notify(policy, operation, |_, _| {}).await
}

/// Run `operation`, retrying failures per `policy` and invoking `on_retry`
/// with the retry number (starting at 1) before each new attempt.
pub async fn retry_notify<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    operation: F,
    mut on_retry: C,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    C: FnMut(u32, &E),
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("operation succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                if attempt >= policy.max_retries {
                    tracing::warn!(
                        "all {} attempts exhausted: {}",
                        policy.max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = policy.delay_for_attempt(attempt);
                attempt += 1;
                tracing::debug!(
                    "attempt {} failed ({}), retrying in {:?}",
                    attempt,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                on_retry(attempt, &e);
            }
        }
    }
}

/// Network-flavored retry: enforces a fixed 10-second timeout per attempt
/// and treats any non-2xx status as a retryable failure.
pub async fn fetch_with_retry<F, Fut>(
    policy: &RetryPolicy,
    request: F,
) -> Result<reqwest::Response, ErrorKind>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    retry(policy, || async {
        let response = tokio::time::timeout(REQUEST_TIMEOUT, request())
            .await
            .map_err(|_| ErrorKind::Timeout)?
            .map_err(ErrorKind::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ErrorKind::Api {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            });
        }
        Ok(response)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_sequence_is_canonical() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(8000));
        // Capped at max_delay from here on.
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_n_times_then_succeeds() {
        let failures_left = Arc::new(AtomicU32::new(2));
        let notified = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let notified_clone = notified.clone();
        let result = retry_notify(
            &RetryPolicy::default(),
            || {
                let failures_left = failures_left.clone();
                async move {
                    if failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        n.checked_sub(1)
                    })
                    .is_ok()
                    {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            },
            move |attempt, _err: &&str| notified_clone.lock().push(attempt),
        )
        .await;

        assert_eq!(result, Ok(42));
        // Exactly n notifications, strictly increasing from 1.
        assert_eq!(*notified.lock(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_raises_after_max_retries_plus_one_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, 1000, 10_000);

        let start = tokio::time::Instant::now();
        let attempts_clone = attempts.clone();
        let result: Result<(), &str> = retry(&policy, || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("always fails")
            }
        })
        .await;

        assert_eq!(result, Err("always fails"));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        // Total wait: 1000 + 2000 + 4000 ms.
        assert_eq!(start.elapsed(), Duration::from_millis(7000));
    }

    #[tokio::test]
    async fn test_immediate_success_never_notifies() {
        let notified = Arc::new(AtomicU32::new(0));
        let notified_clone = notified.clone();

        let result = retry_notify(
            &RetryPolicy::default(),
            || async { Ok::<_, &str>("fine") },
            move |_, _| {
                notified_clone.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;

        assert_eq!(result, Ok("fine"));
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_with_retry_treats_non_2xx_as_retryable() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/flaky", server.uri());
        // Short real delays; paused time doesn't mix with real sockets.
        let policy = RetryPolicy::new(3, 20, 100);
        let response = fetch_with_retry(&policy, || client.get(&url).send())
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }
}
