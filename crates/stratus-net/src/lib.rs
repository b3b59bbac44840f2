//! Network resilience primitives for Stratus: a generic retry executor and
//! the transport-level response cache (the interception layer).

pub mod gateway;
pub mod response_cache;
pub mod retry;

pub use gateway::{GatewayRequest, GatewayResponse, HttpTransport, Transport};
pub use response_cache::{CachePolicy, CachingGateway, CACHED_AT_HEADER};
pub use retry::{fetch_with_retry, retry, retry_notify, RetryPolicy, REQUEST_TIMEOUT};
