//! Transport seam for the response cache.
//!
//! The cache layer never talks to reqwest directly; it sees requests and
//! responses through [`Transport`], so tests can substitute an in-process
//! fake and production wires in [`HttpTransport`].

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use url::Url;

use stratus_core::ErrorKind;

/// An outgoing request as seen by the interception layer.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl GatewayRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
        }
    }

    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
        }
    }

    /// Set a header, silently skipping values that aren't valid header text.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }
}

/// A buffered response. Bodies are small JSON/asset payloads, so full
/// buffering keeps cached copies trivially cloneable.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl GatewayResponse {
    pub fn new(status: StatusCode, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Build a JSON response with the right content type.
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status,
            headers,
            body: value.to_string().into_bytes(),
        }
    }

    /// Parse the body as JSON.
    pub fn body_json(&self) -> Result<serde_json::Value, ErrorKind> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ErrorKind::Unknown(format!("invalid JSON body: {}", e)))
    }
}

/// Executes requests against the real network (or a test double).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &GatewayRequest) -> Result<GatewayResponse, ErrorKind>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, ErrorKind> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(ErrorKind::from)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &GatewayRequest) -> Result<GatewayResponse, ErrorKind> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(ErrorKind::from)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(ErrorKind::from)?.to_vec();

        Ok(GatewayResponse {
            status,
            headers,
            body,
        })
    }
}
