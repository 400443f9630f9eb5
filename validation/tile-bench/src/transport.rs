//! The network capability pooled by the benchmark: send one request, get a response or an error.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use std::time::Duration;
use thiserror::Error;

/// A single GET (or other method) against the target server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
}

impl RequestDescriptor {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
        }
    }
}

/// A fully drained response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Transport-level failure of one attempt; these are the only errors worth retrying.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Connection failed: {0}")]
    Connection(String),
}

/// A reusable client handle held in the pool.
///
/// Implementations must not carry per-call state between borrowers.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send the request and read the whole body.
    async fn send(&self, request: &RequestDescriptor) -> Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport with a fixed per-call timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, max_idle_per_host: usize) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(max_idle_per_host)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .request(request.method.clone(), &request.url)
            .send()
            .await?;
        let status = response.status().as_u16();

        // Drain the body so the connection goes back to reqwest's idle pool
        let body = response.bytes().await?;

        Ok(TransportResponse { status, body })
    }
}
