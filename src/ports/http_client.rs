use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Custom error type for upstream round trips
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Dial, reset or read failure while talking to the upstream
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The forwarded request could not be constructed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for upstream round trips
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for the upstream round trip.
///
/// The forwarder only ever needs a single operation; retries, caching and
/// circuit breaking are deliberately not part of this contract.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request to an upstream service and return its response.
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}
