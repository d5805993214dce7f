//! The network seam.
//!
//! The executor never talks to a socket itself; it hands a fully-built request
//! to a [`Dispatch`] implementation and interprets whatever comes back. Any
//! error from the transport is a retry-candidate failure. Implementations must
//! not retry or sleep on their own — that is the executor's job.

use async_trait::async_trait;
use bytes::Bytes;

/// An outgoing request with a cheaply-cloneable body.
pub type Request = http::Request<Bytes>;

/// A fully-buffered response.
pub type Response = http::Response<Bytes>;

/// Failure to deliver a request or receive a response.
#[derive(Debug, thiserror::Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), source: None }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { message: message.into(), source: Some(Box::new(source)) }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The sole network I/O seam.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Deliver `request` and return the service's response.
    async fn dispatch(&self, request: Request) -> Result<Response, TransportError>;
}
