//! Executing a single request/response cycle against the API.
//!
//! A [`Connect`] implementation produces transport handles. The sequential
//! strategy keeps one handle for as long as it keeps succeeding; the call pool
//! shares one handle between all of its in-flight transfers.

mod http;
mod log;

use async_trait::async_trait;
use thiserror::Error;

pub use http::{HttpConnector, HttpTransport, TRANSFER_TIMEOUT};
pub use log::TransferLog;

use crate::{error::DeliveryError, request::SignedRequest};

/// What came back from the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl TransferResponse {
    /// Only a 200 counts as accepted.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Transport-level failures: no HTTP response was received.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The 30 second transfer timeout elapsed.
    #[error("Transfer timed out: {0}")]
    Timeout(String),

    /// Connecting (DNS, TCP or TLS) failed.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Any other HTTP-level failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The task running the transfer ended without producing a result.
    #[error("Transfer aborted: {0}")]
    Aborted(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else {
            Self::Http(error.to_string())
        }
    }
}

/// A handle able to run one request at a time, possibly reusing connections
/// between calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run one request to completion.
    ///
    /// # Errors
    ///
    /// A [`TransportError`] when no response was received. Non-200 statuses
    /// are returned as responses; the caller decides what they mean.
    async fn execute(&self, request: &SignedRequest) -> Result<TransferResponse, TransportError>;
}

/// Factory for transport handles.
pub trait Connect: Send + Sync {
    type Handle: Transport + 'static;

    /// Create a fresh handle.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::TransportInit`] if the handle cannot be built.
    fn connect(&self) -> Result<Self::Handle, DeliveryError>;
}
