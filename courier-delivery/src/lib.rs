//! Outbound dispatch of raw messages to the Amazon SES `SendRawEmail` API.
//!
//! This crate provides:
//! - Signed request construction for `SendRawEmail`
//! - An HTTP transport with optional verbose transfer logging
//! - A bounded FIFO pool of concurrent transfers with drain-time accounting
//! - A [`Dispatcher`] choosing between sequential and concurrent delivery

mod accounting;
mod config;
mod dispatcher;
mod error;
pub mod pool;
pub mod request;
pub mod transport;

// Re-export accounting types
pub use accounting::{Totals, TransferRecord};
// Re-export configuration
pub use config::{DeliveryConfig, DispatchMode, MAX_CONCURRENCY, MIN_CONCURRENCY};
// Re-export the dispatcher
pub use dispatcher::{Acceptance, Dispatcher};
// Re-export error types
pub use error::{ConfigError, DeliveryError};
pub use pool::CallPool;
pub use request::{Credentials, SignedRequest};
pub use transport::{Connect, HttpConnector, HttpTransport, TransferResponse, Transport, TransportError};
