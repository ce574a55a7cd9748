//! Typed error handling for dispatch operations.
//!
//! Nothing here crosses [`Dispatcher::send`](crate::Dispatcher::send): every
//! variant is logged there and reported as a failed send. The variants exist so
//! callers using [`Dispatcher::dispatch`](crate::Dispatcher::dispatch) can tell
//! a rejected message from a broken network or a bad configuration.

use thiserror::Error;

use crate::transport::TransportError;

/// Configuration problems, found when the dispatcher is created.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required configuration field is missing or empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A configuration value is present but unusable.
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },
}

/// Top-level dispatch error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Credentials or endpoint are missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A transport handle could not be created.
    #[error("Unable to create transport handle: {0}")]
    TransportInit(String),

    /// The API answered with something other than 200.
    #[error("SES status {status} for {recipient}: {body}")]
    Rejected {
        status: u16,
        recipient: String,
        body: String,
    },

    /// The request never produced a response (connection, TLS, timeout).
    #[error("Network failure for {recipient}: {source}")]
    Network {
        recipient: String,
        #[source]
        source: TransportError,
    },

    /// A concurrent admission was attempted before the pool was started.
    #[error("Call pool has no transfer manager")]
    PoolNotStarted,
}

impl DeliveryError {
    /// Returns `true` if this error comes from configuration.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns `true` if the remote API answered but refused the message.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Returns `true` if no response was received at all.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// The HTTP status behind this error, if the API answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
