//! Error types for the courier-common crate.

use thiserror::Error;

/// Errors raised while building a [`Message`](crate::Message) or its
/// [`Envelope`](crate::Envelope).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageParseError {
    /// An envelope address did not parse as exactly one mailbox.
    #[error("Invalid {field} address: {reason}")]
    InvalidAddress { field: &'static str, reason: String },

    /// No blank line separating the header block from the body.
    #[error("Could not find end of headers")]
    EndOfHeadersNotFound,

    /// The header block is not valid UTF-8.
    #[error("Invalid UTF-8 in headers: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}
