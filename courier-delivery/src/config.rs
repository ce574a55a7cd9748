//! Delivery configuration.
//!
//! Read once at start-up (from the `ses` section of the courier config file)
//! and never changed afterwards.

use std::path::PathBuf;

use courier_common::tracing;
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, request::Credentials};

/// Smallest number of calls the pool may keep in flight.
pub const MIN_CONCURRENCY: usize = 2;

/// Largest number of calls the pool may keep in flight.
pub const MAX_CONCURRENCY: usize = 32;

const fn default_concurrency_limit() -> usize {
    4
}

fn default_endpoint() -> String {
    "https://email.us-east-1.amazonaws.com/".to_string()
}

fn default_log_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_user_agent() -> String {
    concat!("courier/", env!("CARGO_PKG_VERSION")).to_string()
}

/// How messages are handed to the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchMode {
    /// One request at a time over a reused connection; the result is known
    /// when `send` returns.
    #[default]
    Sequential,

    /// Up to `concurrency_limit` requests in flight; results are only
    /// reflected in the totals reported at shutdown.
    Concurrent,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// AWS access key ID
    #[serde(default)]
    pub access_key: String,

    /// AWS secret access key
    #[serde(default)]
    pub secret_key: String,

    /// SES endpoint, the `Host` header is derived from it
    ///
    /// Default: `https://email.us-east-1.amazonaws.com/`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub mode: DispatchMode,

    /// Maximum number of concurrent calls, clamped to 2..=32
    ///
    /// Default: 4
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Write a rendering of every concurrent transfer to
    /// `<log_dir>/transfer_sequence.log` when the pool drains
    #[serde(default)]
    pub transfer_log: bool,

    /// Append every request and response to `<log_dir>/transport_<date>.log`
    ///
    /// Debugging only, the log contains signed headers.
    #[serde(default)]
    pub verbose: bool,

    /// Directory for the optional log files
    ///
    /// Default: the OS temporary directory
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            secret_key: String::new(),
            endpoint: default_endpoint(),
            mode: DispatchMode::default(),
            concurrency_limit: default_concurrency_limit(),
            transfer_log: false,
            verbose: false,
            log_dir: default_log_dir(),
            user_agent: default_user_agent(),
        }
    }
}

impl std::fmt::Debug for DeliveryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("mode", &self.mode)
            .field("concurrency_limit", &self.concurrency_limit)
            .field("transfer_log", &self.transfer_log)
            .field("verbose", &self.verbose)
            .field("log_dir", &self.log_dir)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl DeliveryConfig {
    /// Validate the credentials and endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if a key is empty or the endpoint is not an absolute
    /// http(s) URL with a host.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        Credentials::new(&self.access_key, &self.secret_key, &self.endpoint)
    }

    /// The concurrency limit, clamped into `MIN_CONCURRENCY..=MAX_CONCURRENCY`.
    pub fn bounded_concurrency_limit(&self) -> usize {
        let bounded = self
            .concurrency_limit
            .clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);

        if bounded != self.concurrency_limit {
            tracing::warn!(
                configured = self.concurrency_limit,
                used = bounded,
                "Concurrency limit out of range ({MIN_CONCURRENCY}-{MAX_CONCURRENCY})"
            );
        }

        bounded
    }

    /// Where the transfer sequence is written on drain, if enabled.
    pub fn sequence_log_path(&self) -> Option<PathBuf> {
        self.transfer_log
            .then(|| self.log_dir.join("transfer_sequence.log"))
    }
}
