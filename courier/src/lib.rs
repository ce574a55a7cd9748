//! Batch sending of pre-formatted mail through Amazon SES.
//!
//! The binary loads a [`Courier`] configuration, reads raw RFC 5322 files and
//! hands one message per file and recipient to a
//! [`Dispatcher`](courier_delivery::Dispatcher).

pub mod batch;
pub mod config;

pub use batch::{Batch, Report};
pub use config::{Courier, find_config_file};
