pub mod error;
pub mod logging;
pub mod message;

pub use message::{Envelope, Message};
pub use tracing;
