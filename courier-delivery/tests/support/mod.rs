//! Test support utilities for dispatch tests against a local endpoint

pub mod mock_server;

pub use mock_server::MockSesServer;
