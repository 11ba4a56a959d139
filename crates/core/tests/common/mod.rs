//! Common test utilities and helpers for integration tests.
//!
//! This module provides shared functionality across all integration tests including:
//! - An in-memory push server and connector
//! - A scripted state fetcher
//! - Test fixtures (frames, snapshots, configs)
//! - Event helpers and custom assertions

pub mod assertions;
pub mod fixtures;
pub mod mock_transport;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use mock_transport::*;
