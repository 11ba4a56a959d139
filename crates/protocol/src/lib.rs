//! # pw-protocol
//!
//! Wire frames and data models shared by every pipewatch crate.
//!
//! This crate defines:
//! - The JSON frames exchanged over the push channel (both directions)
//! - The REST snapshot returned by the fallback state endpoint
//! - The execution, step and log models the monitoring core maintains
//! - The runtime configuration read from `.pipewatch/config.toml`
//!
//! ## Modules
//!
//! - [`config_models`]: Monitor configuration from config.toml
//! - [`connection_models`]: Push connection state as seen by consumers
//! - [`execution_models`]: Execution and step state
//! - [`log_models`]: Log entries and levels
//! - [`messages`]: Push frames, outbound control frames and REST snapshots
//!
//! ## Design Principles
//!
//! - Minimal dependencies: serde, chrono, uuid and ts-rs
//! - TypeScript generation: data types derive `TS` for the browser console
//! - Independent compilation: no dependencies on other pipewatch crates

pub mod config_models;
pub mod connection_models;
pub mod execution_models;
pub mod log_models;
pub mod messages;

// Re-export all public types for convenience
pub use config_models::*;
pub use connection_models::*;
pub use execution_models::*;
pub use log_models::*;
pub use messages::*;
