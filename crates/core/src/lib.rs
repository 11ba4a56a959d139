//! # pw-core
//!
//! Live pipeline-execution monitoring for pipewatch.
//!
//! This crate provides:
//! - Configuration loading from the `.pipewatch/` directory
//! - The push channel with per-type subscriptions
//! - Reconnection with capped exponential backoff
//! - Fallback polling of the REST state endpoint
//! - Reconciliation of push frames and poll snapshots
//! - A bounded log buffer with an auto-follow heuristic
//! - Monitoring sessions tying all of the above together
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`channel`]: Push connection, frame parsing and subscriptions
//! - [`reconnect`]: Connection state machine and backoff
//! - [`poller`]: Poll timers and the state fetcher
//! - [`state`]: Reconciler and log buffer
//! - [`session`]: Session actor, handle and manager
//! - [`teardown`]: Process-wide teardown hook

pub mod channel;
pub mod config;
pub mod poller;
pub mod reconnect;
pub mod session;
pub mod state;
pub mod teardown;

pub use session::{
    http_transports, start_monitoring, MonitorEvent, MonitorManager, SessionError, SessionHandle,
    SessionSnapshot,
};
