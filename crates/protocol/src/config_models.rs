//! Monitor configuration models for `.pipewatch/config.toml`.
//!
//! This module defines the settings that control where a monitoring session
//! connects and how aggressively it reconnects and polls.

use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;
use ts_rs::TS;

/// Represents the settings from `.pipewatch/config.toml`.
///
/// Every field has a default, so an empty or missing file is valid.
///
/// # Example
///
/// ```toml
/// # .pipewatch/config.toml
/// ws-url = "wss://ci.example.com/ws/executions"
/// api-base-url = "https://ci.example.com/api/pipelines"
/// max-reconnect-attempts = 8
/// log-capacity = 2000
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "kebab-case", default)]
pub struct MonitorConfig {
    /// Push channel endpoint. The execution id is appended as a path segment.
    pub ws_url: String,

    /// Base URL of the REST API serving execution snapshots and full logs.
    pub api_base_url: String,

    /// Token sent in the `auth` frame and as a bearer token on REST calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Delay before the first reconnect attempt; doubles per attempt.
    pub reconnect_base_delay_ms: u64,

    /// Upper bound for a single reconnect delay.
    pub reconnect_max_delay_ms: u64,

    /// Reconnect attempts before the connection is declared failed.
    pub max_reconnect_attempts: u32,

    /// Time allowed for the transport to report open.
    pub connect_timeout_ms: u64,

    /// Polling interval while the push channel is not connected.
    pub fallback_poll_interval_ms: u64,

    /// Polling interval while the execution is starting or running.
    pub running_poll_interval_ms: u64,

    /// Maximum number of log entries kept in memory.
    pub log_capacity: usize,

    /// Distance from the bottom, in view units, that still counts as "at the bottom".
    pub follow_tolerance: f64,

    /// Quiet time after a scroll before auto-follow re-arms on its own.
    pub follow_settle_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8000/ws/executions".to_string(),
            api_base_url: "http://localhost:8000/api/pipelines".to_string(),
            token: None,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 5,
            connect_timeout_ms: 10_000,
            fallback_poll_interval_ms: 5_000,
            running_poll_interval_ms: 2_000,
            log_capacity: 1_000,
            follow_tolerance: 30.0,
            follow_settle_ms: 1_200,
        }
    }
}

impl MonitorConfig {
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn fallback_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_poll_interval_ms)
    }

    pub fn running_poll_interval(&self) -> Duration {
        Duration::from_millis(self.running_poll_interval_ms)
    }

    pub fn follow_settle(&self) -> Duration {
        Duration::from_millis(self.follow_settle_ms)
    }
}
