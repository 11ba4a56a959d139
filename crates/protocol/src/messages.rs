//! Push channel frames and REST snapshot bodies.
//!
//! The push channel carries JSON text frames discriminated by a `type` field:
//!
//! ```json
//! {
//!   "type": "step_update",
//!   "step_id": "build",
//!   "step_name": "Build image",
//!   "status": "running",
//!   "timestamp": "2024-05-01T12:00:00Z"
//! }
//! ```
//!
//! Frames from the server are [`ServerMessage`]s; frames sent by the client
//! are [`ClientFrame`]s. The fallback REST endpoint returns an
//! [`ExecutionSnapshot`], which carries the same execution-level fields as an
//! `execution_update` plus the full step list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use ts_rs::TS;

use crate::execution_models::{ExecutionStatus, StepKind, StepStatus};
use crate::log_models::LogLevel;

/// Discriminant of a server frame, used as the subscription key.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    ExecutionUpdate,
    StepUpdate,
    LogUpdate,
    ToolStatus,
    SystemNotification,
}

impl MessageType {
    /// Wire name of the type, as it appears in the `type` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExecutionUpdate => "execution_update",
            Self::StepUpdate => "step_update",
            Self::LogUpdate => "log_update",
            Self::ToolStatus => "tool_status",
            Self::SystemNotification => "system_notification",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution-level snapshot pushed by the server.
///
/// It is already coherent, so it replaces the execution-level state wholesale.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct ExecutionUpdate {
    pub status: ExecutionStatus,

    #[serde(default)]
    pub total_steps: u32,

    #[serde(default)]
    pub successful_steps: u32,

    #[serde(default)]
    pub failed_steps: u32,

    /// Seconds elapsed since the execution started.
    #[serde(default)]
    pub execution_time: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_name: Option<String>,
}

/// Incremental update for a single step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct StepUpdate {
    pub step_id: String,

    pub step_name: String,

    pub status: StepStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub timestamp: DateTime<Utc>,

    /// Kind of the step; plain step when absent.
    #[serde(default)]
    pub step_type: StepKind,

    /// Parallel group a newly seen step belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_step_id: Option<String>,
}

/// One log line pushed by the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct LogUpdate {
    #[serde(default)]
    pub level: LogLevel,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// A parsed frame received on the push channel.
///
/// `tool_status` and `system_notification` are not interpreted by the core;
/// their body is kept as a JSON object for interested subscribers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ExecutionUpdate(ExecutionUpdate),
    StepUpdate(StepUpdate),
    LogUpdate(LogUpdate),
    ToolStatus(Map<String, Value>),
    SystemNotification(Map<String, Value>),
}

impl ServerMessage {
    /// Parse a text frame.
    ///
    /// Fails on malformed JSON, on a missing or unknown `type`, and on a body
    /// that does not match its declared type.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize the message back into a text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Self::ExecutionUpdate(_) => MessageType::ExecutionUpdate,
            Self::StepUpdate(_) => MessageType::StepUpdate,
            Self::LogUpdate(_) => MessageType::LogUpdate,
            Self::ToolStatus(_) => MessageType::ToolStatus,
            Self::SystemNotification(_) => MessageType::SystemNotification,
        }
    }
}

/// Frames sent from the client to the server.
///
/// All of them are fire-and-forget: their outcome is only observable through
/// later `execution_update` frames.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Authenticate the connection. Sent right after every open.
    Auth { token: String },

    /// Start receiving frames for an execution.
    SubscribeExecution {
        #[serde(rename = "executionId")]
        execution_id: String,
    },

    /// Stop receiving frames for an execution.
    UnsubscribeExecution {
        #[serde(rename = "executionId")]
        execution_id: String,
    },

    /// Ask the server to stop a running execution.
    StopExecution {
        #[serde(rename = "executionId")]
        execution_id: String,
    },

    /// Ask the server to run the execution again.
    RestartExecution {
        #[serde(rename = "executionId")]
        execution_id: String,
    },
}

impl ClientFrame {
    /// Wire name of the frame type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::SubscribeExecution { .. } => "subscribe_execution",
            Self::UnsubscribeExecution { .. } => "unsubscribe_execution",
            Self::StopExecution { .. } => "stop_execution",
            Self::RestartExecution { .. } => "restart_execution",
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// Tokens must never end up in logs.
impl fmt::Debug for ClientFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth { .. } => f.debug_struct("Auth").field("token", &"<redacted>").finish(),
            Self::SubscribeExecution { execution_id }
            | Self::UnsubscribeExecution { execution_id }
            | Self::StopExecution { execution_id }
            | Self::RestartExecution { execution_id } => f
                .debug_struct(self.kind())
                .field("execution_id", execution_id)
                .finish(),
        }
    }
}

/// Step as reported by the fallback state endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct StepSnapshot {
    pub step_id: String,

    pub step_name: String,

    pub status: StepStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default)]
    pub step_type: StepKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StepSnapshot>,

    /// Per-step timestamp; the snapshot timestamp applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Full execution state returned by `GET {api}/executions/{id}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct ExecutionSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,

    pub status: ExecutionStatus,

    #[serde(default)]
    pub total_steps: u32,

    #[serde(default)]
    pub successful_steps: u32,

    #[serde(default)]
    pub failed_steps: u32,

    #[serde(default)]
    pub execution_time: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_name: Option<String>,

    /// Server time the snapshot was taken; the fetch time applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub steps: Vec<StepSnapshot>,

    /// Complete log text, when the endpoint embeds it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
}
