//! Notifications from a session to its consumer, and commands back.

use pw_protocol::{ConnectionStatus, ExecutionState, StepState};
use serde_json::{Map, Value};

/// Change notification emitted by a monitoring session.
///
/// Events only say what changed; the current state is read through the
/// session handle. Every variant names the execution it belongs to so one
/// receiver can serve many sessions.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    ConnectionChanged {
        execution_id: String,
        status: ConnectionStatus,
    },

    ExecutionChanged {
        execution_id: String,
        execution: ExecutionState,
        progress: u8,
    },

    StepsChanged {
        execution_id: String,
        steps: Vec<StepState>,
    },

    /// `count` entries were appended to the log buffer.
    LogsAppended { execution_id: String, count: usize },

    LogsCleared { execution_id: String },

    ToolStatus {
        execution_id: String,
        body: Map<String, Value>,
    },

    SystemNotification {
        execution_id: String,
        body: Map<String, Value>,
    },

    /// A control frame went out on the push channel.
    CommandSent {
        execution_id: String,
        kind: &'static str,
    },

    /// A control frame could not be sent, typically because the channel is
    /// not connected. It is not queued.
    CommandDropped {
        execution_id: String,
        kind: &'static str,
        reason: String,
    },

    /// The session stopped; no further events follow for this execution.
    SessionEnded { execution_id: String },
}

impl MonitorEvent {
    pub fn execution_id(&self) -> &str {
        match self {
            Self::ConnectionChanged { execution_id, .. }
            | Self::ExecutionChanged { execution_id, .. }
            | Self::StepsChanged { execution_id, .. }
            | Self::LogsAppended { execution_id, .. }
            | Self::LogsCleared { execution_id }
            | Self::ToolStatus { execution_id, .. }
            | Self::SystemNotification { execution_id, .. }
            | Self::CommandSent { execution_id, .. }
            | Self::CommandDropped { execution_id, .. }
            | Self::SessionEnded { execution_id } => execution_id,
        }
    }
}

/// Requests from the consumer to the session actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    StopExecution,
    RestartExecution,
    ClearLogs,
    /// Leave the failed state and reconnect from a fresh attempt count.
    Retry,
    /// Fetch the full state now.
    Refresh,
}
