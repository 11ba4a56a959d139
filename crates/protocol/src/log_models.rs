//! Log entry models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::messages::LogUpdate;

/// Severity of a log line.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, TS)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

/// A single log line held by the log stream buffer.
///
/// Entries are immutable once created; the id is assigned at creation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct LogEntry {
    #[ts(type = "string")]
    pub id: Uuid,

    pub timestamp: DateTime<Utc>,

    pub level: LogLevel,

    pub message: String,

    /// Step that produced the line, when known.
    pub step_name: Option<String>,

    /// Producer of the line (runner, tool, system, ...).
    pub source: Option<String>,
}

impl LogEntry {
    /// Create an entry stamped with the current time.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
            step_name: None,
            source: None,
        }
    }

    pub fn with_step_name(mut self, step_name: impl Into<String>) -> Self {
        self.step_name = Some(step_name.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl From<LogUpdate> for LogEntry {
    fn from(update: LogUpdate) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: update.timestamp,
            level: update.level,
            message: update.message,
            step_name: update.step_name,
            source: update.source,
        }
    }
}
