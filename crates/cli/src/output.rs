//! Plain-terminal rendering for the headless commands.

use colored::{ColoredString, Colorize};
use pw_protocol::{
    ConnectionState, ConnectionStatus, ExecutionState, ExecutionStatus, LogEntry, LogLevel,
};
use uuid::Uuid;

/// Remembers the last printed entry so each batch only prints new lines.
///
/// The buffer evicts from the front and can be cleared, so the cursor
/// re-synchronises on the entry id rather than on an index.
#[derive(Debug, Default)]
pub struct LogCursor {
    last_printed: Option<Uuid>,
}

impl LogCursor {
    /// Entries of `logs` not printed yet. Marks them as printed.
    pub fn unseen<'a>(&mut self, logs: &'a [LogEntry]) -> &'a [LogEntry] {
        let start = match self.last_printed {
            Some(id) => logs
                .iter()
                .position(|entry| entry.id == id)
                .map_or(0, |index| index + 1),
            None => 0,
        };
        let fresh = &logs[start..];
        if let Some(last) = fresh.last() {
            self.last_printed = Some(last.id);
        }
        fresh
    }

    pub fn reset(&mut self) {
        self.last_printed = None;
    }
}

fn level_label(level: LogLevel) -> ColoredString {
    match level {
        LogLevel::Debug => "DEBUG".dimmed(),
        LogLevel::Info => "INFO ".green(),
        LogLevel::Warning => "WARN ".yellow(),
        LogLevel::Error => "ERROR".red().bold(),
    }
}

/// `12:00:01 INFO  [build] message`
pub fn format_log_line(entry: &LogEntry) -> String {
    let time = entry.timestamp.format("%H:%M:%S").to_string();
    let step = entry
        .step_name
        .as_deref()
        .map(|name| format!(" [{}]", name.cyan()))
        .unwrap_or_default();
    format!("{} {}{} {}", time.dimmed(), level_label(entry.level), step, entry.message)
}

pub fn status_label(status: ExecutionStatus) -> ColoredString {
    let label = format!("{status:?}").to_lowercase();
    let label = label.as_str();
    match status {
        ExecutionStatus::Starting => label.yellow(),
        ExecutionStatus::Running => label.green(),
        ExecutionStatus::Success => label.cyan().bold(),
        ExecutionStatus::Failed => label.red().bold(),
        ExecutionStatus::Cancelled => label.dimmed(),
    }
}

/// `==> deploy (exec-1): running, 40%`
pub fn format_status_line(execution: &ExecutionState, progress: u8) -> String {
    let name = execution.pipeline_name.as_deref().unwrap_or("pipeline");
    format!(
        "{} {} ({}): {}, {progress}%",
        "==>".bold(),
        name.bold(),
        execution.execution_id,
        status_label(execution.status)
    )
}

pub fn format_connection_line(status: &ConnectionStatus) -> String {
    let text = match status.state {
        ConnectionState::Connected => "live updates connected".green(),
        ConnectionState::Connecting => "connecting...".yellow(),
        ConnectionState::Reconnecting => {
            format!("reconnecting (attempt {}), polling meanwhile", status.attempt)
                .as_str()
                .yellow()
        }
        ConnectionState::Failed => "live updates unavailable, polling only".red(),
        ConnectionState::Disconnected => "disconnected".dimmed(),
    };
    match &status.last_error {
        Some(error) if status.state != ConnectionState::Connected => {
            format!("{} {text}: {error}", "--".dimmed())
        }
        _ => format!("{} {text}", "--".dimmed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() {
        colored::control::set_override(false);
    }

    fn entries(messages: &[&str]) -> Vec<LogEntry> {
        messages
            .iter()
            .map(|message| LogEntry::new(LogLevel::Info, *message))
            .collect()
    }

    fn messages(logs: &[LogEntry]) -> Vec<&str> {
        logs.iter().map(|entry| entry.message.as_str()).collect()
    }

    #[test]
    fn test_cursor_prints_each_entry_once() {
        let mut logs = entries(&["a", "b"]);
        let mut cursor = LogCursor::default();

        assert_eq!(messages(cursor.unseen(&logs)), vec!["a", "b"]);
        assert!(cursor.unseen(&logs).is_empty());

        logs.extend(entries(&["c"]));
        assert_eq!(messages(cursor.unseen(&logs)), vec!["c"]);
    }

    #[test]
    fn test_cursor_after_eviction_and_clear() {
        let logs = entries(&["a", "b", "c"]);
        let mut cursor = LogCursor::default();
        cursor.unseen(&logs[..2]);

        // "a" evicted, "b" still present
        assert_eq!(messages(cursor.unseen(&logs[1..])), vec!["c"]);

        cursor.reset();
        let fresh = entries(&["x"]);
        assert_eq!(messages(cursor.unseen(&fresh)), vec!["x"]);
    }

    #[test]
    fn test_format_log_line() {
        plain();
        let entry = LogEntry::new(LogLevel::Error, "boom").with_step_name("build");

        let line = format_log_line(&entry);

        assert!(line.ends_with("ERROR [build] boom"), "{line}");
    }

    #[test]
    fn test_format_status_line() {
        plain();
        let mut execution = ExecutionState::new("exec-1");
        execution.pipeline_name = Some("deploy".to_string());
        execution.status = ExecutionStatus::Running;

        assert_eq!(format_status_line(&execution, 40), "==> deploy (exec-1): running, 40%");
    }

    #[test]
    fn test_format_connection_line() {
        plain();
        let status = ConnectionStatus {
            state: ConnectionState::Reconnecting,
            last_error: Some("refused".to_string()),
            attempt: 2,
        };

        assert_eq!(
            format_connection_line(&status),
            "-- reconnecting (attempt 2), polling meanwhile: refused"
        );
    }
}
