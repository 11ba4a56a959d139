//! Event handling for the TUI.
//!
//! - Monitor events from `pw-core` update the cached [`ExecutionRow`]s
//! - Keys nobody else consumed map to app-level [`KeyAction`]s

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use pw_core::MonitorEvent;
use pw_protocol::{ConnectionStatus, ExecutionState, LogEntry, StepState};
use serde_json::{Map, Value};

/// What the TUI knows about one watched execution.
///
/// Everything except `logs` is carried by the events themselves; logs are
/// re-read from the session handle when an event says they changed.
#[derive(Debug, Clone)]
pub struct ExecutionRow {
    pub execution: ExecutionState,
    pub steps: Vec<StepState>,
    pub progress: u8,
    pub connection: ConnectionStatus,
    pub logs: Vec<LogEntry>,
    /// Latest tool status or system notification, one line.
    pub notice: Option<String>,
    /// The session ended; the row stays until unwatched.
    pub ended: bool,
}

impl ExecutionRow {
    pub fn new(execution_id: &str) -> Self {
        Self {
            execution: ExecutionState::new(execution_id),
            steps: Vec::new(),
            progress: 0,
            connection: ConnectionStatus::default(),
            logs: Vec::new(),
            notice: None,
            ended: false,
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution.execution_id
    }
}

/// Apply a monitor event to the matching row.
///
/// Returns `true` when the row's logs changed and must be re-read.
pub fn handle_monitor_event(rows: &mut [ExecutionRow], event: MonitorEvent) -> bool {
    let Some(row) = rows
        .iter_mut()
        .find(|row| row.execution_id() == event.execution_id())
    else {
        return false;
    };

    match event {
        MonitorEvent::ConnectionChanged { status, .. } => {
            row.connection = status;
        }
        MonitorEvent::ExecutionChanged {
            execution,
            progress,
            ..
        } => {
            row.execution = execution;
            row.progress = progress;
        }
        MonitorEvent::StepsChanged { steps, .. } => {
            row.steps = steps;
        }
        MonitorEvent::LogsAppended { .. } => return true,
        MonitorEvent::LogsCleared { .. } => {
            row.logs.clear();
            return true;
        }
        MonitorEvent::ToolStatus { body, .. } => {
            row.notice = Some(format!("tool: {}", notice_line(&body)));
        }
        MonitorEvent::SystemNotification { body, .. } => {
            row.notice = Some(notice_line(&body));
        }
        MonitorEvent::CommandSent { kind, .. } => {
            row.notice = Some(format!("{kind} sent"));
        }
        MonitorEvent::CommandDropped { kind, reason, .. } => {
            row.notice = Some(format!("{kind} not sent: {reason}"));
        }
        MonitorEvent::SessionEnded { .. } => {
            row.ended = true;
        }
    }
    false
}

/// One line for a pass-through message body, preferring its `message`
/// field when it has one.
fn notice_line(body: &Map<String, Value>) -> String {
    match body.get("message").and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None => Value::Object(body.clone()).to_string(),
    }
}

/// App-level meaning of a key that no widget consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    SelectPrevious,
    SelectNext,
    Submit,
}

pub fn key_action(key_event: KeyEvent) -> Option<KeyAction> {
    if key_event.kind != KeyEventKind::Press {
        return None;
    }

    match key_event.code {
        KeyCode::Char('q') => Some(KeyAction::Quit),
        KeyCode::Char('c') if key_event.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(KeyAction::Quit)
        }
        KeyCode::Up => Some(KeyAction::SelectPrevious),
        KeyCode::Down => Some(KeyAction::SelectNext),
        KeyCode::Enter => Some(KeyAction::Submit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_protocol::{ConnectionState, ExecutionStatus};

    fn rows() -> Vec<ExecutionRow> {
        vec![ExecutionRow::new("exec-1"), ExecutionRow::new("exec-2")]
    }

    #[test]
    fn test_execution_changed_updates_matching_row() {
        let mut rows = rows();
        let mut execution = ExecutionState::new("exec-2");
        execution.status = ExecutionStatus::Running;
        execution.pipeline_name = Some("deploy".to_string());

        let reload = handle_monitor_event(
            &mut rows,
            MonitorEvent::ExecutionChanged {
                execution_id: "exec-2".to_string(),
                execution,
                progress: 25,
            },
        );

        assert!(!reload);
        assert_eq!(rows[0].execution.status, ExecutionStatus::Starting);
        assert_eq!(rows[1].execution.status, ExecutionStatus::Running);
        assert_eq!(rows[1].progress, 25);
    }

    #[test]
    fn test_log_events_request_reload() {
        let mut rows = rows();
        rows[0].logs.push(LogEntry::new(pw_protocol::LogLevel::Info, "old"));

        assert!(handle_monitor_event(
            &mut rows,
            MonitorEvent::LogsAppended {
                execution_id: "exec-1".to_string(),
                count: 3,
            },
        ));
        assert!(handle_monitor_event(
            &mut rows,
            MonitorEvent::LogsCleared {
                execution_id: "exec-1".to_string(),
            },
        ));
        assert!(rows[0].logs.is_empty());
    }

    #[test]
    fn test_unknown_execution_is_ignored() {
        let mut rows = rows();

        let reload = handle_monitor_event(
            &mut rows,
            MonitorEvent::LogsAppended {
                execution_id: "other".to_string(),
                count: 1,
            },
        );

        assert!(!reload);
    }

    #[test]
    fn test_connection_and_end_of_session() {
        let mut rows = rows();
        let status = ConnectionStatus {
            state: ConnectionState::Failed,
            last_error: Some("refused".to_string()),
            attempt: 5,
        };

        handle_monitor_event(
            &mut rows,
            MonitorEvent::ConnectionChanged {
                execution_id: "exec-1".to_string(),
                status: status.clone(),
            },
        );
        handle_monitor_event(
            &mut rows,
            MonitorEvent::SessionEnded {
                execution_id: "exec-1".to_string(),
            },
        );

        assert_eq!(rows[0].connection, status);
        assert!(rows[0].ended);
        assert!(!rows[1].ended);
    }

    #[test]
    fn test_dropped_command_becomes_notice() {
        let mut rows = rows();

        handle_monitor_event(
            &mut rows,
            MonitorEvent::CommandDropped {
                execution_id: "exec-1".to_string(),
                kind: "stop_execution",
                reason: "not connected".to_string(),
            },
        );

        assert_eq!(
            rows[0].notice.as_deref(),
            Some("stop_execution not sent: not connected")
        );
    }

    #[test]
    fn test_key_actions() {
        use crossterm::event::KeyEvent;

        assert_eq!(key_action(KeyEvent::from(KeyCode::Char('q'))), Some(KeyAction::Quit));
        assert_eq!(
            key_action(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(KeyAction::Quit)
        );
        assert_eq!(key_action(KeyEvent::from(KeyCode::Up)), Some(KeyAction::SelectPrevious));
        assert_eq!(key_action(KeyEvent::from(KeyCode::Down)), Some(KeyAction::SelectNext));
        assert_eq!(key_action(KeyEvent::from(KeyCode::Enter)), Some(KeyAction::Submit));
        assert_eq!(key_action(KeyEvent::from(KeyCode::Char('x'))), None);
    }
}
