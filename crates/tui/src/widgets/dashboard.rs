//! Dashboard table of the watched executions.
//!
//! One row per execution: id, pipeline name, status, progress and the state
//! of its push connection.

use crate::event_handler::ExecutionRow;
use pw_protocol::{ConnectionState, ExecutionStatus};
use ratatui::layout::{Constraint, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Row, Table, TableState};
use ratatui::Frame;

pub fn status_style(status: ExecutionStatus) -> Style {
    match status {
        ExecutionStatus::Starting => Style::default().fg(Color::Yellow),
        ExecutionStatus::Running => Style::default().fg(Color::Green),
        ExecutionStatus::Success => Style::default().fg(Color::Cyan),
        ExecutionStatus::Failed => Style::default().fg(Color::Red),
        ExecutionStatus::Cancelled => Style::default().fg(Color::DarkGray),
    }
}

pub fn connection_style(state: ConnectionState) -> Style {
    match state {
        ConnectionState::Connected => Style::default().fg(Color::Green),
        ConnectionState::Connecting | ConnectionState::Reconnecting => {
            Style::default().fg(Color::Yellow)
        }
        ConnectionState::Failed => Style::default().fg(Color::Red),
        ConnectionState::Disconnected => Style::default().fg(Color::DarkGray),
    }
}

/// Label shown for a connection; polling is implied whenever the push
/// channel is not connected.
pub fn connection_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connected => "live",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Reconnecting => "polling",
        ConnectionState::Failed => "failed",
        ConnectionState::Disconnected => "offline",
    }
}

/// Render the dashboard as a table.
///
/// # Arguments
/// * `frame` - The frame to render into
/// * `area` - The area to render the table in
/// * `rows` - Watched executions, in display order
/// * `selected` - Index of the selected execution
pub fn render_dashboard(frame: &mut Frame, area: Rect, rows: &[ExecutionRow], selected: usize) {
    let table_rows: Vec<Row> = rows
        .iter()
        .map(|row| {
            let execution = &row.execution;
            let name = execution.pipeline_name.clone().unwrap_or_else(|| "-".to_string());
            let status = if row.ended {
                Cell::from("stopped").style(Style::default().fg(Color::DarkGray))
            } else {
                Cell::from(format!("{:?}", execution.status)).style(status_style(execution.status))
            };

            Row::new(vec![
                Cell::from(short_id(&execution.execution_id)),
                Cell::from(name),
                status,
                Cell::from(format!("{:>3}%", row.progress)),
                Cell::from(connection_label(row.connection.state))
                    .style(connection_style(row.connection.state)),
            ])
        })
        .collect();

    let header = Row::new(vec![
        Cell::from("Execution"),
        Cell::from("Pipeline"),
        Cell::from("Status"),
        Cell::from("Done"),
        Cell::from("Link"),
    ])
    .style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan));

    let widths = [
        Constraint::Length(12),
        Constraint::Percentage(40),
        Constraint::Length(10),
        Constraint::Length(5),
        Constraint::Length(11),
    ];

    let table = Table::new(table_rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Executions")
                .style(Style::default().fg(Color::White)),
        )
        .row_highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">> ");

    let mut table_state = TableState::default();
    if !rows.is_empty() {
        table_state.select(Some(selected));
    }

    frame.render_stateful_widget(table, area, &mut table_state);
}

/// Keep ids readable in a narrow column.
fn short_id(execution_id: &str) -> String {
    if execution_id.chars().count() <= 12 {
        execution_id.to_string()
    } else {
        let head: String = execution_id.chars().take(11).collect();
        format!("{head}…")
    }
}
