//! Detail view of the selected execution: summary, step tree and a
//! scrollable log pane.
//!
//! The log pane tracks its scroll offset in lines. The app reports user
//! scrolls to the session's auto-follow heuristic and pins the pane to the
//! bottom when the heuristic asks for it.

use crate::event::EventStatus;
use crate::event_handler::ExecutionRow;
use crate::widgets::dashboard::{connection_label, connection_style, status_style};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use pw_core::state::ScrollMetrics;
use pw_protocol::{ConnectionState, LogEntry, LogLevel, StepKind, StepState, StepStatus};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Gauge, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState,
    },
    Frame,
};

/// Scroll state of the log pane.
pub struct DetailView {
    /// Lines scrolled from the top of the log.
    pub scroll_offset: usize,
    /// Visible log lines at the last render.
    viewport: usize,
}

impl DetailView {
    pub fn new() -> Self {
        Self {
            scroll_offset: 0,
            viewport: 0,
        }
    }

    pub fn viewport(&self) -> usize {
        self.viewport
    }

    /// Largest useful offset for `content` log lines.
    pub fn max_offset(&self, content: usize) -> usize {
        content.saturating_sub(self.viewport)
    }

    /// Scroll position in the units the auto-follow heuristic expects.
    pub fn metrics(&self, content: usize) -> ScrollMetrics {
        ScrollMetrics::new(
            self.scroll_offset.min(self.max_offset(content)) as f64,
            self.viewport as f64,
            content as f64,
        )
    }

    /// Render the detail view for the selected execution, if any.
    pub fn render(&mut self, frame: &mut Frame, area: Rect, row: Option<&ExecutionRow>) {
        let Some(row) = row else {
            self.viewport = area.height.saturating_sub(2) as usize;
            let paragraph = Paragraph::new("No execution selected. Use /watch <id>.")
                .block(Block::default().borders(Borders::ALL).title("Detail"));
            frame.render_widget(paragraph, area);
            return;
        };

        let step_lines = flatten_steps(&row.steps);
        let steps_height = (step_lines.len() as u16 + 2).min(area.height / 3).max(3);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),
                Constraint::Length(steps_height),
                Constraint::Min(3),
            ])
            .split(area);

        render_summary(frame, chunks[0], row);
        render_steps(frame, chunks[1], &step_lines);
        self.render_logs(frame, chunks[2], &row.logs);
    }

    fn render_logs(&mut self, frame: &mut Frame, area: Rect, logs: &[LogEntry]) {
        self.viewport = area.height.saturating_sub(2) as usize;
        self.scroll_offset = self.scroll_offset.min(self.max_offset(logs.len()));

        let lines: Vec<Line> = if logs.is_empty() {
            vec![Line::from("No logs yet.")]
        } else {
            logs.iter()
                .skip(self.scroll_offset)
                .take(self.viewport)
                .map(log_line)
                .collect()
        };

        let title = format!("Logs ({})", logs.len());
        let paragraph =
            Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(paragraph, area);

        if logs.len() > self.viewport {
            let mut scrollbar_state = ScrollbarState::default()
                .content_length(self.max_offset(logs.len()))
                .viewport_content_length(self.viewport)
                .position(self.scroll_offset);

            let scrollbar = Scrollbar::default()
                .orientation(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("↑"))
                .end_symbol(Some("↓"));

            frame.render_stateful_widget(scrollbar, area, &mut scrollbar_state);
        }
    }

    /// Handle log navigation keys.
    ///
    /// `content` is the number of log lines. Returns `Consumed` when the
    /// key moved the view.
    pub fn handle_key_event(&mut self, key_event: KeyEvent, content: usize) -> EventStatus {
        if key_event.kind != KeyEventKind::Press {
            return EventStatus::NotConsumed;
        }
        let max = self.max_offset(content);
        let page = self.viewport.max(1);
        self.scroll_offset = self.scroll_offset.min(max);

        match key_event.code {
            KeyCode::Char('k') => self.scroll_up(),
            KeyCode::Char('j') => self.scroll_down(max),
            KeyCode::PageUp => self.page_up(page),
            KeyCode::PageDown => self.page_down(page, max),
            KeyCode::Home | KeyCode::Char('g') => self.scroll_to_top(),
            KeyCode::End | KeyCode::Char('G') => self.scroll_to_bottom(max),
            _ => return EventStatus::NotConsumed,
        }
        EventStatus::Consumed
    }

    /// Scroll by `lines`, negative towards the top.
    pub fn scroll_by(&mut self, lines: i16, content: usize) {
        let max = self.max_offset(content);
        self.scroll_offset = self.scroll_offset.min(max);
        let magnitude = lines.unsigned_abs() as usize;
        if lines < 0 {
            self.page_up(magnitude);
        } else {
            self.page_down(magnitude, max);
        }
    }

    pub fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(1);
    }

    pub fn scroll_down(&mut self, max: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(1).min(max);
    }

    pub fn page_up(&mut self, page_size: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(page_size);
    }

    pub fn page_down(&mut self, page_size: usize, max: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(page_size).min(max);
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll_offset = 0;
    }

    pub fn scroll_to_bottom(&mut self, max: usize) {
        self.scroll_offset = max;
    }
}

impl Default for DetailView {
    fn default() -> Self {
        Self::new()
    }
}

fn render_summary(frame: &mut Frame, area: Rect, row: &ExecutionRow) {
    let execution = &row.execution;
    let title = match &execution.pipeline_name {
        Some(name) => format!("{name} ({})", execution.execution_id),
        None => execution.execution_id.clone(),
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(inner);

    let mut status = vec![
        Span::styled(format!("{:?}", execution.status), status_style(execution.status)),
        Span::raw(format!(
            "  {}/{} steps  {:.1}s  ",
            execution.successful_steps, execution.total_steps, execution.execution_time_seconds
        )),
        Span::styled(
            connection_label(row.connection.state),
            connection_style(row.connection.state),
        ),
    ];
    if row.connection.state == ConnectionState::Failed {
        status.push(Span::styled(
            "  /retry to reconnect",
            Style::default().fg(Color::Red),
        ));
    }
    if let Some(notice) = row.notice.as_ref().or(execution.message.as_ref()) {
        status.push(Span::styled(
            format!("  {notice}"),
            Style::default().fg(Color::Gray),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(status)), rows[0]);

    let gauge = Gauge::default()
        .gauge_style(status_style(execution.status))
        .percent(u16::from(row.progress.min(100)));
    frame.render_widget(gauge, rows[1]);
}

fn render_steps(frame: &mut Frame, area: Rect, step_lines: &[Line<'static>]) {
    let lines = if step_lines.is_empty() {
        vec![Line::from("No steps reported yet.")]
    } else {
        step_lines.to_vec()
    };
    let paragraph =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Steps"));
    frame.render_widget(paragraph, area);
}

/// Step tree as indented lines, parallel group children below their group.
fn flatten_steps(steps: &[StepState]) -> Vec<Line<'static>> {
    fn walk(steps: &[StepState], depth: usize, out: &mut Vec<Line<'static>>) {
        for step in steps {
            let (marker, style) = step_marker(step.status);
            let mut spans = vec![
                Span::raw("  ".repeat(depth)),
                Span::styled(format!("{marker} "), style),
                Span::raw(step.name.clone()),
            ];
            if step.kind == StepKind::ParallelGroup {
                spans.push(Span::styled(" (parallel)", Style::default().fg(Color::DarkGray)));
            }
            if let Some(seconds) = step.execution_time_seconds {
                spans.push(Span::styled(
                    format!("  {seconds:.1}s"),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            if let Some(error) = &step.error_message {
                spans.push(Span::styled(format!("  {error}"), Style::default().fg(Color::Red)));
            }
            out.push(Line::from(spans));
            walk(&step.children, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    walk(steps, 0, &mut out);
    out
}

fn step_marker(status: StepStatus) -> (&'static str, Style) {
    match status {
        StepStatus::Pending => ("·", Style::default().fg(Color::DarkGray)),
        StepStatus::Running => ("▶", Style::default().fg(Color::Yellow)),
        StepStatus::Success => ("✔", Style::default().fg(Color::Green)),
        StepStatus::Failed => ("✘", Style::default().fg(Color::Red)),
        StepStatus::Skipped => ("-", Style::default().fg(Color::DarkGray)),
    }
}

fn log_line(entry: &LogEntry) -> Line<'static> {
    let level_style = match entry.level {
        LogLevel::Debug => Style::default().fg(Color::DarkGray),
        LogLevel::Info => Style::default().fg(Color::Blue),
        LogLevel::Warning => Style::default().fg(Color::Yellow),
        LogLevel::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    };
    let mut spans = vec![
        Span::styled(
            entry.timestamp.format("%H:%M:%S ").to_string(),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(format!("{:<5} ", level_label(entry.level)), level_style),
    ];
    if let Some(step) = &entry.step_name {
        spans.push(Span::styled(format!("[{step}] "), Style::default().fg(Color::Cyan)));
    }
    spans.push(Span::raw(entry.message.clone()));
    Line::from(spans)
}

pub fn level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "DEBUG",
        LogLevel::Info => "INFO",
        LogLevel::Warning => "WARN",
        LogLevel::Error => "ERROR",
    }
}
