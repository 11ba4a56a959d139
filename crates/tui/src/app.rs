//! TUI application state and event loop.
//!
//! The `App` owns a [`MonitorManager`] and keeps one [`ExecutionRow`] per
//! watched execution, updated from the shared monitor event channel. The
//! event loop is a `tokio::select!` over monitor events, terminal events
//! and a follow tick that lets a resting log pane resume following.

use anyhow::Result;
use crossterm::event::KeyEvent;
use pw_core::{MonitorEvent, MonitorManager, SessionHandle};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    Frame,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::select;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::event_handler::{self, ExecutionRow, KeyAction};
use crate::tui::{Tui, TuiEvent};
use crate::widgets::{CommandComposer, DetailView, UiCommand};

const FOLLOW_TICK: Duration = Duration::from_millis(250);

pub struct App {
    manager: MonitorManager,
    events_rx: UnboundedReceiver<MonitorEvent>,
    /// Watched executions, in the order they were added.
    pub rows: Vec<ExecutionRow>,
    pub selected_index: usize,
    pub detail: DetailView,
    pub composer: CommandComposer,
    /// Feedback for the last command, shown in the composer title.
    pub status_message: Option<String>,
    /// Default directory for `/export`.
    export_dir: PathBuf,
    pub should_exit: bool,
}

impl App {
    pub fn new(
        manager: MonitorManager,
        events_rx: UnboundedReceiver<MonitorEvent>,
        export_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            manager,
            events_rx,
            rows: Vec::new(),
            selected_index: 0,
            detail: DetailView::new(),
            composer: CommandComposer::new(),
            status_message: None,
            export_dir: export_dir.into(),
            should_exit: false,
        }
    }

    /// Main event loop. Returns when the user quits.
    pub async fn run(&mut self, tui: &mut Tui) -> Result<()> {
        let mut tui_events = tui.event_stream();
        let mut follow_tick = tokio::time::interval(FOLLOW_TICK);

        tui.frame_requester().schedule_frame();

        while !self.should_exit {
            select! {
                Some(event) = self.events_rx.recv() => {
                    self.handle_monitor_event(event).await;
                    tui.frame_requester().schedule_frame();
                }
                Some(tui_event) = tui_events.next() => {
                    self.handle_tui_event(tui, tui_event).await?;
                }
                _ = follow_tick.tick() => {
                    if !self.rows.is_empty() {
                        tui.frame_requester().schedule_frame();
                    }
                }
            }
        }

        Ok(())
    }

    /// Stop every session.
    pub async fn shutdown(&mut self) {
        self.manager.stop_all().await;
    }

    async fn handle_tui_event(&mut self, tui: &mut Tui, event: TuiEvent) -> Result<()> {
        match event {
            TuiEvent::Key(key_event) => {
                self.handle_key_event(key_event).await;
                tui.frame_requester().schedule_frame();
            }
            TuiEvent::Paste(text) => {
                self.composer.insert_str(&text);
                tui.frame_requester().schedule_frame();
            }
            TuiEvent::Scroll(lines) => {
                let content = self.selected_logs_len();
                self.detail.scroll_by(lines, content);
                self.report_scroll().await;
                tui.frame_requester().schedule_frame();
            }
            TuiEvent::Draw => {
                self.sync_follow().await;
                tui.draw(|frame| self.render(frame))?;
            }
        }
        Ok(())
    }

    /// Apply a monitor event, re-reading logs when they changed.
    pub async fn handle_monitor_event(&mut self, event: MonitorEvent) {
        let execution_id = event.execution_id().to_string();
        if event_handler::handle_monitor_event(&mut self.rows, event) {
            self.reload_logs(&execution_id).await;
        }
    }

    async fn reload_logs(&mut self, execution_id: &str) {
        let Some(handle) = self.manager.session(execution_id).await else {
            return;
        };
        let logs = handle.logs().await;
        if let Some(row) = self.rows.iter_mut().find(|row| row.execution_id() == execution_id) {
            row.logs = logs;
        }
    }

    /// Route a key through the composer, the log pane, then the app.
    pub async fn handle_key_event(&mut self, key_event: KeyEvent) {
        if self.composer.handle_key_event(key_event).is_consumed() {
            return;
        }

        if self.composer.is_empty() {
            let content = self.selected_logs_len();
            if self.detail.handle_key_event(key_event, content).is_consumed() {
                self.report_scroll().await;
                return;
            }
        }

        match event_handler::key_action(key_event) {
            Some(KeyAction::Quit) => self.should_exit = true,
            Some(KeyAction::SelectPrevious) => {
                if self.selected_index > 0 {
                    self.select(self.selected_index - 1).await;
                }
            }
            Some(KeyAction::SelectNext) => {
                if self.selected_index + 1 < self.rows.len() {
                    self.select(self.selected_index + 1).await;
                }
            }
            Some(KeyAction::Submit) => self.submit().await,
            None => {}
        }
    }

    async fn submit(&mut self) {
        let parsed = self.composer.parse_command();
        self.composer.clear();

        match parsed {
            Ok(Some(command)) => self.execute(command).await,
            Ok(None) => {}
            Err(err) => self.status_message = Some(err.to_string()),
        }
    }

    /// Run a parsed command against the selected execution.
    pub async fn execute(&mut self, command: UiCommand) {
        debug!(?command, "ui command");
        let result = match command {
            UiCommand::Watch(execution_id) => self.watch(&execution_id).await,
            UiCommand::Unwatch => self.unwatch_selected().await,
            UiCommand::Quit => {
                self.should_exit = true;
                Ok(())
            }
            UiCommand::Follow => {
                if let Some(handle) = self.selected_handle().await {
                    handle.resume_follow().await;
                    let max = self.detail.max_offset(self.selected_logs_len());
                    self.detail.scroll_to_bottom(max);
                }
                Ok(())
            }
            UiCommand::Export(path) => self.export(path).await,
            session_command => match self.selected_handle().await {
                Some(handle) => match session_command {
                    UiCommand::Stop => handle.stop_execution().await,
                    UiCommand::Restart => handle.restart_execution().await,
                    UiCommand::Clear => handle.clear_logs().await,
                    UiCommand::Retry => handle.retry().await,
                    UiCommand::Refresh => handle.refresh().await,
                    _ => Ok(()),
                }
                .map_err(|err| err.to_string()),
                None => Err("no execution selected".to_string()),
            },
        };

        if let Err(message) = result {
            warn!(%message, "command failed");
            self.status_message = Some(message);
        }
    }

    /// Start watching an execution and select it.
    pub async fn watch(&mut self, execution_id: &str) -> Result<(), String> {
        self.manager
            .start_monitoring(execution_id)
            .await
            .map_err(|err| err.to_string())?;
        info!(execution_id, "watching execution");

        let index = match self
            .rows
            .iter()
            .position(|row| row.execution_id() == execution_id)
        {
            Some(index) => {
                self.rows[index] = ExecutionRow::new(execution_id);
                index
            }
            None => {
                self.rows.push(ExecutionRow::new(execution_id));
                self.rows.len() - 1
            }
        };
        self.select(index).await;
        self.status_message = Some(format!("watching {execution_id}"));
        Ok(())
    }

    async fn unwatch_selected(&mut self) -> Result<(), String> {
        if self.selected_index >= self.rows.len() {
            return Err("no execution selected".to_string());
        }
        let row = self.rows.remove(self.selected_index);
        if let Err(err) = self.manager.stop_monitoring(row.execution_id()).await {
            debug!(error = %err, "session already gone");
        }
        self.selected_index = self.selected_index.min(self.rows.len().saturating_sub(1));
        self.status_message = Some(format!("stopped watching {}", row.execution_id()));
        Ok(())
    }

    async fn export(&mut self, path: Option<PathBuf>) -> Result<(), String> {
        let Some(row) = self.rows.get(self.selected_index) else {
            return Err("no execution selected".to_string());
        };
        let execution_id = row.execution_id().to_string();
        let path = path.unwrap_or_else(|| self.export_dir.join(format!("{execution_id}.log")));

        let handle = self.selected_handle().await;
        let full = match &handle {
            Some(handle) => handle.fetch_full_logs().await.ok(),
            None => None,
        };
        let (contents, partial) = match full {
            Some(text) => (text, false),
            None => (buffered_log_text(row), true),
        };

        write_export(&path, &contents)
            .await
            .map_err(|err| format!("export failed: {err}"))?;
        self.status_message = Some(if partial {
            format!("saved buffered logs to {}", path.display())
        } else {
            format!("saved logs to {}", path.display())
        });
        Ok(())
    }

    async fn select(&mut self, index: usize) {
        self.selected_index = index;
        // Start the newly selected log pane at the bottom, following.
        self.detail.scroll_offset = self.detail.max_offset(self.selected_logs_len());
        if let Some(handle) = self.selected_handle().await {
            handle.resume_follow().await;
        }
    }

    async fn selected_handle(&self) -> Option<SessionHandle> {
        let row = self.rows.get(self.selected_index)?;
        self.manager.session(row.execution_id()).await
    }

    fn selected_logs_len(&self) -> usize {
        self.rows
            .get(self.selected_index)
            .map_or(0, |row| row.logs.len())
    }

    async fn report_scroll(&self) {
        if let Some(handle) = self.selected_handle().await {
            handle
                .report_scroll(self.detail.metrics(self.selected_logs_len()))
                .await;
        }
    }

    /// Pin the log pane to the bottom when the session says so.
    async fn sync_follow(&mut self) {
        let Some(handle) = self.selected_handle().await else {
            return;
        };
        let content = self.selected_logs_len();
        if handle.should_auto_scroll().await {
            self.detail.scroll_to_bottom(self.detail.max_offset(content));
            handle.acknowledge_scrolled().await;
        }
        handle.report_viewport(self.detail.metrics(content)).await;
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let dashboard_height = (self.rows.len() as u16 + 3).clamp(4, (area.height / 4).max(4));

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(dashboard_height),
                Constraint::Min(5),
                Constraint::Length(3),
            ])
            .split(area);

        crate::widgets::dashboard::render_dashboard(
            frame,
            chunks[0],
            &self.rows,
            self.selected_index,
        );
        self.detail
            .render(frame, chunks[1], self.rows.get(self.selected_index));
        self.composer
            .render(chunks[2], frame.buffer_mut(), self.status_message.as_deref());

        if self.composer.should_show_popup() {
            let popup = popup_area(chunks[1], self.composer.suggestions().len() as u16 + 2);
            self.composer.render_popup(popup, frame.buffer_mut());
        }
    }
}

/// Bottom strip of `area` for the autocomplete popup.
fn popup_area(area: Rect, height: u16) -> Rect {
    let height = height.min(area.height);
    Rect {
        x: area.x,
        y: area.y + area.height - height,
        width: area.width,
        height,
    }
}

fn buffered_log_text(row: &ExecutionRow) -> String {
    let mut text = String::new();
    for entry in &row.logs {
        text.push_str(&format!(
            "{} {} {}\n",
            entry.timestamp.to_rfc3339(),
            crate::widgets::detail_view::level_label(entry.level),
            entry.message
        ));
    }
    text
}

async fn write_export(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crossterm::event::KeyCode;
    use pw_core::channel::{Connector, FrameSink, FrameStream, TransportError};
    use pw_core::poller::{FetchError, StateFetcher};
    use pw_protocol::{ExecutionSnapshot, ExecutionState, ExecutionStatus, MonitorConfig};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use std::sync::Arc;
    use tokio::sync::mpsc::unbounded_channel;

    struct Offline;

    #[async_trait]
    impl Connector for Offline {
        async fn connect(&self, _: &str) -> Result<(FrameSink, FrameStream), TransportError> {
            Err(TransportError::Connect("offline".to_string()))
        }
    }

    #[async_trait]
    impl StateFetcher for Offline {
        async fn fetch_state(&self, _: &str) -> Result<ExecutionSnapshot, FetchError> {
            Err(FetchError::Unavailable("offline".to_string()))
        }

        async fn fetch_full_logs(&self, _: &str) -> Result<String, FetchError> {
            Ok("full log\n".to_string())
        }
    }

    fn app(export_dir: &Path) -> App {
        let (events_tx, events_rx) = unbounded_channel();
        let manager = MonitorManager::new(
            MonitorConfig::default(),
            Arc::new(Offline),
            Arc::new(Offline),
            events_tx,
        );
        App::new(manager, events_rx, export_dir)
    }

    fn screen(app: &mut App) -> String {
        let backend = TestBackend::new(100, 30);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|frame| app.render(frame)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    async fn type_command(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key_event(KeyEvent::from(KeyCode::Char(c))).await;
        }
        app.handle_key_event(KeyEvent::from(KeyCode::Enter)).await;
    }

    #[tokio::test]
    async fn test_app_renders_empty_screen() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        let content = screen(&mut app);

        assert!(content.contains("Executions"));
        assert!(content.contains("No execution selected"));
        assert!(content.contains("Command"));
    }

    #[tokio::test]
    async fn test_app_quit_on_q() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        app.handle_key_event(KeyEvent::from(KeyCode::Char('q'))).await;

        assert!(app.should_exit);
    }

    #[tokio::test]
    async fn test_q_inside_a_command_is_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        type_command(&mut app, "/quit").await;

        assert!(app.should_exit);
        assert!(app.composer.is_empty());
    }

    #[tokio::test]
    async fn test_watch_command_adds_and_selects_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        type_command(&mut app, "/watch exec-1").await;
        type_command(&mut app, "/watch exec-2").await;

        assert_eq!(app.rows.len(), 2);
        assert_eq!(app.selected_index, 1);
        assert_eq!(app.status_message.as_deref(), Some("watching exec-2"));
        assert!(screen(&mut app).contains("exec-2"));

        app.handle_key_event(KeyEvent::from(KeyCode::Up)).await;
        assert_eq!(app.selected_index, 0);

        type_command(&mut app, "/watch exec-1").await;
        assert!(app
            .status_message
            .as_deref()
            .is_some_and(|message| message.contains("already")));

        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_command_sets_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        type_command(&mut app, "/bogus").await;

        assert_eq!(app.status_message.as_deref(), Some("Unknown command: /bogus"));
        assert!(!app.should_exit);
    }

    #[tokio::test]
    async fn test_session_commands_need_a_selection() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        app.execute(UiCommand::Stop).await;

        assert_eq!(app.status_message.as_deref(), Some("no execution selected"));
    }

    #[tokio::test]
    async fn test_monitor_event_updates_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.watch("exec-1").await.unwrap();

        let mut execution = ExecutionState::new("exec-1");
        execution.status = ExecutionStatus::Running;
        execution.pipeline_name = Some("deploy-api".to_string());
        app.handle_monitor_event(MonitorEvent::ExecutionChanged {
            execution_id: "exec-1".to_string(),
            execution,
            progress: 60,
        })
        .await;

        assert_eq!(app.rows[0].progress, 60);
        let content = screen(&mut app);
        assert!(content.contains("deploy-api"));
        assert!(content.contains("60%"));

        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_unwatch_removes_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.watch("exec-1").await.unwrap();

        type_command(&mut app, "/unwatch").await;

        assert!(app.rows.is_empty());
        assert_eq!(app.manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_export_writes_full_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.watch("exec-1").await.unwrap();

        type_command(&mut app, "/export").await;

        let written = std::fs::read_to_string(dir.path().join("exec-1.log")).unwrap();
        assert_eq!(written, "full log\n");
        assert!(app
            .status_message
            .as_deref()
            .is_some_and(|message| message.starts_with("saved logs")));

        app.shutdown().await;
    }
}
