//! Command input with slash command autocomplete.
//!
//! Typing `/` opens a popup of matching commands; Tab completes the
//! selected one. Enter is left to the app, which parses the input with
//! [`CommandComposer::parse_command`].

use crate::event::EventStatus;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use std::path::PathBuf;
use thiserror::Error;

/// Available slash commands with their descriptions.
const COMMANDS: &[(&str, &str)] = &[
    ("/watch <execution_id>", "Start monitoring an execution"),
    ("/unwatch", "Stop monitoring the selected execution"),
    ("/stop", "Ask the server to stop the execution"),
    ("/restart", "Ask the server to restart the execution"),
    ("/clear", "Clear the log pane"),
    ("/retry", "Reconnect after giving up"),
    ("/refresh", "Fetch the full state now"),
    ("/follow", "Jump to the newest log line and follow"),
    ("/export [path]", "Save the full log to a file"),
    ("/quit", "Leave pipewatch"),
];

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    Watch(String),
    Unwatch,
    Stop,
    Restart,
    Clear,
    Retry,
    Refresh,
    Follow,
    Export(Option<PathBuf>),
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Commands must start with '/'")]
    NotACommand,
}

#[derive(Debug, Clone, Default)]
pub struct CommandComposer {
    input: String,
    /// Cursor position, in characters.
    cursor_pos: usize,
    show_popup: bool,
    selected_index: usize,
}

impl CommandComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    pub fn should_show_popup(&self) -> bool {
        self.show_popup
    }

    /// Commands matching the current input.
    pub fn suggestions(&self) -> Vec<(&'static str, &'static str)> {
        if !self.input.starts_with('/') {
            return Vec::new();
        }

        let filter = self.input.trim();
        COMMANDS
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(filter))
            .copied()
            .collect()
    }

    pub fn selected_suggestion(&self) -> Option<(&'static str, &'static str)> {
        self.suggestions().get(self.selected_index).copied()
    }

    /// Offer a key to the composer.
    ///
    /// Plain characters are only taken once a command has been started with
    /// `/`, so single-key shortcuts keep working while the input is empty.
    pub fn handle_key_event(&mut self, key_event: KeyEvent) -> EventStatus {
        if key_event.kind != KeyEventKind::Press {
            return EventStatus::NotConsumed;
        }

        match key_event.code {
            KeyCode::Char(c) if !self.input.is_empty() || c == '/' => self.insert_char(c),
            KeyCode::Backspace if !self.input.is_empty() => self.delete_char(),
            KeyCode::Left if !self.input.is_empty() => self.move_cursor_left(),
            KeyCode::Right if !self.input.is_empty() => self.move_cursor_right(),
            KeyCode::Esc if !self.input.is_empty() => self.clear(),
            KeyCode::Tab if self.show_popup => self.complete_with_selection(),
            KeyCode::Up if self.show_popup => self.move_selection_up(),
            KeyCode::Down if self.show_popup => self.move_selection_down(),
            _ => return EventStatus::NotConsumed,
        }
        EventStatus::Consumed
    }

    /// Insert pasted text at the cursor.
    pub fn insert_str(&mut self, text: &str) {
        for c in text.chars().filter(|c| !c.is_control()) {
            self.insert_char(c);
        }
    }

    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_index();
        self.input.insert(at, c);
        self.cursor_pos += 1;
        self.update_popup_state();
    }

    /// Delete the character before the cursor.
    pub fn delete_char(&mut self) {
        if self.cursor_pos > 0 {
            self.cursor_pos -= 1;
            let at = self.byte_index();
            self.input.remove(at);
            self.update_popup_state();
        }
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.cursor_pos = 0;
        self.show_popup = false;
        self.selected_index = 0;
    }

    pub fn move_cursor_left(&mut self) {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        if self.cursor_pos < self.input.chars().count() {
            self.cursor_pos += 1;
        }
    }

    pub fn move_selection_up(&mut self) {
        self.selected_index = self.selected_index.saturating_sub(1);
    }

    pub fn move_selection_down(&mut self) {
        if self.selected_index + 1 < self.suggestions().len() {
            self.selected_index += 1;
        }
    }

    /// Replace the input with the selected command name.
    pub fn complete_with_selection(&mut self) {
        if let Some((cmd, _)) = self.selected_suggestion() {
            let cmd_name = cmd.split_whitespace().next().unwrap_or(cmd);
            self.input = format!("{cmd_name} ");
            self.cursor_pos = self.input.chars().count();
            self.show_popup = false;
            self.selected_index = 0;
        }
    }

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_pos)
            .map_or(self.input.len(), |(i, _)| i)
    }

    fn update_popup_state(&mut self) {
        self.show_popup = self.input.starts_with('/') && !self.input.contains(' ');

        let suggestions = self.suggestions();
        if self.selected_index >= suggestions.len() {
            self.selected_index = suggestions.len().saturating_sub(1);
        }
    }

    pub fn render(&self, area: Rect, buf: &mut Buffer, hint: Option<&str>) {
        let title = match hint {
            Some(hint) => format!("Command - {hint}"),
            None => "Command (/ for commands, q to quit)".to_string(),
        };
        let block = Block::default().borders(Borders::ALL).title(title);

        let inner = block.inner(area);
        block.render(area, buf);

        let text = format!("> {}", self.input);
        Paragraph::new(text)
            .style(Style::default().fg(Color::Yellow))
            .render(inner, buf);
    }

    pub fn render_popup(&self, area: Rect, buf: &mut Buffer) {
        if !self.show_popup {
            return;
        }

        let suggestions = self.suggestions();
        if suggestions.is_empty() {
            return;
        }

        let block = Block::default()
            .borders(Borders::ALL)
            .title("Commands")
            .style(Style::default().bg(Color::Black));

        let inner = block.inner(area);
        block.render(area, buf);

        for (i, (cmd, desc)) in suggestions.iter().enumerate() {
            let Some(y) = inner.y.checked_add(i as u16) else {
                break;
            };
            if y >= inner.y + inner.height {
                break;
            }

            let style = if i == self.selected_index {
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };

            let line = Line::from(vec![
                Span::styled(format!("{cmd:<24}"), style),
                Span::styled(desc.to_string(), style.fg(Color::Gray)),
            ]);

            buf.set_line(inner.x, y, &line, inner.width);
        }
    }

    /// Parse the current input.
    ///
    /// Returns `Ok(None)` for blank input.
    pub fn parse_command(&self) -> Result<Option<UiCommand>, CommandError> {
        let input = self.input.trim();
        if input.is_empty() {
            return Ok(None);
        }
        if !input.starts_with('/') {
            return Err(CommandError::NotACommand);
        }

        let mut parts = input.split_whitespace();
        let cmd = parts.next().unwrap_or(input);
        let arg = parts.next();

        let command = match cmd {
            "/watch" => UiCommand::Watch(
                arg.ok_or(CommandError::MissingArgument("execution id"))?
                    .to_string(),
            ),
            "/unwatch" => UiCommand::Unwatch,
            "/stop" => UiCommand::Stop,
            "/restart" => UiCommand::Restart,
            "/clear" => UiCommand::Clear,
            "/retry" => UiCommand::Retry,
            "/refresh" => UiCommand::Refresh,
            "/follow" => UiCommand::Follow,
            "/export" => UiCommand::Export(arg.map(PathBuf::from)),
            "/quit" => UiCommand::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}
