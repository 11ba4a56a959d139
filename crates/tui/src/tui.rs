//! Terminal ownership and the merged input/redraw stream.
//!
//! While a [`Tui`] exists the terminal is in raw mode on the alternate
//! screen with mouse capture on. Redraw requests from anywhere in the app
//! go through a [`FrameRequester`]; bursts of requests collapse into one
//! [`TuiEvent::Draw`].

use anyhow::Result;
use crossterm::event::{
    DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture, Event,
    EventStream, KeyEvent, KeyEventKind, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::execute;
use ratatui::backend::CrosstermBackend;
use ratatui::{Frame, Terminal};
use std::io::{self, Stdout};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_stream::{Stream, StreamExt};

/// Lines moved per mouse wheel notch.
const WHEEL_STEP: i16 = 3;

/// Redraws closer together than this are merged.
const MIN_FRAME_GAP: Duration = Duration::from_millis(16);

pub type TerminalBackend = CrosstermBackend<Stdout>;

pub type TuiEventStream = Pin<Box<dyn Stream<Item = TuiEvent> + Send + 'static>>;

/// What the app loop reacts to.
#[derive(Debug, PartialEq)]
pub enum TuiEvent {
    Key(KeyEvent),
    /// Bracketed paste.
    Paste(String),
    /// Mouse wheel, in lines; negative scrolls towards the top.
    Scroll(i16),
    /// Repaint: a frame was requested or the terminal was resized.
    Draw,
}

impl TuiEvent {
    /// Map a raw terminal event, dropping the ones the app ignores.
    fn from_terminal(event: Event) -> Option<Self> {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => Some(Self::Key(key)),
            Event::Paste(text) => Some(Self::Paste(text)),
            Event::Resize(..) => Some(Self::Draw),
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::ScrollUp => Some(Self::Scroll(-WHEEL_STEP)),
                MouseEventKind::ScrollDown => Some(Self::Scroll(WHEEL_STEP)),
                _ => None,
            },
            _ => None,
        }
    }
}

pub struct Tui {
    terminal: Terminal<TerminalBackend>,
    requests: mpsc::UnboundedSender<()>,
    frames: broadcast::Sender<()>,
}

impl Tui {
    /// Take over the terminal. Spawns the frame pacer, so a tokio runtime
    /// must be running.
    pub fn init() -> Result<Self> {
        enter_terminal()?;
        install_panic_restore();

        let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let (frames, _) = broadcast::channel(1);
        tokio::spawn(pace_frames(requests_rx, frames.clone(), MIN_FRAME_GAP));

        Ok(Self {
            terminal,
            requests,
            frames,
        })
    }

    /// Give the terminal back in the state it was found in.
    pub fn restore(&mut self) -> Result<()> {
        leave_terminal()?;
        Ok(())
    }

    pub fn frame_requester(&self) -> FrameRequester {
        FrameRequester {
            requests: self.requests.clone(),
        }
    }

    /// Terminal input merged with paced redraws.
    pub fn event_stream(&self) -> TuiEventStream {
        let mut input = EventStream::new();
        let mut frames = self.frames.subscribe();

        Box::pin(async_stream::stream! {
            loop {
                tokio::select! {
                    Some(Ok(event)) = input.next() => {
                        if let Some(event) = TuiEvent::from_terminal(event) {
                            yield event;
                        }
                    }
                    frame = frames.recv() => match frame {
                        Err(broadcast::error::RecvError::Closed) => break,
                        // A lagged receiver still owes one repaint.
                        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => yield TuiEvent::Draw,
                    },
                }
            }
        })
    }

    pub fn draw(&mut self, render: impl FnOnce(&mut Frame)) -> Result<()> {
        self.terminal.draw(render)?;
        Ok(())
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        let _ = leave_terminal();
    }
}

/// Cloneable handle for asking the app to repaint.
#[derive(Clone, Debug)]
pub struct FrameRequester {
    requests: mpsc::UnboundedSender<()>,
}

impl FrameRequester {
    pub fn schedule_frame(&self) {
        let _ = self.requests.send(());
    }
}

/// Turn repaint requests into frames, at most one per `gap`.
///
/// Requests arriving while a frame is pending join it. Ends when every
/// requester is gone.
async fn pace_frames(
    mut requests: mpsc::UnboundedReceiver<()>,
    frames: broadcast::Sender<()>,
    gap: Duration,
) {
    let mut last_frame: Option<Instant> = None;
    while requests.recv().await.is_some() {
        if let Some(at) = last_frame {
            tokio::time::sleep_until(at + gap).await;
        }
        while requests.try_recv().is_ok() {}
        let _ = frames.send(());
        last_frame = Some(Instant::now());
    }
}

fn enter_terminal() -> io::Result<()> {
    enable_raw_mode()?;
    execute!(
        io::stdout(),
        EnterAlternateScreen,
        EnableBracketedPaste,
        EnableMouseCapture
    )
}

fn leave_terminal() -> io::Result<()> {
    disable_raw_mode()?;
    execute!(
        io::stdout(),
        DisableMouseCapture,
        DisableBracketedPaste,
        LeaveAlternateScreen
    )
}

/// A panic must not leave the shell in raw mode with the report hidden on
/// the alternate screen.
fn install_panic_restore() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = leave_terminal();
        previous(info);
    }));
}
