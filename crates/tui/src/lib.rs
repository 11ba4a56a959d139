//! # pw-tui
//!
//! Terminal view of live pipeline executions.
//!
//! The TUI watches one or more executions through a `pw-core`
//! `MonitorManager`, shows their steps and logs, follows the log stream
//! unless the user scrolls away, and forwards control commands (stop,
//! restart, retry, ...) to the monitoring sessions.

pub mod app;
pub mod event;
pub mod event_handler;
pub mod logging;
pub mod tui;
pub mod widgets;

pub use app::App;
pub use tui::Tui;

use anyhow::Result;
use pw_core::{http_transports, MonitorManager};
use pw_protocol::MonitorConfig;
use std::path::PathBuf;
use tokio::sync::mpsc::unbounded_channel;

/// What to watch and where exports go.
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub config: MonitorConfig,
    /// Executions to watch on startup.
    pub execution_ids: Vec<String>,
    /// Default directory for `/export`.
    pub export_dir: PathBuf,
}

/// Run the TUI until the user quits, then stop every session.
pub async fn run_app(options: AppOptions) -> Result<()> {
    let (connector, fetcher) = http_transports(&options.config)?;
    let (events_tx, events_rx) = unbounded_channel();
    let manager = MonitorManager::new(options.config, connector, fetcher, events_tx);

    let mut app = App::new(manager, events_rx, options.export_dir);
    for execution_id in &options.execution_ids {
        if let Err(message) = app.watch(execution_id).await {
            app.status_message = Some(message);
        }
    }

    let mut tui = Tui::init()?;
    let result = app.run(&mut tui).await;
    app.shutdown().await;
    tui.restore()?;
    result
}
