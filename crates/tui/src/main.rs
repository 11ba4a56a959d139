//! Standalone `pw-tui` binary.
//!
//! Usage: `pw-tui [EXECUTION_ID]...`, run from the project root containing
//! `.pipewatch/config.toml`.

use anyhow::Result;
use pw_core::config::loader::{load_config, CONFIG_DIR};
use pw_tui::logging::init_file_logging;
use pw_tui::{run_app, AppOptions};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let root = PathBuf::from(".");
    init_file_logging(&root.join(CONFIG_DIR).join("tui.log"))?;

    let config = load_config(&root).await?;
    run_app(AppOptions {
        config,
        execution_ids: std::env::args().skip(1).collect(),
        export_dir: root,
    })
    .await
}
