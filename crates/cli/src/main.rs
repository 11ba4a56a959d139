//! `pipewatch` command line.
//!
//! Without a subcommand the TUI starts with no executions watched.

mod output;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use colored::Colorize;
use output::{format_connection_line, format_log_line, format_status_line, LogCursor};
use pw_core::config::loader::{apply_token_override, load_config, validate, CONFIG_DIR};
use pw_core::poller::StateFetcher;
use pw_core::teardown::install_ctrl_c_hook;
use pw_core::{http_transports, start_monitoring, MonitorEvent};
use pw_protocol::{ExecutionStatus, MonitorConfig};
use pw_tui::logging::{init_file_logging, LOG_ENV};
use pw_tui::{run_app, AppOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::mpsc::unbounded_channel;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pipewatch", version, about = "Watch pipeline executions live")]
struct Cli {
    /// Project root holding `.pipewatch/config.toml`
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Override the push channel endpoint
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Override the REST API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Override the auth token (takes precedence over PIPEWATCH_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Open the dashboard, optionally watching the given executions
    Watch { execution_ids: Vec<String> },

    /// Stream one execution's status and logs until it finishes
    Tail { execution_id: String },

    /// Print the complete log of an execution
    Logs {
        execution_id: String,

        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Print the resolved configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let config = resolve_config(&cli).await?;

    match cli.command.unwrap_or(Command::Watch {
        execution_ids: Vec::new(),
    }) {
        Command::Watch { execution_ids } => {
            init_file_logging(&cli.root.join(CONFIG_DIR).join("tui.log"))
                .map_err(|e| eyre!(e))?;
            run_app(AppOptions {
                config,
                execution_ids,
                export_dir: cli.root,
            })
            .await
            .map_err(|e| eyre!(e))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Tail { execution_id } => {
            init_stderr_logging();
            let status = tail(config, &execution_id).await?;
            Ok(match status {
                ExecutionStatus::Failed | ExecutionStatus::Cancelled => ExitCode::FAILURE,
                _ => ExitCode::SUCCESS,
            })
        }
        Command::Logs {
            execution_id,
            output,
        } => {
            init_stderr_logging();
            logs(&config, &execution_id, output.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            let mut shown = config;
            if shown.token.is_some() {
                shown.token = Some("********".to_string());
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// File config, then `PIPEWATCH_TOKEN`, then command-line flags.
async fn resolve_config(cli: &Cli) -> Result<MonitorConfig> {
    let mut config = load_config(&cli.root).await?;
    if let Some(ws_url) = &cli.ws_url {
        config.ws_url = ws_url.clone();
    }
    if let Some(api_url) = &cli.api_url {
        config.api_base_url = api_url.clone();
    }
    apply_token_override(&mut config, cli.token.clone());
    validate(&config, Path::new("command line"))?;
    debug!(ws_url = %config.ws_url, api_base_url = %config.api_base_url, "resolved configuration");
    Ok(config)
}

fn init_stderr_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Follow one execution on stdout. Returns its last known status.
async fn tail(config: MonitorConfig, execution_id: &str) -> Result<ExecutionStatus> {
    let (connector, fetcher) = http_transports(&config)?;
    let (events_tx, mut events_rx) = unbounded_channel();
    let handle = start_monitoring(&config, execution_id, connector, fetcher, events_tx);
    let ctrl_c = install_ctrl_c_hook();

    let mut cursor = LogCursor::default();
    let mut last_status = None;

    while let Some(event) = events_rx.recv().await {
        match event {
            MonitorEvent::LogsAppended { .. } => {
                for entry in cursor.unseen(&handle.logs().await) {
                    println!("{}", format_log_line(entry));
                }
            }
            MonitorEvent::LogsCleared { .. } => cursor.reset(),
            MonitorEvent::ConnectionChanged { status, .. } => {
                eprintln!("{}", format_connection_line(&status));
            }
            MonitorEvent::ExecutionChanged {
                execution,
                progress,
                ..
            } => {
                if last_status != Some(execution.status) {
                    println!("{}", format_status_line(&execution, progress));
                    last_status = Some(execution.status);
                }
                if execution.status.is_terminal() {
                    for entry in cursor.unseen(&handle.logs().await) {
                        println!("{}", format_log_line(entry));
                    }
                    break;
                }
            }
            MonitorEvent::CommandDropped { kind, reason, .. } => {
                eprintln!("{} {kind} not sent: {reason}", "--".dimmed());
            }
            MonitorEvent::SessionEnded { .. } => break,
            _ => {}
        }
    }

    handle.stop().await;
    ctrl_c.abort();
    Ok(handle.execution().await.status)
}

async fn logs(config: &MonitorConfig, execution_id: &str, output: Option<&Path>) -> Result<()> {
    let (_, fetcher) = http_transports(config)?;
    let text = fetcher
        .fetch_full_logs(execution_id)
        .await
        .wrap_err_with(|| format!("fetching logs for {execution_id}"))?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &text)
                .await
                .wrap_err_with(|| format!("writing {}", path.display()))?;
            eprintln!("wrote {} bytes to {}", text.len(), path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}
