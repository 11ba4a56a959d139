//! Writes TypeScript bindings for the pipewatch protocol.
//!
//! Usage: `pw-protocol-ts [OUT_DIR]` (defaults to `./bindings`).
//! The browser console imports the generated files so both sides agree on
//! frame and snapshot shapes.

use anyhow::{Context, Result};
use pw_protocol::{
    ClientFrame, ConnectionStatus, ExecutionSnapshot, ExecutionState, ExecutionUpdate, LogEntry,
    LogUpdate, MessageType, MonitorConfig, StepState, StepUpdate,
};
use std::path::PathBuf;
use ts_rs::TS;

fn main() -> Result<()> {
    let out_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("bindings"));

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    // export_all_to also writes every type these depend on.
    ClientFrame::export_all_to(&out_dir)?;
    ConnectionStatus::export_all_to(&out_dir)?;
    ExecutionSnapshot::export_all_to(&out_dir)?;
    ExecutionState::export_all_to(&out_dir)?;
    ExecutionUpdate::export_all_to(&out_dir)?;
    LogEntry::export_all_to(&out_dir)?;
    LogUpdate::export_all_to(&out_dir)?;
    MessageType::export_all_to(&out_dir)?;
    MonitorConfig::export_all_to(&out_dir)?;
    StepState::export_all_to(&out_dir)?;
    StepUpdate::export_all_to(&out_dir)?;

    println!("TypeScript bindings written to {}", out_dir.display());
    Ok(())
}
