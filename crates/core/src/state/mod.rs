//! In-memory state of a monitored execution.
//!
//! This module provides:
//! - The reconciler merging push frames and poll snapshots
//! - The bounded log buffer and its auto-follow heuristic

pub mod log_buffer;
pub mod reconciler;

pub use log_buffer::{AutoFollow, LogStreamBuffer, ScrollMetrics};
pub use reconciler::{MergeOutcome, StateReconciler};
