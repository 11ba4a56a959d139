//! Execution and step state models.
//!
//! These are the authoritative, reconciled views of one monitored pipeline
//! execution. Only the state reconciler in `pw-core` mutates them; consumers
//! receive clones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Lifecycle status of a whole pipeline execution.
///
/// Normal progression is Starting -> Running -> Success. Failed and
/// Cancelled are the other terminal states.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Execution was accepted but no step has started yet.
    #[default]
    Starting,

    /// At least one step is executing.
    Running,

    /// All steps finished and the pipeline succeeded.
    Success,

    /// The pipeline stopped because a step failed.
    Failed,

    /// The pipeline was stopped on request.
    Cancelled,
}

impl ExecutionStatus {
    /// Whether no further transitions are expected without a restart.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Whether the execution is still making progress.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

/// Status of a single step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Terminal step statuses count as completed for progress purposes.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }
}

/// Distinguishes plain steps from groups of steps executed in parallel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[default]
    Step,
    ParallelGroup,
}

/// Reconciled execution-level state.
///
/// One instance exists per monitored execution.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct ExecutionState {
    /// Server-side identifier of the execution.
    pub execution_id: String,

    pub status: ExecutionStatus,

    pub total_steps: u32,

    pub successful_steps: u32,

    pub failed_steps: u32,

    /// Wall-clock time spent so far, as reported by the server.
    pub execution_time_seconds: f64,

    /// Name of the pipeline, once the server has told us.
    pub pipeline_name: Option<String>,

    /// Last human-readable status message from the server.
    pub message: Option<String>,

    /// Timestamp of the input that last replaced the execution-level fields.
    ///
    /// `None` until the first update or snapshot is applied.
    pub last_updated: Option<DateTime<Utc>>,
}

impl ExecutionState {
    /// Create the initial state for an execution that has not reported yet.
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            status: ExecutionStatus::Starting,
            total_steps: 0,
            successful_steps: 0,
            failed_steps: 0,
            execution_time_seconds: 0.0,
            pipeline_name: None,
            message: None,
            last_updated: None,
        }
    }
}

/// Reconciled state of one step.
///
/// Parallel groups own their children; a `step_id` appears in exactly one
/// place of the step tree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct StepState {
    pub step_id: String,

    pub name: String,

    pub status: StepStatus,

    pub execution_time_seconds: Option<f64>,

    /// Captured standard output of the step, if the server sent it.
    pub output: Option<String>,

    pub error_message: Option<String>,

    pub last_updated: DateTime<Utc>,

    pub kind: StepKind,

    /// Child steps of a parallel group, in server order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StepState>,
}

impl StepState {
    /// Number of leaf steps below and including this node.
    ///
    /// A parallel group without children counts as a single leaf.
    pub fn leaf_count(&self) -> usize {
        if self.children.is_empty() {
            1
        } else {
            self.children.iter().map(StepState::leaf_count).sum()
        }
    }

    /// Number of terminal leaf steps below and including this node.
    pub fn completed_leaf_count(&self) -> usize {
        if self.children.is_empty() {
            usize::from(self.status.is_terminal())
        } else {
            self.children
                .iter()
                .map(StepState::completed_leaf_count)
                .sum()
        }
    }

    /// Find a step by id in this subtree.
    pub fn find(&self, step_id: &str) -> Option<&StepState> {
        if self.step_id == step_id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(step_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, status: StepStatus) -> StepState {
        StepState {
            step_id: id.to_string(),
            name: id.to_string(),
            status,
            execution_time_seconds: None,
            output: None,
            error_message: None,
            last_updated: Utc::now(),
            kind: StepKind::Step,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ExecutionStatus::Success.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Starting.is_active());

        assert!(StepStatus::Skipped.is_terminal());
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
    }

    #[test]
    fn test_leaf_counts_for_parallel_group() {
        let mut group = step("group", StepStatus::Running);
        group.kind = StepKind::ParallelGroup;
        group.children = vec![
            step("a", StepStatus::Success),
            step("b", StepStatus::Running),
            step("c", StepStatus::Skipped),
        ];

        assert_eq!(group.leaf_count(), 3);
        assert_eq!(group.completed_leaf_count(), 2);
        assert_eq!(group.find("b").map(|s| s.status), Some(StepStatus::Running));
        assert!(group.find("missing").is_none());
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_value(ExecutionStatus::Cancelled).unwrap();
        assert_eq!(json, "cancelled");

        let kind: StepKind = serde_json::from_value(serde_json::json!("parallel_group")).unwrap();
        assert_eq!(kind, StepKind::ParallelGroup);
    }
}
