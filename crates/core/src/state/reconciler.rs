//! Merge of push frames and poll snapshots into one execution view.
//!
//! Push frames always win: they are applied as they arrive. Poll snapshots
//! are merged conservatively. A snapshot only overwrites what is older
//! than itself, never moves a terminal status back, never lowers the step
//! counters and never removes steps.

use chrono::{DateTime, Utc};
use pw_protocol::{
    ExecutionSnapshot, ExecutionState, ExecutionStatus, ExecutionUpdate, StepKind, StepSnapshot,
    StepState, StepUpdate,
};

/// What a snapshot merge changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub execution_changed: bool,
    pub steps_changed: bool,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.execution_changed || self.steps_changed
    }
}

#[derive(Debug, Clone)]
pub struct StateReconciler {
    execution: ExecutionState,
    steps: Vec<StepState>,
}

impl StateReconciler {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution: ExecutionState::new(execution_id),
            steps: Vec::new(),
        }
    }

    pub fn execution(&self) -> &ExecutionState {
        &self.execution
    }

    pub fn steps(&self) -> &[StepState] {
        &self.steps
    }

    pub fn find_step(&self, step_id: &str) -> Option<&StepState> {
        self.steps.iter().find_map(|step| step.find(step_id))
    }

    /// Replace the execution-level fields with a pushed update.
    pub fn apply_execution_update(&mut self, update: &ExecutionUpdate) {
        let execution = &mut self.execution;
        execution.status = update.status;
        execution.total_steps = update.total_steps;
        execution.successful_steps = update.successful_steps;
        execution.failed_steps = update.failed_steps;
        execution.execution_time_seconds = update.execution_time;
        execution.message = update.message.clone();
        if update.pipeline_name.is_some() {
            execution.pipeline_name = update.pipeline_name.clone();
        }
        execution.last_updated = Some(update.timestamp);
    }

    /// Insert or update a step from a pushed update.
    ///
    /// An existing step is updated in place wherever it lives, keeping its
    /// children. A new step goes into the group named by `parent_step_id`
    /// when that group exists, otherwise to the end of the top level.
    pub fn apply_step_update(&mut self, update: &StepUpdate) {
        if let Some(step) = find_step_mut(&mut self.steps, &update.step_id) {
            step.name = update.step_name.clone();
            step.status = update.status;
            if update.execution_time.is_some() {
                step.execution_time_seconds = update.execution_time;
            }
            if update.output.is_some() {
                step.output = update.output.clone();
            }
            if update.error_message.is_some() {
                step.error_message = update.error_message.clone();
            }
            if update.step_type == StepKind::ParallelGroup {
                step.kind = StepKind::ParallelGroup;
            }
            step.last_updated = update.timestamp;
            return;
        }

        let step = StepState {
            step_id: update.step_id.clone(),
            name: update.step_name.clone(),
            status: update.status,
            execution_time_seconds: update.execution_time,
            output: update.output.clone(),
            error_message: update.error_message.clone(),
            last_updated: update.timestamp,
            kind: update.step_type,
            children: Vec::new(),
        };

        let parent = update
            .parent_step_id
            .as_deref()
            .and_then(|parent_id| find_step_mut(&mut self.steps, parent_id));

        match parent {
            Some(parent) => {
                parent.kind = StepKind::ParallelGroup;
                parent.children.push(step);
            }
            None => self.steps.push(step),
        }
    }

    /// Merge a polled snapshot.
    ///
    /// `requested_at` is when the fetch was issued; it stands in for the
    /// snapshot time when the server did not send one.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &ExecutionSnapshot,
        requested_at: DateTime<Utc>,
    ) -> MergeOutcome {
        let snapshot_time = snapshot.timestamp.unwrap_or(requested_at);
        let execution_changed = self.merge_execution(snapshot, snapshot_time);
        let steps_changed = merge_steps(&mut self.steps, &snapshot.steps, snapshot_time);

        MergeOutcome {
            execution_changed,
            steps_changed,
        }
    }

    fn merge_execution(&mut self, snapshot: &ExecutionSnapshot, snapshot_time: DateTime<Utc>) -> bool {
        let execution = &mut self.execution;
        if execution.last_updated.is_some_and(|current| snapshot_time <= current) {
            return false;
        }

        let before = execution.clone();

        if !(execution.status.is_terminal() && !snapshot.status.is_terminal()) {
            execution.status = snapshot.status;
        }
        execution.total_steps = execution.total_steps.max(snapshot.total_steps);
        execution.successful_steps = execution.successful_steps.max(snapshot.successful_steps);
        execution.failed_steps = execution.failed_steps.max(snapshot.failed_steps);
        execution.execution_time_seconds = snapshot.execution_time;
        if snapshot.message.is_some() {
            execution.message = snapshot.message.clone();
        }
        if snapshot.pipeline_name.is_some() {
            execution.pipeline_name = snapshot.pipeline_name.clone();
        }
        execution.last_updated = Some(snapshot_time);

        *execution != before
    }

    /// Completion percentage in `0..=100`.
    ///
    /// Terminal executions are always complete. Otherwise completion is the
    /// share of terminal leaf steps, measured against the larger of the
    /// known leaves and the announced step count. Without steps a running
    /// execution reports half way.
    pub fn progress(&self) -> u8 {
        if self.execution.status.is_terminal() {
            return 100;
        }
        if self.steps.is_empty() {
            return if self.execution.status == ExecutionStatus::Running {
                50
            } else {
                0
            };
        }

        let leaves: usize = self.steps.iter().map(StepState::leaf_count).sum();
        let completed: usize = self.steps.iter().map(StepState::completed_leaf_count).sum();
        let total = leaves.max(self.execution.total_steps as usize);

        let percent = (completed as f64 * 100.0 / total as f64).round();
        percent.clamp(0.0, 100.0) as u8
    }
}

fn find_step_mut<'a>(steps: &'a mut [StepState], step_id: &str) -> Option<&'a mut StepState> {
    for step in steps.iter_mut() {
        if step.step_id == step_id {
            return Some(step);
        }
        if let Some(found) = find_step_mut(&mut step.children, step_id) {
            return Some(found);
        }
    }
    None
}

fn merge_steps(
    steps: &mut Vec<StepState>,
    incoming: &[StepSnapshot],
    snapshot_time: DateTime<Utc>,
) -> bool {
    // Parents come before their children, so a new child always finds its
    // group already in place.
    let mut flat = Vec::new();
    flatten(incoming, None, &mut flat);

    let mut changed = false;
    for (snap, parent_id) in flat {
        let step_time = snap.timestamp.unwrap_or(snapshot_time);

        if let Some(step) = find_step_mut(steps, &snap.step_id) {
            if step_time <= step.last_updated
                || (step.status.is_terminal() && !snap.status.is_terminal())
            {
                continue;
            }
            let before = step.clone();
            step.name = snap.step_name.clone();
            step.status = snap.status;
            if snap.execution_time.is_some() {
                step.execution_time_seconds = snap.execution_time;
            }
            if snap.output.is_some() {
                step.output = snap.output.clone();
            }
            if snap.error_message.is_some() {
                step.error_message = snap.error_message.clone();
            }
            if snap.step_type == StepKind::ParallelGroup {
                step.kind = StepKind::ParallelGroup;
            }
            step.last_updated = step_time;
            changed |= *step != before;
            continue;
        }

        let step = StepState {
            step_id: snap.step_id.clone(),
            name: snap.step_name.clone(),
            status: snap.status,
            execution_time_seconds: snap.execution_time,
            output: snap.output.clone(),
            error_message: snap.error_message.clone(),
            last_updated: step_time,
            kind: snap.step_type,
            children: Vec::new(),
        };
        match parent_id.and_then(|id| find_step_mut(steps, id)) {
            Some(parent) => {
                parent.kind = StepKind::ParallelGroup;
                parent.children.push(step);
            }
            None => steps.push(step),
        }
        changed = true;
    }

    changed
}

fn flatten<'a>(
    incoming: &'a [StepSnapshot],
    parent_id: Option<&'a str>,
    out: &mut Vec<(&'a StepSnapshot, Option<&'a str>)>,
) {
    for snap in incoming {
        out.push((snap, parent_id));
        flatten(&snap.children, Some(snap.step_id.as_str()), out);
    }
}
