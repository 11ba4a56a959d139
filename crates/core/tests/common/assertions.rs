//! Event helpers and custom assertions for session tests.

#![allow(dead_code)]

use pw_core::MonitorEvent;
use pw_protocol::{ConnectionState, StepState};
use std::time::Duration;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(60);

/// Receive events until one matches `predicate`, returning it together with
/// every event seen on the way (the match included).
pub async fn wait_for<F>(
    rx: &mut mpsc::UnboundedReceiver<MonitorEvent>,
    mut predicate: F,
) -> (MonitorEvent, Vec<MonitorEvent>)
where
    F: FnMut(&MonitorEvent) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        seen.push(event.clone());
        if predicate(&event) {
            return (event, seen);
        }
    }
}

/// Wait until the session reports the given connection state.
pub async fn wait_for_connection(
    rx: &mut mpsc::UnboundedReceiver<MonitorEvent>,
    state: ConnectionState,
) -> Vec<MonitorEvent> {
    let (_, seen) = wait_for(rx, |event| {
        matches!(event, MonitorEvent::ConnectionChanged { status, .. } if status.state == state)
    })
    .await;
    seen
}

/// Number of terminal leaf steps.
pub fn completed_steps(steps: &[StepState]) -> usize {
    steps.iter().map(StepState::completed_leaf_count).sum()
}

/// Assert that the completed-step count never decreases across the
/// `StepsChanged` events in `events`.
pub fn assert_completed_never_decreases(events: &[MonitorEvent]) {
    let mut highest = 0;
    for event in events {
        if let MonitorEvent::StepsChanged { steps, .. } = event {
            let completed = completed_steps(steps);
            assert!(
                completed >= highest,
                "completed steps went from {highest} down to {completed}"
            );
            highest = completed;
        }
    }
}

/// Assert that every step, nested ones included, is terminal.
pub fn assert_all_terminal(steps: &[StepState]) {
    for step in steps {
        assert!(step.status.is_terminal(), "step {} is {:?}", step.step_id, step.status);
        assert_all_terminal(&step.children);
    }
}
