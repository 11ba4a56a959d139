//! Integration tests for the commands a consumer sends through a
//! `SessionHandle`.

mod common;

use common::*;
use pw_core::state::ScrollMetrics;
use pw_core::{start_monitoring, MonitorEvent, SessionError, SessionHandle};
use pw_protocol::{ConnectionState, ExecutionStatus, MonitorConfig, StepStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Harness {
    handle: SessionHandle,
    connector: Arc<MockConnector>,
    server: MockServer,
    fetcher: Arc<ScriptedFetcher>,
    events_rx: mpsc::UnboundedReceiver<MonitorEvent>,
}

fn harness_with(config: MonitorConfig) -> Harness {
    let (connector, server) = MockConnector::new();
    let fetcher = ScriptedFetcher::new();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let handle = start_monitoring(
        &config,
        "exec-cmd",
        connector.clone(),
        fetcher.clone(),
        events_tx,
    );
    Harness {
        handle,
        connector,
        server,
        fetcher,
        events_rx,
    }
}

fn harness() -> Harness {
    harness_with(test_config())
}

#[tokio::test(start_paused = true)]
async fn test_stop_execution_sends_control_frame() {
    let mut h = harness();
    let mut conn = h.server.accept().await;
    conn.expect_handshake(true).await;
    wait_for_connection(&mut h.events_rx, ConnectionState::Connected).await;

    h.handle.stop_execution().await.unwrap();

    let frame = conn.next_frame().await;
    assert_eq!(frame["type"], "stop_execution");
    assert_eq!(frame["executionId"], "exec-cmd");
    wait_for(&mut h.events_rx, |event| {
        matches!(event, MonitorEvent::CommandSent { kind: "stop_execution", .. })
    })
    .await;

    h.handle.restart_execution().await.unwrap();
    assert_eq!(conn.next_frame().await["type"], "restart_execution");

    h.handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_control_frame_dropped_while_disconnected() {
    let mut h = harness();
    h.connector.set_refuse(true);

    h.handle.restart_execution().await.unwrap();

    let (event, _) = wait_for(&mut h.events_rx, |event| {
        matches!(event, MonitorEvent::CommandDropped { .. })
    })
    .await;
    match event {
        MonitorEvent::CommandDropped { kind, reason, .. } => {
            assert_eq!(kind, "restart_execution");
            assert!(!reason.is_empty());
        }
        other => panic!("unexpected event {other:?}"),
    }

    h.handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_attempts_exhausted() {
    let mut h = harness_with(MonitorConfig {
        max_reconnect_attempts: 2,
        ..test_config()
    });
    h.connector.set_refuse(true);

    let seen = wait_for_connection(&mut h.events_rx, ConnectionState::Failed).await;
    assert!(seen.iter().any(|event| matches!(
        event,
        MonitorEvent::ConnectionChanged { status, .. } if status.state == ConnectionState::Reconnecting
    )));
    assert_eq!(h.connector.attempts(), 3);
    assert!(h.handle.connection().await.last_error.is_some());

    h.connector.set_refuse(false);
    h.handle.retry().await.unwrap();

    let mut conn = h.server.accept().await;
    conn.expect_handshake(true).await;
    wait_for_connection(&mut h.events_rx, ConnectionState::Connected).await;
    let status = h.handle.connection().await;
    assert_eq!(status.attempt, 0);
    assert!(status.last_error.is_none());

    h.handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_retry_while_connected_is_ignored() {
    let mut h = harness();
    let mut conn = h.server.accept().await;
    conn.expect_handshake(true).await;
    wait_for_connection(&mut h.events_rx, ConnectionState::Connected).await;

    h.handle.retry().await.unwrap();
    h.handle.clear_logs().await.unwrap();
    wait_for(&mut h.events_rx, |event| matches!(event, MonitorEvent::LogsCleared { .. })).await;

    assert_eq!(h.connector.attempts(), 1);
    assert_eq!(h.handle.connection().await.state, ConnectionState::Connected);

    h.handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_refresh_applies_snapshot() {
    let mut h = harness();
    let mut conn = h.server.accept().await;
    conn.expect_handshake(true).await;
    wait_for_connection(&mut h.events_rx, ConnectionState::Connected).await;

    h.fetcher.set_snapshot(Some(snapshot(
        ExecutionStatus::Running,
        vec![snapshot_step("lint", StepStatus::Success)],
    )));
    h.handle.refresh().await.unwrap();

    wait_for(&mut h.events_rx, |event| {
        matches!(event, MonitorEvent::StepsChanged { steps, .. } if completed_steps(steps) == 1)
    })
    .await;
    assert!(h.fetcher.calls() >= 1);
    assert_eq!(h.handle.execution().await.pipeline_name.as_deref(), Some("deploy-api"));

    h.handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_clear_logs_empties_buffer_and_rearms_follow() {
    let mut h = harness();
    let mut conn = h.server.accept().await;
    conn.expect_handshake(true).await;
    wait_for_connection(&mut h.events_rx, ConnectionState::Connected).await;

    conn.push(&log_update("first"));
    conn.push(&log_update("second"));
    let mut appended = 0;
    wait_for(&mut h.events_rx, |event| {
        if let MonitorEvent::LogsAppended { count, .. } = event {
            appended += count;
        }
        appended == 2
    })
    .await;
    h.handle.acknowledge_scrolled().await;

    h.handle.clear_logs().await.unwrap();
    wait_for(&mut h.events_rx, |event| matches!(event, MonitorEvent::LogsCleared { .. })).await;
    assert!(h.handle.logs().await.is_empty());

    conn.push(&log_update("third"));
    wait_for(&mut h.events_rx, |event| matches!(event, MonitorEvent::LogsAppended { .. })).await;
    let logs = h.handle.logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "third");
    assert!(h.handle.should_auto_scroll().await);

    h.handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_fetch_full_logs_uses_fetcher() {
    let h = harness();

    assert!(matches!(
        h.handle.fetch_full_logs().await,
        Err(SessionError::Fetch(_))
    ));

    h.fetcher.set_full_logs("line one\nline two\n");
    assert_eq!(h.handle.fetch_full_logs().await.unwrap(), "line one\nline two\n");

    h.handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_commands_after_stop_are_rejected() {
    let mut h = harness();

    h.handle.stop().await;
    h.handle.stop().await;

    assert!(h.handle.is_stopped());
    assert!(matches!(
        h.handle.stop_execution().await,
        Err(SessionError::Stopped(id)) if id == "exec-cmd"
    ));
    assert!(matches!(h.handle.refresh().await, Err(SessionError::Stopped(_))));

    let (_, seen) = wait_for(&mut h.events_rx, |event| {
        matches!(event, MonitorEvent::SessionEnded { .. })
    })
    .await;
    assert!(seen.iter().all(|event| event.execution_id() == "exec-cmd"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_fetch_is_never_doubled() {
    let mut h = harness();
    h.connector.set_refuse(true);
    h.fetcher.set_delay(Duration::from_secs(3));
    h.fetcher.set_snapshot(Some(snapshot(
        ExecutionStatus::Running,
        vec![snapshot_step("build", StepStatus::Running)],
    )));

    // Both poll intervals elapse several times while the first fetch runs.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    h.handle.refresh().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(h.fetcher.calls(), 1);

    wait_for(&mut h.events_rx, |event| {
        matches!(event, MonitorEvent::StepsChanged { .. })
    })
    .await;
    assert_eq!(h.handle.steps().await.len(), 1);

    h.handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_fetch_in_flight_at_stop_is_discarded() {
    let h = harness();
    h.connector.set_refuse(true);
    h.fetcher.set_delay(Duration::from_secs(3));
    h.fetcher.set_snapshot(Some(snapshot(
        ExecutionStatus::Running,
        vec![snapshot_step("build", StepStatus::Running)],
    )));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.fetcher.calls(), 1);

    h.handle.stop().await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(h.handle.steps().await.is_empty());
    assert_eq!(h.handle.execution().await.status, ExecutionStatus::Starting);
    assert_eq!(h.fetcher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_follow_resumes_once_content_settles_in_band() {
    let h = harness();
    h.connector.set_refuse(true);

    h.handle
        .report_scroll(ScrollMetrics::new(300.0, 100.0, 500.0))
        .await;
    assert!(!h.handle.should_auto_scroll().await);

    // The log shrank under a still viewport; the viewer is back in the band.
    h.handle
        .report_viewport(ScrollMetrics::new(300.0, 100.0, 410.0))
        .await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!h.handle.should_auto_scroll().await);

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(h.handle.should_auto_scroll().await);

    h.handle.stop().await;
}
