//! Integration test for process-wide teardown.
//!
//! Kept in its own test binary: the teardown registry is global, so any
//! session started by a concurrent test would be cancelled too.

mod common;

use common::*;
use pw_core::teardown::{registered_count, teardown_all};
use pw_core::{start_monitoring, MonitorEvent, SessionError};
use pw_protocol::ConnectionState;
use tokio::sync::mpsc;

#[tokio::test(start_paused = true)]
async fn test_teardown_all_ends_every_session_once() {
    let (connector, mut server) = MockConnector::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let first = start_monitoring(
        &test_config(),
        "exec-1",
        connector.clone(),
        ScriptedFetcher::new(),
        events_tx.clone(),
    );
    let second = start_monitoring(
        &test_config(),
        "exec-2",
        connector,
        ScriptedFetcher::new(),
        events_tx,
    );
    assert_eq!(registered_count(), 2);

    for _ in 0..2 {
        server.accept().await.expect_handshake(true).await;
    }
    wait_for_connection(&mut events_rx, ConnectionState::Connected).await;

    assert_eq!(teardown_all(), 2);
    assert_eq!(teardown_all(), 0);
    assert_eq!(registered_count(), 0);

    let mut ended = Vec::new();
    while ended.len() < 2 {
        let (event, _) = wait_for(&mut events_rx, |event| {
            matches!(event, MonitorEvent::SessionEnded { .. })
        })
        .await;
        ended.push(event.execution_id().to_string());
    }
    ended.sort();
    assert_eq!(ended, vec!["exec-1", "exec-2"]);

    assert!(first.is_stopped());
    assert!(matches!(
        second.clear_logs().await,
        Err(SessionError::Stopped(_))
    ));

    // Stopping after teardown is a no-op.
    first.stop().await;
    second.stop().await;
    assert_eq!(second.connection().await.state, ConnectionState::Disconnected);
}
