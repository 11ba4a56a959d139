//! Registry of monitoring sessions, one per execution.
//!
//! The MonitorManager lets a consumer watch several executions at once
//! while sharing one event channel and one pair of transports.

use crate::channel::Connector;
use crate::poller::StateFetcher;
use crate::session::{start_monitoring, MonitorEvent, SessionError, SessionHandle};
use pw_protocol::MonitorConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Starts, tracks and stops monitoring sessions.
pub struct MonitorManager {
    /// Live sessions, indexed by execution id.
    sessions: Arc<Mutex<HashMap<String, SessionHandle>>>,

    config: MonitorConfig,
    connector: Arc<dyn Connector>,
    fetcher: Arc<dyn StateFetcher>,

    /// Channel every session reports to.
    events_tx: mpsc::UnboundedSender<MonitorEvent>,
}

impl MonitorManager {
    /// Create a new MonitorManager.
    ///
    /// # Arguments
    ///
    /// * `config` - Settings applied to every session
    /// * `connector` - Opens push connections
    /// * `fetcher` - Fetches full execution state
    /// * `events_tx` - Channel receiving the events of all sessions
    pub fn new(
        config: MonitorConfig,
        connector: Arc<dyn Connector>,
        fetcher: Arc<dyn StateFetcher>,
        events_tx: mpsc::UnboundedSender<MonitorEvent>,
    ) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config,
            connector,
            fetcher,
            events_tx,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Start monitoring an execution.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyMonitoring` if a session for the
    /// execution is still live.
    pub async fn start_monitoring(&self, execution_id: &str) -> Result<SessionHandle, SessionError> {
        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions.get(execution_id) {
            if !existing.is_stopped() {
                return Err(SessionError::AlreadyMonitoring(execution_id.to_string()));
            }
        }

        let handle = start_monitoring(
            &self.config,
            execution_id,
            Arc::clone(&self.connector),
            Arc::clone(&self.fetcher),
            self.events_tx.clone(),
        );
        sessions.insert(execution_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Stop monitoring an execution and wait for its session to end.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotMonitoring` if there is no such session.
    pub async fn stop_monitoring(&self, execution_id: &str) -> Result<(), SessionError> {
        let handle = self.sessions.lock().await.remove(execution_id);

        match handle {
            Some(handle) => {
                handle.stop().await;
                Ok(())
            }
            None => Err(SessionError::NotMonitoring(execution_id.to_string())),
        }
    }

    /// Stop every session.
    pub async fn stop_all(&self) {
        let handles: Vec<SessionHandle> = self.sessions.lock().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.stop().await;
        }
    }

    pub async fn session(&self, execution_id: &str) -> Option<SessionHandle> {
        self.sessions.lock().await.get(execution_id).cloned()
    }

    /// Execution ids of all tracked sessions, sorted.
    pub async fn execution_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_monitoring(&self, execution_id: &str) -> bool {
        self.sessions
            .lock()
            .await
            .get(execution_id)
            .is_some_and(|handle| !handle.is_stopped())
    }
}
