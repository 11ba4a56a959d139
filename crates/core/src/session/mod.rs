//! Monitoring sessions.
//!
//! [`start_monitoring`] spawns one actor task per execution. The actor owns
//! the push link and the poller and is the only writer of the execution
//! state; consumers read that state and send commands through the returned
//! [`SessionHandle`], and learn about changes from a [`MonitorEvent`]
//! channel.

mod actor;
pub mod error;
pub mod events;
pub mod manager;

pub use error::SessionError;
pub use events::{MonitorEvent, SessionCommand};
pub use manager::MonitorManager;

use crate::channel::{
    Connector, HandlerError, MessageChannel, Subscription, SubscriptionRegistry, WsConnector,
};
use crate::poller::{FallbackPoller, HttpStateFetcher, StateFetcher};
use crate::reconnect::{BackoffPolicy, ReconnectionController};
use crate::state::{AutoFollow, LogStreamBuffer, ScrollMetrics, StateReconciler};
use crate::teardown::{self, TeardownGuard};
use actor::MonitorSession;
use pw_protocol::{
    ConnectionStatus, ExecutionState, LogEntry, MessageType, MonitorConfig, ServerMessage,
    StepState,
};
use std::sync::Arc;
use tokio::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything a session knows about its execution.
#[derive(Debug, Clone)]
pub struct MonitorState {
    pub connection: ConnectionStatus,
    pub reconciler: StateReconciler,
    pub logs: LogStreamBuffer,
    /// Viewer-driven; the consumer reports scrolls through the handle.
    pub follow: AutoFollow,
}

impl MonitorState {
    pub fn new(execution_id: &str, config: &MonitorConfig) -> Self {
        Self {
            connection: ConnectionStatus::default(),
            reconciler: StateReconciler::new(execution_id),
            logs: LogStreamBuffer::new(config.log_capacity),
            follow: AutoFollow::new(config.follow_tolerance, config.follow_settle()),
        }
    }
}

/// Point-in-time copy of a session's state, taken under one lock.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub connection: ConnectionStatus,
    pub execution: ExecutionState,
    pub steps: Vec<StepState>,
    pub progress: u8,
    pub logs: Vec<LogEntry>,
}

/// Consumer side of a monitoring session.
///
/// Cheap to clone. When the last clone is dropped the session stops.
#[derive(Clone)]
pub struct SessionHandle {
    execution_id: String,
    state: Arc<Mutex<MonitorState>>,
    commands_tx: mpsc::Sender<SessionCommand>,
    registry: SubscriptionRegistry,
    fetcher: Arc<dyn StateFetcher>,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    teardown: Arc<TeardownGuard>,
}

/// Start monitoring `execution_id`.
///
/// Spawns the session actor, which connects right away and falls back to
/// polling while the push channel is unavailable. Must be called within a
/// tokio runtime.
pub fn start_monitoring(
    config: &MonitorConfig,
    execution_id: impl Into<String>,
    connector: Arc<dyn Connector>,
    fetcher: Arc<dyn StateFetcher>,
    events_tx: mpsc::UnboundedSender<MonitorEvent>,
) -> SessionHandle {
    let execution_id = execution_id.into();
    let registry = SubscriptionRegistry::new();
    let state = Arc::new(Mutex::new(MonitorState::new(&execution_id, config)));
    let (commands_tx, commands_rx) = mpsc::channel(32);
    let cancel = CancellationToken::new();

    let channel = MessageChannel::with_registry(execution_id.clone(), connector, registry.clone());
    let link = ReconnectionController::new(
        channel,
        BackoffPolicy::from_config(config),
        config.token.clone(),
        config.connect_timeout(),
    );
    let poller = FallbackPoller::new(
        config.fallback_poll_interval(),
        config.running_poll_interval(),
    );

    let session = MonitorSession::new(
        execution_id.clone(),
        link,
        poller,
        Arc::clone(&fetcher),
        Arc::clone(&state),
        events_tx,
        commands_rx,
        cancel.clone(),
    );
    let teardown = Arc::new(teardown::register(cancel.clone()));
    let task = tokio::spawn(session.run());

    SessionHandle {
        execution_id,
        state,
        commands_tx,
        registry,
        fetcher,
        cancel,
        task: Arc::new(Mutex::new(Some(task))),
        teardown,
    }
}

/// Build the WebSocket connector and HTTP fetcher described by `config`.
pub fn http_transports(
    config: &MonitorConfig,
) -> Result<(Arc<dyn Connector>, Arc<dyn StateFetcher>), SessionError> {
    let connector = WsConnector::new(&config.ws_url)?;
    let fetcher = HttpStateFetcher::new(
        &config.api_base_url,
        config.token.clone(),
        config.connect_timeout(),
    )?;
    Ok((Arc::new(connector), Arc::new(fetcher)))
}

impl SessionHandle {
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Whether the session has been asked to stop or has ended.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.commands_tx.is_closed()
    }

    pub async fn connection(&self) -> ConnectionStatus {
        self.state.lock().await.connection.clone()
    }

    pub async fn execution(&self) -> ExecutionState {
        self.state.lock().await.reconciler.execution().clone()
    }

    pub async fn steps(&self) -> Vec<StepState> {
        self.state.lock().await.reconciler.steps().to_vec()
    }

    pub async fn progress(&self) -> u8 {
        self.state.lock().await.reconciler.progress()
    }

    pub async fn logs(&self) -> Vec<LogEntry> {
        self.state.lock().await.logs.to_vec()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            connection: state.connection.clone(),
            execution: state.reconciler.execution().clone(),
            steps: state.reconciler.steps().to_vec(),
            progress: state.reconciler.progress(),
            logs: state.logs.to_vec(),
        }
    }

    async fn command(&self, command: SessionCommand) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Stopped(self.execution_id.clone()));
        }
        self.commands_tx
            .send(command)
            .await
            .map_err(|_| SessionError::Stopped(self.execution_id.clone()))
    }

    /// Ask the server to stop the execution. Dropped if not connected.
    pub async fn stop_execution(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::StopExecution).await
    }

    /// Ask the server to restart the execution. Dropped if not connected.
    pub async fn restart_execution(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::RestartExecution).await
    }

    pub async fn clear_logs(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::ClearLogs).await
    }

    /// Reconnect after the attempts were exhausted.
    pub async fn retry(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::Retry).await
    }

    /// Fetch the full state now, unless a fetch is already running.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::Refresh).await
    }

    pub async fn report_scroll(&self, metrics: ScrollMetrics) {
        self.state
            .lock()
            .await
            .follow
            .report_scroll(metrics, Instant::now());
    }

    pub async fn report_viewport(&self, metrics: ScrollMetrics) {
        self.state.lock().await.follow.report_viewport(metrics);
    }

    pub async fn resume_follow(&self) {
        self.state.lock().await.follow.resume();
    }

    /// Whether the log viewer should pin itself to the bottom now.
    pub async fn should_auto_scroll(&self) -> bool {
        let mut state = self.state.lock().await;
        state.follow.tick(Instant::now());
        state.follow.should_auto_scroll()
    }

    /// The viewer scrolled to the bottom for the initial population.
    pub async fn acknowledge_scrolled(&self) {
        self.state.lock().await.follow.acknowledge();
    }

    /// Register a handler for raw push messages of one type.
    ///
    /// Handlers run on the session task and must not block.
    pub fn subscribe<F>(&self, message_type: MessageType, handler: F) -> Subscription
    where
        F: Fn(&ServerMessage) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.registry.subscribe(message_type, handler)
    }

    /// Complete log text from the REST endpoint, for export.
    pub async fn fetch_full_logs(&self) -> Result<String, SessionError> {
        Ok(self.fetcher.fetch_full_logs(&self.execution_id).await?)
    }

    /// Stop the session and wait for it to finish. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::warn!(execution_id = %self.execution_id, error = %err, "session task ended abnormally");
            }
        }
        self.teardown.release();
    }
}
