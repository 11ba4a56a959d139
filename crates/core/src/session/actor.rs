//! The task that owns one session's connection, poller and state.

use crate::poller::{FallbackPoller, FetchError, PollSource, StateFetcher};
use crate::reconnect::{LinkEvent, ReconnectionController};
use crate::session::events::{MonitorEvent, SessionCommand};
use crate::session::MonitorState;
use chrono::{DateTime, Utc};
use pw_protocol::{ClientFrame, ExecutionSnapshot, LogEntry, ServerMessage};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one spawned fetch.
struct PollOutcome {
    source: PollSource,
    requested_at: DateTime<Utc>,
    result: Result<ExecutionSnapshot, FetchError>,
}

pub(crate) struct MonitorSession {
    execution_id: String,
    link: ReconnectionController,
    poller: FallbackPoller,
    fetcher: Arc<dyn StateFetcher>,
    state: Arc<Mutex<MonitorState>>,
    events_tx: mpsc::UnboundedSender<MonitorEvent>,
    commands_rx: mpsc::Receiver<SessionCommand>,
    cancel: CancellationToken,
    poll_tx: mpsc::Sender<PollOutcome>,
    poll_rx: mpsc::Receiver<PollOutcome>,
    fetch_task: Option<JoinHandle<()>>,
}

impl MonitorSession {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        execution_id: String,
        link: ReconnectionController,
        poller: FallbackPoller,
        fetcher: Arc<dyn StateFetcher>,
        state: Arc<Mutex<MonitorState>>,
        events_tx: mpsc::UnboundedSender<MonitorEvent>,
        commands_rx: mpsc::Receiver<SessionCommand>,
        cancel: CancellationToken,
    ) -> Self {
        let (poll_tx, poll_rx) = mpsc::channel(4);
        Self {
            execution_id,
            link,
            poller,
            fetcher,
            state,
            events_tx,
            commands_rx,
            cancel,
            poll_tx,
            poll_rx,
            fetch_task: None,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(execution_id = %self.execution_id, "monitoring session started");

        self.link.begin_connect();
        self.publish_connection().await;
        self.sync_poller().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                command = self.commands_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    // Every handle is gone.
                    None => break,
                },
                event = self.link.next_event() => self.handle_link_event(event).await,
                source = self.poller.tick() => self.start_fetch(source),
                Some(outcome) = self.poll_rx.recv() => self.handle_poll(outcome).await,
            }
        }

        self.shutdown().await;
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Message(message) => {
                self.link.channel().dispatch(&message);
                self.apply_message(&message).await;
            }
            LinkEvent::Lost { error, retry_in } => {
                debug!(execution_id = %self.execution_id, %error, ?retry_in, "push link lost");
                self.publish_connection().await;
                self.sync_poller().await;
            }
            LinkEvent::BackoffElapsed => {
                self.publish_connection().await;

                let cancel = self.cancel.clone();
                tokio::select! {
                    result = self.link.connect() => {
                        if let Err((error, retry_in)) = result {
                            debug!(execution_id = %self.execution_id, %error, ?retry_in, "connect attempt failed");
                        }
                    }
                    _ = cancel.cancelled() => return,
                }

                self.publish_connection().await;
                self.sync_poller().await;
            }
        }
    }

    async fn apply_message(&mut self, message: &ServerMessage) {
        let execution_id = self.execution_id.clone();
        match message {
            ServerMessage::ExecutionUpdate(update) => {
                let (execution, progress) = {
                    let mut state = self.state.lock().await;
                    state.reconciler.apply_execution_update(update);
                    (state.reconciler.execution().clone(), state.reconciler.progress())
                };
                self.emit(MonitorEvent::ExecutionChanged {
                    execution_id,
                    execution,
                    progress,
                });
                self.sync_poller().await;
            }
            ServerMessage::StepUpdate(update) => {
                let (steps, execution, progress) = {
                    let mut state = self.state.lock().await;
                    state.reconciler.apply_step_update(update);
                    (
                        state.reconciler.steps().to_vec(),
                        state.reconciler.execution().clone(),
                        state.reconciler.progress(),
                    )
                };
                self.emit(MonitorEvent::StepsChanged {
                    execution_id: execution_id.clone(),
                    steps,
                });
                self.emit(MonitorEvent::ExecutionChanged {
                    execution_id,
                    execution,
                    progress,
                });
            }
            ServerMessage::LogUpdate(update) => {
                {
                    let mut state = self.state.lock().await;
                    state.logs.append(LogEntry::from(update.clone()));
                    state.follow.on_populated();
                }
                self.emit(MonitorEvent::LogsAppended {
                    execution_id,
                    count: 1,
                });
            }
            ServerMessage::ToolStatus(body) => self.emit(MonitorEvent::ToolStatus {
                execution_id,
                body: body.clone(),
            }),
            ServerMessage::SystemNotification(body) => {
                self.emit(MonitorEvent::SystemNotification {
                    execution_id,
                    body: body.clone(),
                })
            }
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        debug!(execution_id = %self.execution_id, ?command, "session command");
        match command {
            SessionCommand::StopExecution => {
                let frame = ClientFrame::StopExecution {
                    execution_id: self.execution_id.clone(),
                };
                self.send_control(frame).await;
            }
            SessionCommand::RestartExecution => {
                let frame = ClientFrame::RestartExecution {
                    execution_id: self.execution_id.clone(),
                };
                self.send_control(frame).await;
            }
            SessionCommand::ClearLogs => {
                {
                    let mut state = self.state.lock().await;
                    state.logs.clear();
                    state.follow.reset_initial();
                    state.follow.resume();
                }
                self.emit(MonitorEvent::LogsCleared {
                    execution_id: self.execution_id.clone(),
                });
            }
            SessionCommand::Retry => {
                if self.link.is_connected() || self.link.retry_pending() {
                    return;
                }
                self.link.reset();
                self.link.begin_connect();
                self.publish_connection().await;
                self.sync_poller().await;
            }
            SessionCommand::Refresh => self.start_fetch(PollSource::Manual),
        }
    }

    async fn send_control(&mut self, frame: ClientFrame) {
        let kind = frame.kind();
        let execution_id = self.execution_id.clone();
        match self.link.send(&frame).await {
            Ok(()) => self.emit(MonitorEvent::CommandSent { execution_id, kind }),
            Err(error) => {
                warn!(%execution_id, kind, %error, "control frame dropped");
                self.emit(MonitorEvent::CommandDropped {
                    execution_id,
                    kind,
                    reason: error.to_string(),
                });
                self.publish_connection().await;
                self.sync_poller().await;
            }
        }
    }

    fn start_fetch(&mut self, source: PollSource) {
        if !self.poller.try_begin(source) {
            return;
        }

        let fetcher = Arc::clone(&self.fetcher);
        let execution_id = self.execution_id.clone();
        let poll_tx = self.poll_tx.clone();
        let requested_at = Utc::now();

        debug!(%execution_id, ?source, "fetching execution state");
        self.fetch_task = Some(tokio::spawn(async move {
            let result = fetcher.fetch_state(&execution_id).await;
            // The session may be gone by now; the result is then discarded.
            let _ = poll_tx
                .send(PollOutcome {
                    source,
                    requested_at,
                    result,
                })
                .await;
        }));
    }

    async fn handle_poll(&mut self, outcome: PollOutcome) {
        self.poller.finish();
        self.fetch_task = None;

        let snapshot = match outcome.result {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(execution_id = %self.execution_id, source = ?outcome.source, %error, "state fetch failed");
                return;
            }
        };

        let (merge, seeded, execution, steps, progress) = {
            let mut state = self.state.lock().await;
            let merge = state.reconciler.apply_snapshot(&snapshot, outcome.requested_at);
            let seeded = match snapshot.logs.as_deref() {
                Some(blob) => state.logs.seed_from_blob(blob),
                None => 0,
            };
            if seeded > 0 {
                state.follow.on_populated();
            }
            (
                merge,
                seeded,
                state.reconciler.execution().clone(),
                state.reconciler.steps().to_vec(),
                state.reconciler.progress(),
            )
        };

        let execution_id = self.execution_id.clone();
        if merge.steps_changed {
            self.emit(MonitorEvent::StepsChanged {
                execution_id: execution_id.clone(),
                steps,
            });
        }
        if merge.changed() {
            self.emit(MonitorEvent::ExecutionChanged {
                execution_id: execution_id.clone(),
                execution,
                progress,
            });
        }
        if seeded > 0 {
            self.emit(MonitorEvent::LogsAppended {
                execution_id,
                count: seeded,
            });
        }

        self.sync_poller().await;
    }

    /// Copy the link status into the shared state and announce changes.
    async fn publish_connection(&mut self) {
        let status = self.link.status();
        let changed = {
            let mut state = self.state.lock().await;
            if state.connection == status {
                false
            } else {
                state.connection = status.clone();
                true
            }
        };
        if changed {
            self.emit(MonitorEvent::ConnectionChanged {
                execution_id: self.execution_id.clone(),
                status,
            });
        }
    }

    async fn sync_poller(&mut self) {
        let status = self.state.lock().await.reconciler.execution().status;
        self.poller.update(self.link.state(), status);
    }

    fn emit(&self, event: MonitorEvent) {
        // A consumer that dropped its receiver simply stops listening.
        let _ = self.events_tx.send(event);
    }

    async fn shutdown(&mut self) {
        self.poller.cancel_all();
        if let Some(task) = self.fetch_task.take() {
            task.abort();
        }
        self.link.disconnect().await;
        self.publish_connection().await;
        self.emit(MonitorEvent::SessionEnded {
            execution_id: self.execution_id.clone(),
        });
        info!(execution_id = %self.execution_id, "monitoring session stopped");
    }
}
