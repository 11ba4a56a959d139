//! Reconnection with capped exponential backoff.
//!
//! [`ReconnectionController`] wraps a [`MessageChannel`] and owns the
//! connection state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//!                   |    ^          |
//!          (failed) v    | (backoff elapsed)
//!                 Reconnecting <----+ (transport lost)
//!                      |
//!                      v (attempts exhausted)
//!                    Failed -> (reset) -> Disconnected
//! ```
//!
//! After every successful open the controller authenticates (when a token
//! is configured) and subscribes to the execution topic.

use crate::channel::{Inbound, MessageChannel, TransportError};
use pw_protocol::{ClientFrame, ConnectionState, ConnectionStatus, MonitorConfig, ServerMessage};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, timeout, Sleep};
use tracing::{debug, info, warn};

/// Delay schedule between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            base: config.reconnect_base_delay(),
            max_delay: config.reconnect_max_delay(),
            max_attempts: config.max_reconnect_attempts,
        }
    }

    /// Delay before retry number `attempt` (zero-based), or `None` once the
    /// attempts are used up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        Some(self.base.saturating_mul(factor).min(self.max_delay))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

/// What happened on the link.
#[derive(Debug)]
pub enum LinkEvent {
    Message(ServerMessage),
    /// The connection dropped, or an attempt failed. `retry_in` is `None`
    /// when the controller gave up.
    Lost {
        error: TransportError,
        retry_in: Option<Duration>,
    },
    /// A scheduled retry is due; call [`ReconnectionController::connect`].
    BackoffElapsed,
}

pub struct ReconnectionController {
    channel: MessageChannel,
    policy: BackoffPolicy,
    token: Option<String>,
    connect_timeout: Duration,
    state: ConnectionState,
    attempt: u32,
    last_error: Option<String>,
    timer: Option<Pin<Box<Sleep>>>,
}

impl ReconnectionController {
    pub fn new(
        channel: MessageChannel,
        policy: BackoffPolicy,
        token: Option<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            policy,
            token,
            connect_timeout,
            state: ConnectionState::Disconnected,
            attempt: 0,
            last_error: None,
            timer: None,
        }
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            last_error: self.last_error.clone(),
            attempt: self.attempt,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.channel.is_open()
    }

    /// Whether a retry is currently scheduled.
    pub fn retry_pending(&self) -> bool {
        self.timer.is_some()
    }

    /// Arm an immediate first attempt.
    ///
    /// The attempt itself runs once [`LinkEvent::BackoffElapsed`] is
    /// observed, which keeps every connect on the same code path.
    pub fn begin_connect(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) || self.timer.is_some()
        {
            return;
        }
        self.state = ConnectionState::Connecting;
        self.timer = Some(Box::pin(sleep(Duration::ZERO)));
    }

    /// Open the connection, then authenticate and subscribe.
    ///
    /// On failure the next attempt is scheduled (or the controller moves to
    /// `Failed`) and the error is returned together with the retry delay.
    pub async fn connect(&mut self) -> Result<(), (TransportError, Option<Duration>)> {
        self.timer = None;
        self.state = ConnectionState::Connecting;

        let opened = match timeout(self.connect_timeout, self.channel.connect()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };

        let result = match opened {
            Ok(()) => self.handshake().await,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                info!(execution_id = %self.channel.execution_id(), "push channel connected");
                self.state = ConnectionState::Connected;
                self.attempt = 0;
                self.last_error = None;
                Ok(())
            }
            Err(err) => {
                self.channel.close_transport().await;
                let retry_in = self.on_transport_lost(err.clone());
                Err((err, retry_in))
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), TransportError> {
        if let Some(token) = self.token.clone() {
            self.channel.send(&ClientFrame::Auth { token }).await?;
        }
        let execution_id = self.channel.execution_id().to_string();
        self.channel
            .send(&ClientFrame::SubscribeExecution { execution_id })
            .await
    }

    /// Record a lost connection and schedule the next attempt.
    ///
    /// Returns the scheduled delay, or `None` after the final attempt.
    pub fn on_transport_lost(&mut self, error: TransportError) -> Option<Duration> {
        self.last_error = Some(error.to_string());

        match self.policy.delay_for(self.attempt) {
            Some(delay) => {
                self.attempt += 1;
                self.state = ConnectionState::Reconnecting;
                self.timer = Some(Box::pin(sleep(delay)));
                warn!(
                    execution_id = %self.channel.execution_id(),
                    attempt = self.attempt,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "push channel lost, retrying"
                );
                Some(delay)
            }
            None => {
                self.state = ConnectionState::Failed;
                self.timer = None;
                warn!(
                    execution_id = %self.channel.execution_id(),
                    attempts = self.attempt,
                    %error,
                    "giving up on push channel"
                );
                None
            }
        }
    }

    /// Wait for the next message, loss or due retry.
    pub async fn next_event(&mut self) -> LinkEvent {
        let Self {
            channel,
            timer,
            state,
            ..
        } = self;

        let inbound = tokio::select! {
            inbound = channel.recv() => inbound,
            _ = maybe_sleep(timer) => {
                *timer = None;
                *state = ConnectionState::Connecting;
                return LinkEvent::BackoffElapsed;
            }
        };

        match inbound {
            Inbound::Message(message) => LinkEvent::Message(message),
            Inbound::Closed(error) => {
                let retry_in = self.on_transport_lost(error.clone());
                LinkEvent::Lost { error, retry_in }
            }
        }
    }

    /// Send a control frame; a failed send counts as a lost connection.
    pub async fn send(&mut self, frame: &ClientFrame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if let Err(err) = self.channel.send(frame).await {
            self.channel.close_transport().await;
            self.on_transport_lost(err.clone());
            return Err(err);
        }
        Ok(())
    }

    /// Leave `Failed` so a manual retry starts from a fresh attempt count.
    pub fn reset(&mut self) {
        if self.state == ConnectionState::Failed {
            self.state = ConnectionState::Disconnected;
        }
        self.attempt = 0;
        self.last_error = None;
    }

    /// Cancel any pending retry, unsubscribe and close.
    ///
    /// Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        self.timer = None;
        if self.channel.is_open() {
            let execution_id = self.channel.execution_id().to_string();
            if let Err(err) = self
                .channel
                .send(&ClientFrame::UnsubscribeExecution { execution_id })
                .await
            {
                debug!(error = %err, "unsubscribe on close failed");
            }
        }
        self.channel.disconnect().await;
        self.state = ConnectionState::Disconnected;
    }
}

fn maybe_sleep(timer: &mut Option<Pin<Box<Sleep>>>) -> impl Future<Output = ()> + '_ {
    async move {
        match timer.as_mut() {
            Some(sleep) => sleep.as_mut().await,
            None => std::future::pending().await,
        }
    }
}
