//! Push channel for one execution.
//!
//! [`MessageChannel`] owns at most one open connection, parses inbound text
//! frames into [`ServerMessage`]s and fans them out to the handlers in its
//! [`SubscriptionRegistry`]. Reconnecting is not its concern; see
//! [`crate::reconnect`].

pub mod registry;
pub mod transport;

pub use registry::{DispatchReport, HandlerError, Subscription, SubscriptionRegistry};
pub use transport::{Connector, FrameSink, FrameStream, TransportError, WsConnector};

use futures_util::{SinkExt, StreamExt};
use pw_protocol::{ClientFrame, MessageType, ServerMessage};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Why an inbound frame was discarded.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unknown message type {0:?}")]
    UnknownType(String),

    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Parse one inbound text frame.
///
/// Distinguishes frames whose `type` is not one we know from frames that
/// are not valid JSON or whose body does not fit their type.
pub fn parse_frame(text: &str) -> Result<ServerMessage, ProtocolError> {
    ServerMessage::parse(text).map_err(|err| {
        let declared = serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .and_then(|value| value.get("type")?.as_str().map(str::to_string));

        match declared {
            Some(kind) if !is_known_type(&kind) => ProtocolError::UnknownType(kind),
            _ => ProtocolError::Malformed(err),
        }
    })
}

fn is_known_type(kind: &str) -> bool {
    [
        MessageType::ExecutionUpdate,
        MessageType::StepUpdate,
        MessageType::LogUpdate,
        MessageType::ToolStatus,
        MessageType::SystemNotification,
    ]
    .iter()
    .any(|known| known.as_str() == kind)
}

/// What [`MessageChannel::recv`] produced.
#[derive(Debug)]
pub enum Inbound {
    Message(ServerMessage),
    /// The connection is gone; the channel has already dropped it.
    Closed(TransportError),
}

/// A single push connection plus its subscribers.
pub struct MessageChannel {
    execution_id: String,
    connector: Arc<dyn Connector>,
    registry: SubscriptionRegistry,
    sink: Option<FrameSink>,
    stream: Option<FrameStream>,
}

impl MessageChannel {
    pub fn new(execution_id: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        Self::with_registry(execution_id, connector, SubscriptionRegistry::new())
    }

    /// Create a channel that dispatches to an existing registry.
    pub fn with_registry(
        execution_id: impl Into<String>,
        connector: Arc<dyn Connector>,
        registry: SubscriptionRegistry,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            connector,
            registry,
            sink: None,
            stream: None,
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Open a connection, replacing any previous one.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        self.close_transport().await;

        debug!(execution_id = %self.execution_id, "opening push connection");
        let (sink, stream) = self.connector.connect(&self.execution_id).await?;
        self.sink = Some(sink);
        self.stream = Some(stream);
        Ok(())
    }

    /// Send one control frame.
    pub async fn send(&mut self, frame: &ClientFrame) -> Result<(), TransportError> {
        let sink = self.sink.as_mut().ok_or(TransportError::NotConnected)?;
        let text = frame
            .to_frame()
            .map_err(|e| TransportError::Send(e.to_string()))?;

        debug!(execution_id = %self.execution_id, frame = ?frame, "sending control frame");
        sink.send(text).await
    }

    /// Wait for the next parsed message.
    ///
    /// Frames that fail to parse are logged and skipped. When the connection
    /// breaks or the peer closes it, the transport is dropped and
    /// [`Inbound::Closed`] is returned. With no connection this never
    /// resolves.
    pub async fn recv(&mut self) -> Inbound {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return std::future::pending().await;
            };

            let error = match stream.next().await {
                Some(Ok(text)) => match parse_frame(&text) {
                    Ok(message) => return Inbound::Message(message),
                    Err(err) => {
                        warn!(execution_id = %self.execution_id, error = %err, "dropping inbound frame");
                        continue;
                    }
                },
                Some(Err(err)) => err,
                None => TransportError::Closed,
            };

            self.sink = None;
            self.stream = None;
            return Inbound::Closed(error);
        }
    }

    /// Register a handler for one message type.
    pub fn subscribe<F>(&self, message_type: MessageType, handler: F) -> Subscription
    where
        F: Fn(&ServerMessage) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.registry.subscribe(message_type, handler)
    }

    /// Deliver a message to its subscribers.
    pub fn dispatch(&self, message: &ServerMessage) -> DispatchReport {
        self.registry.dispatch(message)
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    /// Drop the connection but keep the subscribers, ready for a reconnect.
    pub(crate) async fn close_transport(&mut self) {
        self.stream = None;
        if let Some(mut sink) = self.sink.take() {
            if let Err(err) = sink.close().await {
                debug!(execution_id = %self.execution_id, error = %err, "close handshake failed");
            }
        }
    }

    /// Close the connection and remove every subscriber.
    ///
    /// Safe to call any number of times.
    pub async fn disconnect(&mut self) {
        self.close_transport().await;
        self.registry.clear();
    }
}
