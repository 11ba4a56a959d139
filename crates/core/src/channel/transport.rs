//! Transport abstraction for the push channel.
//!
//! A [`Connector`] opens one connection and hands back a sink for outbound
//! text frames and a stream of inbound text frames. [`WsConnector`] is the
//! WebSocket implementation; tests plug in in-memory connectors.

use async_trait::async_trait;
use futures_util::future;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use thiserror::Error;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Outbound half of an open connection.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of an open connection.
///
/// Yields an error when the peer closes the connection or the link breaks;
/// the stream ending counts as a close as well.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Connect failures and broken connections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid push endpoint {0}")]
    InvalidUrl(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connect timed out")]
    Timeout,

    #[error("connection closed by peer")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("not connected")]
    NotConnected,
}

/// Opens push connections for an execution.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to the topic of `execution_id`.
    ///
    /// Resolves once the transport reports open, or with the reason it
    /// could not.
    async fn connect(&self, execution_id: &str) -> Result<(FrameSink, FrameStream), TransportError>;
}

/// WebSocket connector; the execution id is appended to the base URL path.
#[derive(Debug, Clone)]
pub struct WsConnector {
    base_url: Url,
}

impl WsConnector {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let base_url =
            Url::parse(base_url).map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self { base_url })
    }

    /// URL of the topic for one execution.
    pub fn topic_url(&self, execution_id: &str) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty();
            segments.push(execution_id);
        }
        Ok(url)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, execution_id: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        let url = self.topic_url(execution_id)?;
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (sink, stream) = ws.split();

        let sink = sink
            .sink_map_err(|e| TransportError::Send(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text))));

        // Ping/pong and binary frames carry nothing for us.
        let stream = stream.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::Receive(e.to_string()))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
