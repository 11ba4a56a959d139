//! In-memory transports for driving sessions without a network.
//!
//! `MockConnector` hands every accepted connection to the test as a
//! `ServerConn`, which plays the server side: it pushes frames to the
//! client, reads the frames the client sent and can drop the connection.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::SinkExt;
use pw_core::channel::{Connector, FrameSink, FrameStream, TransportError};
use pw_core::poller::{FetchError, StateFetcher};
use pw_protocol::{ExecutionSnapshot, ServerMessage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::PollSender;

const WAIT: Duration = Duration::from_secs(30);

/// Server side of one accepted connection.
pub struct ServerConn {
    pub execution_id: String,
    to_client: Option<mpsc::UnboundedSender<Result<String, TransportError>>>,
    from_client: mpsc::Receiver<String>,
}

impl ServerConn {
    pub fn push(&self, message: &ServerMessage) {
        self.push_raw(&message.to_frame().unwrap());
    }

    pub fn push_raw(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Ok(text.to_string()));
        }
    }

    /// Close the connection from the server side.
    pub fn close(&mut self) {
        if let Some(tx) = self.to_client.take() {
            let _ = tx.send(Err(TransportError::Closed));
        }
    }

    /// Next frame the client sent, parsed as JSON.
    pub async fn next_frame(&mut self) -> serde_json::Value {
        let text = tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client side closed");
        serde_json::from_str(&text).unwrap()
    }

    /// Read the auth (when expected) and subscribe frames sent after open.
    pub async fn expect_handshake(&mut self, with_auth: bool) {
        if with_auth {
            assert_eq!(self.next_frame().await["type"], "auth");
        }
        let subscribe = self.next_frame().await;
        assert_eq!(subscribe["type"], "subscribe_execution");
        assert_eq!(subscribe["executionId"], self.execution_id.as_str());
    }
}

#[derive(Clone)]
pub struct MockConnector {
    accepted_tx: mpsc::UnboundedSender<ServerConn>,
    refuse: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
}

/// Test end receiving the connections a `MockConnector` accepts.
pub struct MockServer {
    accepted_rx: mpsc::UnboundedReceiver<ServerConn>,
}

impl MockServer {
    pub async fn accept(&mut self) -> ServerConn {
        tokio::time::timeout(WAIT, self.accepted_rx.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, MockServer) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accepted_tx,
            refuse: Arc::new(AtomicBool::new(false)),
            attempts: Arc::new(AtomicUsize::new(0)),
        });
        (connector, MockServer { accepted_rx })
    }

    /// Make every following connect attempt fail.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, execution_id: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (client_tx, from_client) = mpsc::channel::<String>(64);
        let (to_client, client_rx) = mpsc::unbounded_channel();

        let sink = PollSender::new(client_tx)
            .sink_map_err(|_| TransportError::Send("server went away".to_string()));
        let stream = UnboundedReceiverStream::new(client_rx);

        self.accepted_tx
            .send(ServerConn {
                execution_id: execution_id.to_string(),
                to_client: Some(to_client),
                from_client,
            })
            .map_err(|_| TransportError::Connect("server gone".to_string()))?;

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

/// Fetcher answering from a script, then from a fixed snapshot.
#[derive(Default)]
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<ExecutionSnapshot, FetchError>>>,
    fallback: Mutex<Option<ExecutionSnapshot>>,
    full_logs: Mutex<Option<String>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_response(&self, response: Result<ExecutionSnapshot, FetchError>) {
        self.script.lock().unwrap().push_back(response);
    }

    /// Snapshot returned once the script is exhausted; `None` answers
    /// with `FetchError::Unavailable`.
    pub fn set_snapshot(&self, snapshot: Option<ExecutionSnapshot>) {
        *self.fallback.lock().unwrap() = snapshot;
    }

    pub fn set_full_logs(&self, logs: &str) {
        *self.full_logs.lock().unwrap() = Some(logs.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateFetcher for ScriptedFetcher {
    async fn fetch_state(&self, _execution_id: &str) -> Result<ExecutionSnapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(response) = self.script.lock().unwrap().pop_front() {
            return response;
        }
        self.fallback
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| FetchError::Unavailable("no snapshot scripted".to_string()))
    }

    async fn fetch_full_logs(&self, _execution_id: &str) -> Result<String, FetchError> {
        self.full_logs
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| FetchError::Unavailable("no logs scripted".to_string()))
    }
}
