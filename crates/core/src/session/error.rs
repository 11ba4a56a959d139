use crate::channel::TransportError;
use crate::poller::FetchError;
use thiserror::Error;

/// Errors returned to consumers of a monitoring session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session was stopped; its state is still readable.
    #[error("monitoring session for {0} has stopped")]
    Stopped(String),

    #[error("execution {0} is already being monitored")]
    AlreadyMonitoring(String),

    #[error("execution {0} is not being monitored")]
    NotMonitoring(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
