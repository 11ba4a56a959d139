//! Push connection state models.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// State of the push connection for one monitoring session.
///
/// Transitions:
/// Disconnected -> Connecting -> Connected -> Reconnecting -> Connecting ...
/// Reconnecting -> Failed once the attempt budget is spent.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting for the backoff delay before the next attempt.
    Reconnecting,
    /// Reconnect attempts are exhausted; stays here until a manual retry.
    Failed,
}

/// Connection state plus the details a consumer shows next to it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default, TS)]
pub struct ConnectionStatus {
    pub state: ConnectionState,

    /// Last transport error, cleared when a connection opens.
    pub last_error: Option<String>,

    /// Number of failed reconnect attempts since the last successful open.
    pub attempt: u32,
}
