//! Process-wide teardown of live monitoring sessions.
//!
//! Every session registers its cancellation token here when it starts and
//! deregisters when it stops. [`teardown_all`] cancels whatever is still
//! registered; each registration is cancelled at most once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::info;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn registry() -> MutexGuard<'static, HashMap<u64, CancellationToken>> {
    static REGISTRY: OnceLock<Mutex<HashMap<u64, CancellationToken>>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Registration of one session; deregisters on release or drop.
#[derive(Debug)]
pub struct TeardownGuard {
    id: u64,
}

impl TeardownGuard {
    /// Deregister without cancelling.
    pub fn release(&self) {
        registry().remove(&self.id);
    }

    pub fn is_registered(&self) -> bool {
        registry().contains_key(&self.id)
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Register a session's cancellation token.
pub fn register(token: CancellationToken) -> TeardownGuard {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    registry().insert(id, token);
    TeardownGuard { id }
}

/// Cancel every registered session. Returns how many were cancelled.
pub fn teardown_all() -> usize {
    let tokens: Vec<CancellationToken> = registry().drain().map(|(_, token)| token).collect();
    for token in &tokens {
        token.cancel();
    }
    if !tokens.is_empty() {
        info!(sessions = tokens.len(), "tore down monitoring sessions");
    }
    tokens.len()
}

/// Number of sessions currently registered.
pub fn registered_count() -> usize {
    registry().len()
}

/// Spawn a task that tears every session down on Ctrl-C.
///
/// Must be called from within a tokio runtime.
pub fn install_ctrl_c_hook() -> tokio::task::JoinHandle<()> {
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            teardown_all();
        }
    })
}
