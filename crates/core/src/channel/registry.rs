//! Per-message-type subscription registry.
//!
//! Handlers are kept in registration order under their message type.
//! [`SubscriptionRegistry::subscribe`] returns a [`Subscription`] whose
//! `unsubscribe` removes exactly that handler. Dispatch isolates handlers:
//! one failing (by error or panic) never stops the rest.

use pw_protocol::{MessageType, ServerMessage};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;
use tracing::warn;

/// Error returned by a subscriber callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Subscriber callback.
pub type Handler = Arc<dyn Fn(&ServerMessage) -> Result<(), HandlerError> + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    handlers: HashMap<MessageType, Vec<(u64, Handler)>>,
}

/// Outcome of dispatching one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Shared map from message type to its ordered handlers.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // Handlers never run under the lock, so a poisoned guard still holds consistent data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for `message_type`, after any existing handlers.
    pub fn subscribe<F>(&self, message_type: MessageType, handler: F) -> Subscription
    where
        F: Fn(&ServerMessage) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .handlers
            .entry(message_type)
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            id,
            message_type,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every handler registered for the message's type, in order.
    ///
    /// Handlers run without the registry lock held, so they may subscribe or
    /// unsubscribe. Changes take effect from the next message.
    pub fn dispatch(&self, message: &ServerMessage) -> DispatchReport {
        let message_type = message.message_type();
        let handlers: Vec<(u64, Handler)> = self
            .lock()
            .handlers
            .get(&message_type)
            .cloned()
            .unwrap_or_default();

        let mut report = DispatchReport::default();
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(message))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(error)) => {
                    report.failed += 1;
                    warn!(%message_type, subscription = id, %error, "subscriber returned an error");
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(%message_type, subscription = id, "subscriber panicked");
                }
            }
        }
        report
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.lock().handlers.clear();
    }

    /// Total number of registered handlers.
    pub fn len(&self) -> usize {
        self.lock().handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_for(&self, message_type: MessageType) -> usize {
        self.lock().handlers.get(&message_type).map_or(0, Vec::len)
    }
}

/// Handle to one registered handler.
///
/// Dropping the handle keeps the handler registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    message_type: MessageType,
    registry: Weak<Mutex<RegistryInner>>,
}

impl Subscription {
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Remove the handler. Returns `false` if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(inner) = self.registry.upgrade() else {
            return false;
        };
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(handlers) = inner.handlers.get_mut(&self.message_type) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != self.id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            inner.handlers.remove(&self.message_type);
        }
        removed
    }
}
