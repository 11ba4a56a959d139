//! Key routing between widgets.
//!
//! Key events go through a chain of responsibility: the command composer
//! first, then the log pane, then the app itself. Each step returns an
//! [`EventStatus`] telling whether it took the key.

/// Outcome of offering a key event to a widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// The widget handled the key; stop here.
    Consumed,
    /// Pass the key to the next handler.
    NotConsumed,
}

impl EventStatus {
    pub fn is_consumed(self) -> bool {
        self == Self::Consumed
    }
}
