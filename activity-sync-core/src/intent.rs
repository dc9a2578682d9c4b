//! Outbound intents emitted by the store.
//!
//! The store does not render or route; it tells collaborators what happened
//! and lets them decide. Both intents are fire-and-forget.

use tokio::sync::mpsc;

/// Receives user-facing error reports.
pub trait Notifier: Send + Sync {
    fn notify_error(&self, message: &str);
}

/// Receives "show this record" requests after a confirmed save.
pub trait Navigator: Send + Sync {
    fn navigate_to_record(&self, id: &str);
}

/// An intent as a value, for consumers that prefer a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    NotifyError(String),
    NavigateToRecord(String),
}

/// Forwards intents into an unbounded channel.
#[derive(Debug, Clone)]
pub struct IntentChannel {
    sender: mpsc::UnboundedSender<Intent>,
}

impl IntentChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Intent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn emit(&self, intent: Intent) {
        // No receiver means nobody is listening; intents are not acknowledged.
        let _ = self.sender.send(intent);
    }
}

impl Notifier for IntentChannel {
    fn notify_error(&self, message: &str) {
        self.emit(Intent::NotifyError(message.to_string()));
    }
}

impl Navigator for IntentChannel {
    fn navigate_to_record(&self, id: &str) {
        self.emit(Intent::NavigateToRecord(id.to_string()));
    }
}

/// Writes intents to the log. Used when no UI is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingIntents;

impl Notifier for TracingIntents {
    fn notify_error(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

impl Navigator for TracingIntents {
    fn navigate_to_record(&self, id: &str) {
        tracing::debug!("navigate to record {}", id);
    }
}
