//! Lifecycle callbacks
//!
//! The transport reports connection events to one injected observer. Every
//! callback has a no-op default, so an observer implements only what it
//! needs. [`ChannelObserver`] turns the callbacks into a channel of
//! [`StreamEvent`]s for consumers that prefer to await events.

use tokio::sync::mpsc;

use crate::error::StreamError;
use crate::message::Envelope;

/// Callbacks run on the transport task; they must not block
pub trait StreamObserver: Send + Sync + 'static {
    fn on_connected(&self) {}

    /// The session ended. `reason` is [`StreamError::Closed`] after a normal
    /// closure and the failure otherwise.
    fn on_disconnected(&self, _reason: &StreamError) {}

    /// Every decoded envelope, before type-specific handlers run
    fn on_message(&self, _message: &Envelope) {}

    fn on_error(&self, _error: &StreamError) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected,
    Disconnected(StreamError),
    Message(Envelope),
    Error(StreamError),
}

/// Forwards callbacks as [`StreamEvent`]s
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelObserver { tx }, rx)
    }

    fn emit(&self, event: StreamEvent) {
        // Receiver dropped means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

impl StreamObserver for ChannelObserver {
    fn on_connected(&self) {
        self.emit(StreamEvent::Connected);
    }

    fn on_disconnected(&self, reason: &StreamError) {
        self.emit(StreamEvent::Disconnected(reason.clone()));
    }

    fn on_message(&self, message: &Envelope) {
        self.emit(StreamEvent::Message(message.clone()));
    }

    fn on_error(&self, error: &StreamError) {
        self.emit(StreamEvent::Error(error.clone()));
    }
}
