//! Message-type handler registry

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::message::Envelope;

pub type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Identifies one registration so it can be removed later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Routes inbound envelopes to every handler registered for their type.
/// Registration is independent of the connection lifecycle.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Vec<(HandlerId, Handler)>>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(kind.into())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Returns false if the handler was already removed
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let mut removed = false;
        handlers.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|(entry_id, _)| *entry_id != id);
            removed |= entries.len() != before;
            !entries.is_empty()
        });
        removed
    }

    /// Invoke the handlers for `envelope.kind`; returns how many ran
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        // Handlers run outside the lock so they may register or remove others
        let matched: Vec<Handler> = match self.handlers.read().get(&envelope.kind) {
            Some(entries) => entries.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return 0,
        };

        for handler in &matched {
            handler(envelope);
        }
        matched.len()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.handlers.read().get(kind).map_or(0, Vec::len)
    }
}
