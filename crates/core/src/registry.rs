//! Endpoint Registry
//!
//! One governor (or transport) per remote endpoint. Facades that talk to the
//! same endpoint must share its admission counters, otherwise each facade
//! enforces the limit on its own and the endpoint sees their sum.

use std::any::Any;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::error::GovernorError;

/// Handles keyed by endpoint identity (normally the endpoint URL)
#[derive(Default)]
pub struct EndpointRegistry {
    entries: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        EndpointRegistry {
            entries: DashMap::new(),
        }
    }

    /// The process-wide registry
    pub fn global() -> &'static EndpointRegistry {
        static GLOBAL: OnceLock<EndpointRegistry> = OnceLock::new();
        GLOBAL.get_or_init(EndpointRegistry::new)
    }

    /// Return the handle registered for `endpoint`, creating it with `init`
    /// on first use. Fails if the endpoint holds a handle of another type.
    pub fn get_or_try_init<T, E, F>(&self, endpoint: &str, init: F) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: From<GovernorError>,
        F: FnOnce() -> Result<T, E>,
    {
        let entry = match self.entries.entry(endpoint.to_string()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let handle = init()?;
                debug!(endpoint, "registered endpoint handle");
                Arc::clone(entry.insert(Arc::new(handle)).value())
            }
        };

        entry
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| GovernorError::RegistryMismatch(endpoint.to_string()).into())
    }

    pub fn get<T>(&self, endpoint: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.entries
            .get(endpoint)
            .and_then(|entry| entry.value().downcast_ref::<T>().cloned())
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.entries.contains_key(endpoint)
    }

    /// Forget an endpoint. Existing clones of its handle keep working.
    pub fn remove(&self, endpoint: &str) -> bool {
        self.entries.remove(endpoint).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
