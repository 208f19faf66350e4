use super::EventId;
use super::event::Event;
use crate::error::{EmsError, EmsResult};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Insertion-ordered set of events behind a single read/write lock.
///
/// Lookups share the read lock; appends take it exclusively.
#[derive(Default)]
pub struct Registry {
    events: RwLock<IndexMap<EventId, Arc<Event>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: EventId) -> Option<Arc<Event>> {
        self.events.read().get(&id).cloned()
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.events.read().contains_key(&id)
    }

    /// Publish a fully constructed event.
    ///
    /// Uniqueness is checked again under the write lock, since two creators may
    /// both have passed the read-side check.
    pub fn insert(&self, event: Event) -> EmsResult<Arc<Event>> {
        let mut events = self.events.write();
        let id = event.id();
        if events.contains_key(&id) {
            return Err(EmsError::DuplicateEvent { id });
        }
        let event = Arc::new(event);
        events.insert(id, event.clone());
        Ok(event)
    }

    /// Visit every id in insertion order while holding the read lock.
    pub fn for_each_id(&self, mut visit: impl FnMut(EventId)) {
        let events = self.events.read();
        for id in events.keys() {
            visit(*id);
        }
    }

    pub fn ids(&self) -> Vec<EventId> {
        self.events.read().keys().copied().collect()
    }

    pub(crate) fn clear(&self) {
        self.events.write().clear();
    }
}
