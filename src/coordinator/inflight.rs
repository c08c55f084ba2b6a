//! The set of conversations currently owned by a coordinator.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::intercom::Conversation;

/// Conversation id → snapshot taken at discovery.
///
/// Every operation is a single synchronous critical section; the lock is
/// never held across an `.await`.
#[derive(Debug, Default)]
pub struct InFlight {
    entries: Mutex<HashMap<String, Conversation>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the snapshot unless its id is already present.
    pub fn try_insert(&self, conversation: Conversation) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(&conversation.id) {
            return false;
        }
        entries.insert(conversation.id.clone(), conversation);
        true
    }

    pub fn get(&self, id: &str) -> Option<Conversation> {
        self.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn remove(&self, id: &str) -> Option<Conversation> {
        self.lock().remove(id)
    }

    /// Sorted ids of every conversation in flight.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove `id` when the returned guard is dropped.
    pub fn release_on_drop(&self, id: impl Into<String>) -> ReleaseGuard<'_> {
        ReleaseGuard {
            set: self,
            id: id.into(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Conversation>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes one conversation from the set on drop, including during unwinding.
pub struct ReleaseGuard<'a> {
    set: &'a InFlight,
    id: String,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}
