//! Per-priority listener storage.

use std::collections::HashSet;
use std::sync::Arc;

use crate::listener::{EventListener, ListenerId};

/// Listeners registered at one priority for one event kind, in insertion order.
///
/// Buckets are not synchronized themselves; a node guards all five of its
/// buckets with one lock.
#[derive(Debug, Default, Clone)]
pub struct PriorityBucket {
    listeners: Vec<Arc<EventListener>>,
}

impl PriorityBucket {
    /// Creates an empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener. Duplicates are allowed.
    pub fn add(&mut self, listener: Arc<EventListener>) {
        self.listeners.push(listener);
    }

    /// Removes the first entry with the given id. Returns whether one was found.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        match self.listeners.iter().position(|entry| entry.id() == id) {
            Some(index) => {
                self.listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Removes every entry whose id is in `ids`. Returns whether anything was removed.
    pub fn remove_all(&mut self, ids: &HashSet<ListenerId>) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|entry| !ids.contains(&entry.id()));
        self.listeners.len() != before
    }

    /// Listeners in insertion order.
    pub fn listeners(&self) -> &[Arc<EventListener>] {
        &self.listeners
    }

    /// Number of listeners in the bucket.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether the bucket is empty.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
