//! history.rs — bounded, deduplicated in-memory buffer of recent events,
//! replayed to every newly connected subscriber.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use crate::event::Event;

#[derive(Debug, Default)]
struct Inner {
    // Oldest-first; evicted from the front when over capacity.
    events: VecDeque<Event>,
    keys: HashSet<String>,
}

/// Invariants: no two retained events share a dedup key, and
/// `len() <= cap` after every operation. Eviction is FIFO on insertion
/// order, not LRU.
#[derive(Debug)]
pub struct History {
    inner: Mutex<Inner>,
    cap: usize,
}

impl History {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            cap,
        }
    }

    /// Insert an event unless its dedup key is already retained.
    /// Returns whether the event was retained.
    pub fn insert(&self, event: &Event) -> bool {
        let key = event.dedup_key();
        let mut inner = self.inner.lock().expect("history mutex poisoned");
        if !inner.keys.insert(key) {
            return false;
        }
        inner.events.push_back(event.clone());
        while inner.events.len() > self.cap {
            if let Some(old) = inner.events.pop_front() {
                inner.keys.remove(&old.dedup_key());
            }
        }
        true
    }

    /// All retained events, oldest-first. Safe to call concurrently with
    /// `insert`; returns a point-in-time copy.
    pub fn snapshot(&self) -> Vec<Event> {
        let inner = self.inner.lock().expect("history mutex poisoned");
        inner.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("history mutex poisoned").events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
