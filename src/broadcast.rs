// src/broadcast.rs
//! Fan-out side of the pipeline: the subscriber registry, the history
//! replay on join, and the broadcaster task that drains the internal
//! channel. The channel has exactly one consumer; draining it from more
//! than one place would let delivery order and history order diverge.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use metrics::gauge;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::event::Event;
use crate::history::History;

pub type SubscriberId = u64;

#[derive(Default)]
struct Inner {
    next_id: SubscriberId,
    subs: HashMap<SubscriberId, UnboundedSender<Event>>,
}

/// Set of live subscriber handles plus the history they get replayed on
/// join. Join and fan-out serialize on the same lock, so a joining
/// subscriber sees history fully before any live event (at worst one
/// duplicate across the snapshot/live boundary, never a gap).
pub struct Registry {
    inner: Mutex<Inner>,
    history: Arc<History>,
}

impl Registry {
    pub fn new(history: Arc<History>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            history,
        }
    }

    /// Register a new subscriber. The returned receiver already holds the
    /// history snapshot, oldest-first; live events follow.
    pub fn join(&self) -> (SubscriberId, UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        for ev in self.history.snapshot() {
            // Receiver is in hand, sends cannot fail here.
            let _ = tx.send(ev);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subs.insert(id, tx);
        gauge!("ws_subscribers").set(inner.subs.len() as f64);
        tracing::debug!(id, "subscriber joined");
        (id, rx)
    }

    /// Remove a subscriber; idempotent.
    pub fn leave(&self, id: SubscriberId) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        if inner.subs.remove(&id).is_some() {
            tracing::debug!(id, "subscriber left");
        }
        gauge!("ws_subscribers").set(inner.subs.len() as f64);
    }

    /// Deliver one event to every registered subscriber. A failed send
    /// means the receiving task is gone; those are pruned after the pass
    /// and never block the others.
    pub fn fan_out(&self, event: &Event) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        let mut dead = Vec::new();
        for (id, tx) in inner.subs.iter() {
            if tx.send(event.clone()).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            inner.subs.remove(&id);
            tracing::debug!(id, "pruned dead subscriber");
        }
        gauge!("ws_subscribers").set(inner.subs.len() as f64);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("registry mutex poisoned").subs.len()
    }
}

/// Single consumer of the internal channel: records each event in
/// history (duplicates are not retained but are still delivered) and
/// fans it out. Returns when the producer side is gone.
pub async fn run_broadcaster(
    mut rx: UnboundedReceiver<Event>,
    history: Arc<History>,
    registry: Arc<Registry>,
) {
    while let Some(event) = rx.recv().await {
        let retained = history.insert(&event);
        if !retained {
            tracing::trace!(key = %event.dedup_key(), "event already in history");
        }
        registry.fan_out(&event);
    }
    tracing::info!("event channel closed, broadcaster stopping");
}
