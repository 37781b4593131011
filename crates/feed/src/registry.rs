// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener registry: event kind -> subscriber queues.
//!
//! Dispatch clones the payload into each subscriber's unbounded queue
//! so one slow or dropped subscriber never blocks the socket task or
//! its peers. Entries whose subscriber lists empty out are removed so
//! the map never accumulates dead kinds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::envelope::Envelope;

/// Identifies one subscriber within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    tx: mpsc::UnboundedSender<Value>,
}

struct RegistryInner {
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
    next_id: AtomicU64,
}

/// Shared listener table. Clones refer to the same table.
#[derive(Clone)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a subscriber for `kind` and hand back its queue.
    pub fn add(&self, kind: &str) -> (ListenerId, mpsc::UnboundedReceiver<Value>) {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .listeners
            .lock()
            .entry(kind.to_owned())
            .or_default()
            .push(Listener { id, tx });
        (id, rx)
    }

    /// Drop one subscriber. Returns whether anything was removed;
    /// unknown ids and kinds are a no-op.
    pub fn remove(&self, kind: &str, id: ListenerId) -> bool {
        remove_listener(&self.inner, kind, id)
    }

    /// Deliver an envelope's payload to every subscriber of its kind.
    /// Subscribers whose receiving end is gone are pruned on the way.
    /// Returns the number of queues the payload reached.
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        let mut map = self.inner.listeners.lock();
        let Some(listeners) = map.get_mut(&envelope.kind) else {
            return 0;
        };
        let mut delivered = 0;
        listeners.retain(|listener| match listener.tx.send(envelope.payload.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => false,
        });
        if listeners.is_empty() {
            map.remove(&envelope.kind);
        }
        delivered
    }

    /// Remove every subscriber for every kind.
    pub fn clear(&self) {
        self.inner.listeners.lock().clear();
    }

    pub fn listener_count(&self, kind: &str) -> usize {
        self.inner
            .listeners
            .lock()
            .get(kind)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Kinds that currently have at least one subscriber.
    pub fn kinds(&self) -> Vec<String> {
        self.inner.listeners.lock().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.listeners.lock().is_empty()
    }

    pub fn downgrade(&self) -> WeakRegistry {
        WeakRegistry {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Weak handle held by [`crate::subscription::Subscription`] so a
/// subscriber outliving its client can still unsubscribe safely.
#[derive(Clone)]
pub struct WeakRegistry {
    inner: Weak<RegistryInner>,
}

impl WeakRegistry {
    /// Same as [`ListenerRegistry::remove`], but a no-op when the
    /// registry is already gone.
    pub fn remove(&self, kind: &str, id: ListenerId) -> bool {
        match self.inner.upgrade() {
            Some(inner) => remove_listener(&inner, kind, id),
            None => false,
        }
    }
}

fn remove_listener(inner: &RegistryInner, kind: &str, id: ListenerId) -> bool {
    let mut map = inner.listeners.lock();
    let Some(listeners) = map.get_mut(kind) else {
        return false;
    };
    let before = listeners.len();
    listeners.retain(|listener| listener.id != id);
    let removed = listeners.len() != before;
    if listeners.is_empty() {
        map.remove(kind);
    }
    removed
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
