// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber handles returned by [`crate::socket::FeedClient::subscribe`].

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::registry::{ListenerId, WeakRegistry};

/// One subscription to a feed event kind.
///
/// Payloads queue up until read with [`next`](Self::next). Dropping the
/// handle unsubscribes; calling [`unsubscribe`](Self::unsubscribe) more
/// than once, or after the client itself is gone, is harmless.
pub struct Subscription {
    kind: String,
    id: ListenerId,
    registry: WeakRegistry,
    rx: mpsc::UnboundedReceiver<Value>,
    unsubscribed: bool,
}

impl Subscription {
    pub(crate) fn new(
        kind: String,
        id: ListenerId,
        registry: WeakRegistry,
        rx: mpsc::UnboundedReceiver<Value>,
    ) -> Self {
        Self {
            kind,
            id,
            registry,
            rx,
            unsubscribed: false,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Next payload for this kind, or `None` once unsubscribed.
    pub async fn next(&mut self) -> Option<Value> {
        if self.unsubscribed {
            return None;
        }
        self.rx.recv().await
    }

    /// Non-blocking read of an already-queued payload.
    pub fn try_next(&mut self) -> Option<Value> {
        if self.unsubscribed {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Deregister from the feed. Idempotent.
    pub fn unsubscribe(&mut self) {
        if self.unsubscribed {
            return;
        }
        self.unsubscribed = true;
        self.registry.remove(&self.kind, self.id);
        self.rx.close();
    }

    /// Interpret payloads as `T`, skipping any that do not decode.
    pub fn typed<T: DeserializeOwned>(self) -> TypedSubscription<T> {
        TypedSubscription {
            raw: self,
            _marker: PhantomData,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// A [`Subscription`] whose payloads decode into `T`.
///
/// Payloads that fail to decode are logged and skipped rather than
/// surfaced, matching how the socket treats malformed frames.
pub struct TypedSubscription<T> {
    raw: Subscription,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedSubscription<T> {
    pub fn kind(&self) -> &str {
        self.raw.kind()
    }

    pub async fn next(&mut self) -> Option<T> {
        while let Some(value) = self.raw.next().await {
            match serde_json::from_value(value) {
                Ok(payload) => return Some(payload),
                Err(err) => {
                    tracing::debug!(kind = %self.raw.kind, err = %err, "skipping undecodable feed payload");
                }
            }
        }
        None
    }

    pub fn unsubscribe(&mut self) {
        self.raw.unsubscribe();
    }
}
