// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Feed socket client: one WebSocket connection to the campus backend,
//! fanned out to per-kind subscribers. Reconnects with exponential
//! backoff on unexpected drops; a manual [`FeedClient::close`] or an
//! exhausted attempt budget leaves the socket closed until
//! [`FeedClient::connect`] is called again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::backoff::ReconnectPolicy;
use crate::envelope::Envelope;
use crate::registry::ListenerRegistry;
use crate::subscription::{Subscription, TypedSubscription};

pub const DEFAULT_FEED_URL: &str = "ws://localhost:8000/ws";

/// Lifecycle of the feed connection.
///
/// `Connecting` covers both the initial dial and any backoff wait
/// between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Closed,
    Connecting,
    Open,
}

impl SocketState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Open => "open",
        }
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:8000/ws`.
    pub url: String,
    pub policy: ReconnectPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_owned(),
            policy: ReconnectPolicy::default(),
        }
    }
}

/// Outbound side of one live driver task.
struct Driver {
    id: u64,
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<String>,
}

struct Shared {
    config: FeedConfig,
    registry: ListenerRegistry,
    state_tx: watch::Sender<SocketState>,
    driver: Mutex<Option<Driver>>,
    driver_seq: AtomicU64,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.cancel.cancel();
        }
    }
}

/// Handle to the feed connection. Clones share one socket, one listener
/// registry, and one state channel. Methods that start the connection
/// must run inside a Tokio runtime.
#[derive(Clone)]
pub struct FeedClient {
    shared: Arc<Shared>,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> Self {
        let (state_tx, _) = watch::channel(SocketState::Closed);
        Self {
            shared: Arc::new(Shared {
                config,
                registry: ListenerRegistry::new(),
                state_tx,
                driver: Mutex::new(None),
                driver_seq: AtomicU64::new(1),
            }),
        }
    }

    /// Start the connection, or keep the existing one.
    ///
    /// Idempotent: while a driver is connecting or open this only hands
    /// back another state receiver. A socket that was closed manually
    /// or gave up reconnecting is restarted with a fresh attempt
    /// budget.
    pub fn connect(&self) -> watch::Receiver<SocketState> {
        let mut slot = self.shared.driver.lock();
        let live = slot.as_ref().is_some_and(|d| !d.cancel.is_cancelled());
        if live && *self.shared.state_tx.borrow() != SocketState::Closed {
            return self.shared.state_tx.subscribe();
        }

        if let Some(stale) = slot.take() {
            stale.cancel.cancel();
        }

        let id = self.shared.driver_seq.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *slot = Some(Driver {
            id,
            cancel: cancel.clone(),
            outbound: outbound_tx,
        });
        self.shared.state_tx.send_replace(SocketState::Connecting);

        spawn_driver(
            Arc::downgrade(&self.shared),
            self.shared.config.clone(),
            self.shared.registry.clone(),
            self.shared.state_tx.clone(),
            id,
            cancel,
            outbound_rx,
        );
        self.shared.state_tx.subscribe()
    }

    /// Receive payloads for one event kind. Subscriptions survive
    /// reconnects; they end when dropped, unsubscribed, or when the
    /// socket is closed manually.
    pub fn subscribe(&self, kind: &str) -> Subscription {
        let (id, rx) = self.shared.registry.add(kind);
        Subscription::new(kind.to_owned(), id, self.shared.registry.downgrade(), rx)
    }

    /// [`subscribe`](Self::subscribe) with payloads decoded into `T`.
    pub fn subscribe_typed<T: DeserializeOwned>(&self, kind: &str) -> TypedSubscription<T> {
        self.subscribe(kind).typed()
    }

    /// Send `{type, payload}` if the socket is open. Anything else is
    /// logged and dropped; this never blocks, fails, or touches the
    /// connection state.
    pub fn send(&self, kind: &str, payload: Value) {
        let envelope = Envelope::new(kind, payload);
        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(kind, err = %err, "feed send not encodable, dropping");
                return;
            }
        };

        let slot = self.shared.driver.lock();
        let state = *self.shared.state_tx.borrow();
        match slot.as_ref() {
            Some(driver) if state == SocketState::Open => {
                if driver.outbound.send(text).is_err() {
                    tracing::warn!(kind, "feed socket went away, send dropped");
                }
            }
            _ => {
                tracing::warn!(kind, state = state.as_str(), "feed send while socket not open, dropping");
            }
        }
    }

    /// Manual close: stops the driver without scheduling a reconnect
    /// and tears down every subscription. Safe to call at any time.
    pub fn close(&self) {
        let cancel = { self.shared.driver.lock().take().map(|d| d.cancel) };
        if let Some(cancel) = cancel {
            cancel.cancel();
            tracing::debug!("feed socket closed by client");
        }
        self.shared.registry.clear();
        self.shared.state_tx.send_replace(SocketState::Closed);
    }

    pub fn state(&self) -> SocketState {
        *self.shared.state_tx.borrow()
    }

    /// Watch state transitions without starting a connection.
    pub fn watch_state(&self) -> watch::Receiver<SocketState> {
        self.shared.state_tx.subscribe()
    }

    pub fn listener_count(&self, kind: &str) -> usize {
        self.shared.registry.listener_count(kind)
    }
}

/// Drive one connection lifecycle: dial, pump frames, reconnect per
/// the policy. Holds only a weak handle to the client so dropping the
/// last [`FeedClient`] clone shuts the task down via [`Shared`]'s Drop.
#[allow(clippy::too_many_arguments)]
fn spawn_driver(
    shared: Weak<Shared>,
    config: FeedConfig,
    registry: ListenerRegistry,
    state_tx: watch::Sender<SocketState>,
    driver_id: u64,
    cancel: CancellationToken,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    tokio::spawn(async move {
        let url = config.url;
        let policy = config.policy;
        let mut attempt: u32 = 0;

        loop {
            // Touch the state channel only while this driver still owns
            // the slot; once a manual close or a newer connect() takes
            // it, the new owner's published state stands.
            if !publish_if_owned(&shared, driver_id, SocketState::Connecting) {
                break;
            }

            if attempt > 0 {
                let Some(delay) = policy.delay(attempt) else {
                    tracing::warn!(
                        url = %url,
                        attempts = attempt - 1,
                        "feed reconnect budget spent, giving up"
                    );
                    break;
                };
                tracing::debug!(
                    url = %url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "feed reconnect scheduled"
                );
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let dial = tokio::select! {
                _ = cancel.cancelled() => break,
                res = tokio_tungstenite::connect_async(&url) => res,
            };
            match dial {
                Ok((ws_stream, _)) => {
                    if !publish_if_owned(&shared, driver_id, SocketState::Open) {
                        break;
                    }
                    attempt = 0;
                    tracing::debug!(url = %url, "feed socket open");

                    // Sends accepted for a previous transport are
                    // dropped on reconnect, never replayed.
                    while outbound.try_recv().is_ok() {}

                    let (mut write, mut read) = ws_stream.split();
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                let _ = write.send(Message::Close(None)).await;
                                break;
                            }
                            out = outbound.recv() => match out {
                                Some(text) => {
                                    if let Err(err) = write.send(Message::Text(text.into())).await {
                                        tracing::debug!(err = %err, "feed socket write failed");
                                        break;
                                    }
                                }
                                None => break, // client gone
                            },
                            msg = read.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    if let Some(envelope) = Envelope::parse(&text) {
                                        let delivered = registry.dispatch(&envelope);
                                        tracing::trace!(kind = %envelope.kind, delivered, "feed event dispatched");
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => {
                                    tracing::debug!("feed socket closed by server");
                                    break;
                                }
                                Some(Err(err)) => {
                                    tracing::debug!(err = %err, "feed socket error");
                                    break;
                                }
                                _ => {} // ping/pong/binary ignored
                            },
                        }
                    }
                    // First reconnect after an open socket drops.
                    attempt = 1;
                }
                Err(err) => {
                    tracing::debug!(url = %url, err = %err, "feed socket connect failed");
                    attempt = attempt.saturating_add(1);
                }
            }
        }

        // Publish the terminal state unless a newer driver or a manual
        // close already owns the slot.
        match shared.upgrade() {
            Some(shared) => {
                let mut slot = shared.driver.lock();
                if slot.as_ref().is_some_and(|d| d.id == driver_id) {
                    *slot = None;
                    state_tx.send_replace(SocketState::Closed);
                }
            }
            None => {
                state_tx.send_replace(SocketState::Closed);
            }
        }
    });
}

/// Publish `state` while `driver_id` still owns the driver slot. A
/// driver that has lost the slot must leave the state channel alone; a
/// dial that completes after a manual close must not reopen the socket.
fn publish_if_owned(shared: &Weak<Shared>, driver_id: u64, state: SocketState) -> bool {
    let Some(shared) = shared.upgrade() else {
        return false;
    };
    let slot = shared.driver.lock();
    let owned = slot.as_ref().is_some_and(|d| d.id == driver_id);
    if owned {
        shared.state_tx.send_replace(state);
    }
    owned
}

#[cfg(test)]
#[path = "socket_tests.rs"]
mod tests;
