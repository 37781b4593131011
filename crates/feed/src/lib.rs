// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime feed client for the campus backend: one WebSocket carrying
//! `{"type", "payload"}` JSON frames, fanned out to per-kind
//! subscribers, with exponential-backoff reconnection.

pub mod backoff;
pub mod envelope;
pub mod registry;
pub mod socket;
pub mod subscription;

pub use backoff::ReconnectPolicy;
pub use envelope::Envelope;
pub use registry::{ListenerId, ListenerRegistry};
pub use socket::{FeedClient, FeedConfig, SocketState, DEFAULT_FEED_URL};
pub use subscription::{Subscription, TypedSubscription};
