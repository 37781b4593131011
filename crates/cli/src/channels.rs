// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed views over the realtime feed: notifications and quiz lifecycle
//! events. Each channel is one event kind plus the payload shape the
//! backend puts on it.

use campusfeed::{FeedClient, TypedSubscription};
use serde::Deserialize;

pub const NOTIFICATION_NEW: &str = "notification:new";
pub const NOTIFICATION_ACK: &str = "notification:ack";
pub const QUIZ_PUBLISHED: &str = "quiz:published";
pub const QUIZ_UPDATED: &str = "quiz:updated";
pub const QUIZ_CLOSED: &str = "quiz:closed";

/// A notification pushed by the backend. Field names follow the REST
/// notification resource.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub notification_id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A quiz lifecycle event. Feed payloads use camelCase field names.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizEvent {
    pub quiz_id: i64,
    #[serde(default)]
    pub offering_id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
}

pub struct NotificationChannel;

impl NotificationChannel {
    /// Listen for new notifications.
    pub fn subscribe(feed: &FeedClient) -> TypedSubscription<Notification> {
        feed.subscribe_typed(NOTIFICATION_NEW)
    }

    /// Report a notification as read. Like any send this is a no-op
    /// unless the feed is open.
    pub fn acknowledge(feed: &FeedClient, notification_id: i64) {
        feed.send(NOTIFICATION_ACK, serde_json::json!({ "notification_id": notification_id }));
    }
}

pub struct QuizChannel;

impl QuizChannel {
    pub fn subscribe_published(feed: &FeedClient) -> TypedSubscription<QuizEvent> {
        feed.subscribe_typed(QUIZ_PUBLISHED)
    }

    pub fn subscribe_updated(feed: &FeedClient) -> TypedSubscription<QuizEvent> {
        feed.subscribe_typed(QUIZ_UPDATED)
    }

    pub fn subscribe_closed(feed: &FeedClient) -> TypedSubscription<QuizEvent> {
        feed.subscribe_typed(QUIZ_CLOSED)
    }
}

#[cfg(test)]
#[path = "channels_tests.rs"]
mod tests;
