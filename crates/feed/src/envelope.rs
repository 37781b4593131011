// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format for realtime feed frames.
//!
//! Every frame on the feed socket is a JSON object with a `type` field
//! naming the event kind and an optional `payload` carrying the event
//! body. Frames that do not match this shape are dropped by the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single feed frame: event kind plus arbitrary JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event kind, e.g. `notification:new` or `quiz:published`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event body; `null` when the frame carries no payload.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self { kind: kind.into(), payload }
    }

    /// Parse one text frame. Returns `None` for anything that is not a
    /// JSON object with a non-empty string `type`; the caller logs and
    /// drops such frames without tearing down the connection.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str::<Self>(text) {
            Ok(envelope) if !envelope.kind.is_empty() => Some(envelope),
            Ok(_) => {
                tracing::debug!("feed frame has empty event type, dropping");
                None
            }
            Err(err) => {
                tracing::debug!(err = %err, "unparseable feed frame, dropping");
                None
            }
        }
    }

    /// Encode for transmission.
    pub fn to_text(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
