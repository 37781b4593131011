// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::Deserialize;
use std::fmt;

/// Message shown when the backend rejects a previously-valid session.
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired, please log in again";

/// Error envelope produced by the campus backend on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub detail: String,
}

/// Failures surfaced by the API client.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Backend answered with a structured error body.
    Api { status: u16, code: String, detail: String },
    /// A 401 arrived on an authenticated session; local state was cleared.
    SessionExpired,
    /// The request never produced a usable response.
    Transport(String),
    /// The response body did not match the expected shape.
    Decode(String),
}

impl ApiError {
    /// Build an error from a non-2xx response. Bodies that are not the
    /// usual `{"code", "detail"}` envelope fall back to a generic code.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(err) => Self::Api { status, code: err.code, detail: err.detail },
            Err(_) => Self::Api {
                status,
                code: "HTTP_ERROR".to_string(),
                detail: format!("Request failed with status {status}"),
            },
        }
    }

    /// Map a low-level client failure to a user-facing message.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport("Request timed out, please try again".to_string())
        } else if err.is_connect() {
            Self::Transport("Cannot reach the campus server".to_string())
        } else {
            Self::Transport(format!("Request failed: {err}"))
        }
    }

    pub fn decode(context: &str, err: &serde_json::Error) -> Self {
        Self::Decode(format!("Unexpected {context} response: {err}"))
    }

    /// HTTP status when one is known for this failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::SessionExpired => Some(401),
            Self::Transport(_) | Self::Decode(_) => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api { detail, .. } => f.write_str(detail),
            Self::SessionExpired => f.write_str(SESSION_EXPIRED_MESSAGE),
            Self::Transport(msg) | Self::Decode(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
