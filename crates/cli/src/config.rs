// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use campusfeed::{FeedConfig, ReconnectPolicy};
use clap::Args;

/// Process-wide configuration, shared by every subcommand.
#[derive(Debug, Args)]
pub struct Config {
    /// Campus REST API base URL.
    #[arg(long, env = "CAMPUS_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Realtime feed WebSocket URL.
    #[arg(long, env = "CAMPUS_REALTIME_URL", default_value = "ws://localhost:8000/ws")]
    pub realtime_url: String,

    /// Directory for persisted session state.
    #[arg(long, env = "CAMPUS_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Log format (json or text).
    #[arg(long, env = "CAMPUS_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "CAMPUS_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// First reconnect delay in ms; doubles on every further attempt.
    #[arg(long, env = "CAMPUS_RECONNECT_BASE_MS", default_value = "1000")]
    pub reconnect_base_ms: u64,

    /// Reconnect attempts before giving up (0 disables reconnection).
    #[arg(long, env = "CAMPUS_RECONNECT_MAX_ATTEMPTS", default_value = "5")]
    pub reconnect_max_attempts: u32,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(url_scheme(&self.api_url), Some("http" | "https")) {
            anyhow::bail!("--api-url must be an http(s) URL: {}", self.api_url);
        }
        if !matches!(url_scheme(&self.realtime_url), Some("ws" | "wss")) {
            anyhow::bail!("--realtime-url must be a ws(s) URL: {}", self.realtime_url);
        }
        Ok(())
    }

    /// API base with any trailing slash removed, ready for path joins.
    pub fn api_base(&self) -> String {
        self.api_url.trim_end_matches('/').to_string()
    }

    /// Resolve the state directory.
    ///
    /// Checks `--state-dir`/`CAMPUS_STATE_DIR`, then `$XDG_STATE_HOME/campus`,
    /// then `$HOME/.local/state/campus`.
    pub fn resolved_state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("campus");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/campus");
        }
        PathBuf::from(".campus")
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.reconnect_base_ms),
            self.reconnect_max_attempts,
        )
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig { url: self.realtime_url.clone(), policy: self.reconnect_policy() }
    }

    /// Build a minimal `Config` for tests.
    #[doc(hidden)]
    pub fn test(state_dir: PathBuf) -> Self {
        Self {
            api_url: "http://127.0.0.1:1".into(),
            realtime_url: "ws://127.0.0.1:1/ws".into(),
            state_dir: Some(state_dir),
            log_format: "text".into(),
            log_level: "debug".into(),
            reconnect_base_ms: 10,
            reconnect_max_attempts: 3,
        }
    }
}

fn url_scheme(url: &str) -> Option<&str> {
    url.split_once("://").map(|(scheme, _)| scheme)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
