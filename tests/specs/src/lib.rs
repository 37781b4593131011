// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end tests.
//!
//! `MockLms` is an in-process campus backend covering the auth/profile
//! REST surface and the `/ws` realtime endpoint, with hooks to push
//! frames, record inbound frames, and sever live sockets. The module
//! also resolves the compiled `campus` binary for smoke tests.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

/// Credentials the mock backend accepts.
pub const USERNAME: &str = "jlee";
pub const PASSWORD: &str = "sesame";
pub const USER_ID: i64 = 7;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call more than once; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolve the path to the compiled `campus` binary.
pub fn campus_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("campus")
}

/// `campus` invocation wired to the mock backend with an isolated state
/// directory and test-sized reconnect timing.
pub fn campus_cmd(lms: &MockLms, state_dir: &Path) -> anyhow::Result<tokio::process::Command> {
    let binary = campus_binary();
    anyhow::ensure!(binary.exists(), "campus binary not found at {}", binary.display());

    let mut cmd = tokio::process::Command::new(binary);
    cmd.env("CAMPUS_API_URL", lms.base_url())
        .env("CAMPUS_REALTIME_URL", lms.ws_url())
        .env("CAMPUS_STATE_DIR", state_dir)
        .env("CAMPUS_RECONNECT_BASE_MS", "50")
        .env("CAMPUS_RECONNECT_MAX_ATTEMPTS", "3")
        .env_remove("CAMPUS_PASSWORD")
        .env_remove("CAMPUS_LOG_FORMAT")
        .env_remove("CAMPUS_LOG_LEVEL")
        .kill_on_drop(true);
    Ok(cmd)
}

struct LmsState {
    /// Access token accepted on authorized routes. Empty means nothing
    /// is accepted.
    token: std::sync::Mutex<String>,
    refresh: std::sync::Mutex<String>,
    token_seq: AtomicU32,
    login_calls: AtomicU32,
    logout_calls: AtomicU32,
    ws_upgrades: AtomicU32,
    ws_live: AtomicU32,
    push_tx: broadcast::Sender<String>,
    kick_tx: broadcast::Sender<()>,
    inbound_tx: mpsc::UnboundedSender<serde_json::Value>,
}

impl LmsState {
    fn lock_token(&self) -> std::sync::MutexGuard<'_, String> {
        self.token.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_refresh(&self) -> std::sync::MutexGuard<'_, String> {
        self.refresh.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_token(&self) -> u32 {
        self.token_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let token = self.lock_token();
        if token.is_empty() {
            return false;
        }
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == format!("Bearer {}", *token))
            .unwrap_or(false)
    }
}

/// In-process campus backend for tests.
pub struct MockLms {
    addr: SocketAddr,
    state: Arc<LmsState>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<serde_json::Value>>,
    server: tokio::task::JoinHandle<()>,
}

impl MockLms {
    /// Bind a free port and start serving. Accepted credentials are
    /// [`USERNAME`] / [`PASSWORD`], profile id [`USER_ID`].
    pub async fn spawn() -> anyhow::Result<Self> {
        ensure_crypto();

        let (push_tx, _) = broadcast::channel(64);
        let (kick_tx, _) = broadcast::channel(8);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(LmsState {
            token: std::sync::Mutex::new(String::new()),
            refresh: std::sync::Mutex::new(String::new()),
            token_seq: AtomicU32::new(0),
            login_calls: AtomicU32::new(0),
            logout_calls: AtomicU32::new(0),
            ws_upgrades: AtomicU32::new(0),
            ws_live: AtomicU32::new(0),
            push_tx,
            kick_tx,
            inbound_tx,
        });

        let app = router(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            state,
            inbound: tokio::sync::Mutex::new(inbound_rx),
            server,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Access token currently accepted on authorized routes.
    pub fn current_token(&self) -> String {
        self.state.lock_token().clone()
    }

    /// Stop accepting the current access token. The refresh token stays
    /// valid.
    pub fn revoke_tokens(&self) {
        self.state.lock_token().clear();
    }

    /// Push one `{type, payload}` frame to every live socket.
    pub fn push(&self, kind: &str, payload: serde_json::Value) {
        let frame = serde_json::json!({ "type": kind, "payload": payload });
        let _ = self.state.push_tx.send(frame.to_string());
    }

    /// Push a raw text frame verbatim.
    pub fn push_raw(&self, text: &str) {
        let _ = self.state.push_tx.send(text.to_string());
    }

    /// Next frame any client sent, or `None` after `timeout`.
    pub async fn next_inbound(&self, timeout: Duration) -> Option<serde_json::Value> {
        let mut rx = self.inbound.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Sever every live socket without stopping the server.
    pub fn drop_sockets(&self) {
        let _ = self.state.kick_tx.send(());
    }

    /// Stop the server entirely: no more upgrades, live sockets cut.
    pub fn shutdown(&self) {
        let _ = self.state.kick_tx.send(());
        self.server.abort();
    }

    pub fn ws_upgrades(&self) -> u32 {
        self.state.ws_upgrades.load(Ordering::Relaxed)
    }

    pub fn ws_live(&self) -> u32 {
        self.state.ws_live.load(Ordering::Relaxed)
    }

    pub fn login_calls(&self) -> u32 {
        self.state.login_calls.load(Ordering::Relaxed)
    }

    pub fn logout_calls(&self) -> u32 {
        self.state.logout_calls.load(Ordering::Relaxed)
    }

    /// Wait until the live socket count reaches `n`.
    pub async fn wait_live(&self, n: u32, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.ws_live() == n {
                return Ok(());
            }
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("live socket count never reached {n} within {timeout:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until the cumulative upgrade count reaches `n`.
    pub async fn wait_upgrades(&self, n: u32, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.ws_upgrades() >= n {
                return Ok(());
            }
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("upgrade count never reached {n} within {timeout:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for MockLms {
    fn drop(&mut self) {
        let _ = self.state.kick_tx.send(());
        self.server.abort();
    }
}

#[derive(serde::Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

fn error_body(code: &str, detail: &str) -> String {
    serde_json::json!({ "code": code, "detail": detail }).to_string()
}

fn router(state: Arc<LmsState>) -> Router {
    Router::new()
        .route(
            "/api/v1/auth/login",
            post({
                let state = Arc::clone(&state);
                move |axum::Form(form): axum::Form<LoginForm>| {
                    let state = Arc::clone(&state);
                    async move {
                        state.login_calls.fetch_add(1, Ordering::Relaxed);
                        if form.username == USERNAME && form.password == PASSWORD {
                            let n = state.next_token();
                            let access = format!("tok-{n}");
                            let refresh = format!("ref-{n}");
                            *state.lock_token() = access.clone();
                            *state.lock_refresh() = refresh.clone();
                            let body = serde_json::json!({
                                "access_token": access,
                                "refresh_token": refresh,
                                "token_type": "bearer",
                                "user_id": USER_ID,
                                "username": USERNAME,
                                "role": "Student",
                            });
                            (StatusCode::OK, body.to_string())
                        } else {
                            (
                                StatusCode::UNAUTHORIZED,
                                error_body("INVALID_CREDENTIALS", "Incorrect username or password"),
                            )
                        }
                    }
                }
            }),
        )
        .route(
            "/api/v1/auth/refresh",
            post({
                let state = Arc::clone(&state);
                move |axum::Json(body): axum::Json<serde_json::Value>| {
                    let state = Arc::clone(&state);
                    async move {
                        let expected = state.lock_refresh().clone();
                        if !expected.is_empty()
                            && body["refresh_token"].as_str() == Some(expected.as_str())
                        {
                            let access = format!("tok-{}", state.next_token());
                            *state.lock_token() = access.clone();
                            let body = serde_json::json!({
                                "access_token": access,
                                "token_type": "bearer",
                            });
                            (StatusCode::OK, body.to_string())
                        } else {
                            (
                                StatusCode::UNAUTHORIZED,
                                error_body("INVALID_REFRESH", "Invalid refresh token"),
                            )
                        }
                    }
                }
            }),
        )
        .route(
            "/api/v1/auth/logout",
            post({
                let state = Arc::clone(&state);
                move || {
                    let state = Arc::clone(&state);
                    async move {
                        state.logout_calls.fetch_add(1, Ordering::Relaxed);
                        state.lock_token().clear();
                        state.lock_refresh().clear();
                        StatusCode::NO_CONTENT
                    }
                }
            }),
        )
        .route(
            "/api/v1/users/{id}",
            get({
                let state = Arc::clone(&state);
                move |axum::extract::Path(id): axum::extract::Path<i64>, headers: HeaderMap| {
                    let state = Arc::clone(&state);
                    async move {
                        if !state.authorized(&headers) {
                            return (
                                StatusCode::UNAUTHORIZED,
                                error_body("NOT_AUTHENTICATED", "Not authenticated"),
                            );
                        }
                        if id != USER_ID {
                            return (
                                StatusCode::NOT_FOUND,
                                error_body("USER_NOT_FOUND", "User not found"),
                            );
                        }
                        let body = serde_json::json!({
                            "user_id": USER_ID,
                            "username": USERNAME,
                            "email": "jlee@campus.edu",
                            "full_name": "Jordan Lee",
                            "role": {"id": 2, "name": "Student"},
                        });
                        (StatusCode::OK, body.to_string())
                    }
                }
            }),
        )
        .route(
            "/healthz",
            get(|| async { (StatusCode::OK, serde_json::json!({"status": "ok"}).to_string()) }),
        )
        .route(
            "/ws",
            get({
                let state = Arc::clone(&state);
                move |ws: WebSocketUpgrade| {
                    let state = Arc::clone(&state);
                    async move { ws.on_upgrade(move |socket| ws_session(socket, state)) }
                }
            }),
        )
}

/// One live socket: relay pushed frames out, record inbound text frames,
/// close on kick.
async fn ws_session(socket: WebSocket, state: Arc<LmsState>) {
    // Subscribe before bumping the counters so a caller who has seen
    // them can push frames without racing the subscription.
    let mut push_rx = state.push_tx.subscribe();
    let mut kick_rx = state.kick_tx.subscribe();
    state.ws_upgrades.fetch_add(1, Ordering::Relaxed);
    state.ws_live.fetch_add(1, Ordering::Relaxed);
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            frame = push_rx.recv() => match frame {
                Ok(text) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = kick_rx.recv() => break,
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
                        let _ = state.inbound_tx.send(value);
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.ws_live.fetch_sub(1, Ordering::Relaxed);
}
