// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session store: the single owner of "who is logged in".
//!
//! State lives behind a [`parking_lot::RwLock`]; changes other parts of the
//! process care about (login, logout, expiry) are broadcast as
//! [`SessionEvent`]s. Persistence goes through the injected [`StateStore`],
//! and every storage failure degrades to an in-memory-only session rather
//! than surfacing to callers.

use crate::error::SESSION_EXPIRED_MESSAGE;
use crate::store::StateStore;
use crate::types::{PersistedAuthRecord, User, UserPatch};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Storage key for the persisted session record.
const AUTH_KEY: &str = "auth";
/// Storage key for the bare access token, kept alongside the record for
/// tools that only need the token.
const TOKEN_KEY: &str = "token";

/// In-memory session snapshot.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub user: Option<User>,
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    /// An auth request is in flight.
    pub loading: bool,
    /// Last auth failure, shown to the user until the next attempt.
    pub error: Option<String>,
    /// True once hydration has run, whether or not it found anything.
    pub ready: bool,
}

impl SessionState {
    /// Authenticated means both a user and a token are present. The flag
    /// is derived so it can never disagree with the fields it summarizes.
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.token.is_some()
    }
}

/// Events broadcast by the session store.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A login completed and the session is authenticated.
    LoggedIn { username: String },
    /// The session was cleared locally.
    LoggedOut,
    /// The access token was rotated; bearer injection picks it up live.
    TokenRefreshed,
    /// The backend rejected the session; local state has been cleared.
    Expired { message: String },
}

pub struct SessionStore {
    store: Arc<dyn StateStore>,
    state: RwLock<SessionState>,
    /// Whether changes should be written back to storage.
    remembered: AtomicBool,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    /// Create a store over the given persistence backend. The session
    /// starts empty and not ready; call [`hydrate`](Self::hydrate) once at
    /// startup.
    pub fn new(store: Arc<dyn StateStore>) -> (Arc<Self>, broadcast::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = broadcast::channel(64);
        let this = Arc::new(Self {
            store,
            state: RwLock::new(SessionState::default()),
            remembered: AtomicBool::new(false),
            event_tx,
        });
        (this, event_rx)
    }

    /// Restore a previous session from storage. Missing, corrupt, or
    /// unreadable state degrades to signed-out; either way the session is
    /// `ready` afterwards. Calling it again re-reads storage.
    pub fn hydrate(&self) {
        let record = self.read_persisted();
        let found = record.is_some();
        {
            let mut state = self.state.write();
            *state = SessionState::default();
            if let Some(record) = record {
                state.user = record.user;
                state.token = record.token;
                state.refresh_token = record.refresh_token;
            }
            state.ready = true;
            if let (Some(user), Some(_)) = (&state.user, &state.token) {
                debug!(username = %user.username, "session restored");
            }
        }
        self.remembered.store(found, Ordering::Relaxed);
    }

    /// Install an authenticated session. Persists it iff `remember`;
    /// otherwise any stale persisted record is removed so a reload cannot
    /// resurrect it.
    pub fn login_success(
        &self,
        user: User,
        token: impl Into<String>,
        refresh_token: Option<String>,
        remember: bool,
    ) {
        let username = user.username.clone();
        let record = {
            let mut state = self.state.write();
            state.user = Some(user);
            state.token = Some(token.into());
            state.refresh_token = refresh_token;
            state.loading = false;
            state.error = None;
            state.ready = true;
            record_of(&state)
        };
        self.remembered.store(remember, Ordering::Relaxed);
        if remember {
            self.persist(&record);
        } else {
            self.clear_persisted();
        }
        info!(username = %username, "logged in");
        let _ = self.event_tx.send(SessionEvent::LoggedIn { username });
    }

    /// Record a failed login attempt. Only `loading` and `error` change;
    /// an existing authenticated session stays intact.
    pub fn login_failure(&self, message: impl Into<String>) {
        let mut state = self.state.write();
        state.loading = false;
        state.error = Some(message.into());
    }

    /// Clear the session locally and remove persisted state.
    pub fn logout(&self) {
        self.clear_session();
        info!("logged out");
        let _ = self.event_tx.send(SessionEvent::LoggedOut);
    }

    /// React to a 401 on an authorized call. Clears the session and emits
    /// [`SessionEvent::Expired`] only when a session was actually present,
    /// so anonymous requests cannot trigger logout loops. Returns whether
    /// it acted.
    pub fn handle_unauthorized(&self) -> bool {
        {
            let mut state = self.state.write();
            if !state.is_authenticated() {
                return false;
            }
            *state = SessionState { ready: true, ..SessionState::default() };
        }
        self.remembered.store(false, Ordering::Relaxed);
        self.clear_persisted();
        warn!("session rejected by the backend, signing out");
        let _ = self
            .event_tx
            .send(SessionEvent::Expired { message: SESSION_EXPIRED_MESSAGE.to_string() });
        true
    }

    /// Merge profile fields into the current user. No-op when signed out.
    pub fn update_user(&self, patch: UserPatch) {
        let record = {
            let mut state = self.state.write();
            let Some(user) = state.user.as_mut() else {
                return;
            };
            user.apply(patch);
            record_of(&state)
        };
        if self.remembered.load(Ordering::Relaxed) {
            self.persist(&record);
        }
    }

    /// Install a rotated access token. Readers pick it up immediately;
    /// persisted state follows when the session is remembered.
    pub fn set_token(&self, token: impl Into<String>) {
        let record = {
            let mut state = self.state.write();
            state.token = Some(token.into());
            record_of(&state)
        };
        if self.remembered.load(Ordering::Relaxed) {
            self.persist(&record);
        }
        let _ = self.event_tx.send(SessionEvent::TokenRefreshed);
    }

    /// Flag an in-flight auth request. Starting a new attempt also clears
    /// the previous error.
    pub fn set_loading(&self, loading: bool) {
        let mut state = self.state.write();
        state.loading = loading;
        if loading {
            state.error = None;
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.state.read().token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state.read().refresh_token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().is_authenticated()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.state.read().user.as_ref().map(|u| u.user_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    fn clear_session(&self) {
        {
            let mut state = self.state.write();
            *state = SessionState { ready: true, ..SessionState::default() };
        }
        self.remembered.store(false, Ordering::Relaxed);
        self.clear_persisted();
    }

    fn read_persisted(&self) -> Option<PersistedAuthRecord> {
        match self.store.get(AUTH_KEY) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(record) => return Some(record),
                Err(e) => debug!(err = %e, "discarding unreadable session record"),
            },
            Ok(None) => {}
            Err(e) => {
                debug!(err = %e, "session storage unavailable");
                return None;
            }
        }
        // No record; older sessions may have stored just the token.
        match self.store.get(TOKEN_KEY) {
            Ok(Some(token)) => {
                Some(PersistedAuthRecord { token: Some(token), ..PersistedAuthRecord::default() })
            }
            Ok(None) => None,
            Err(e) => {
                debug!(err = %e, "session storage unavailable");
                None
            }
        }
    }

    fn persist(&self, record: &PersistedAuthRecord) {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                warn!(err = %e, "failed to encode session record");
                return;
            }
        };
        if let Err(e) = self.store.set(AUTH_KEY, &json) {
            warn!(err = %e, "failed to persist session");
            return;
        }
        match &record.token {
            Some(token) => {
                if let Err(e) = self.store.set(TOKEN_KEY, token) {
                    warn!(err = %e, "failed to persist token");
                }
            }
            None => {
                if let Err(e) = self.store.remove(TOKEN_KEY) {
                    warn!(err = %e, "failed to clear persisted token");
                }
            }
        }
    }

    fn clear_persisted(&self) {
        if let Err(e) = self.store.remove(AUTH_KEY) {
            warn!(err = %e, "failed to clear persisted session");
        }
        if let Err(e) = self.store.remove(TOKEN_KEY) {
            warn!(err = %e, "failed to clear persisted token");
        }
    }
}

fn record_of(state: &SessionState) -> PersistedAuthRecord {
    PersistedAuthRecord {
        user: state.user.clone(),
        token: state.token.clone(),
        refresh_token: state.refresh_token.clone(),
        is_authenticated: state.is_authenticated(),
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
