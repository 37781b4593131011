// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the campus backend.
//!
//! Every authorized request reads the bearer token from the session store
//! at send time, so a login or logout takes effect on the next call without
//! rebuilding the client. Responses go through one interceptor: a 401 on an
//! authenticated session expires it (exactly once), other failures map to
//! [`ApiError`].

use crate::error::ApiError;
use crate::session::SessionStore;
use crate::types::{User, UserPatch};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Token grant returned by the login and refresh endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Typed client for the campus REST API.
pub struct ApiClient {
    base_url: String,
    session: Arc<SessionStore>,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: Arc<SessionStore>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { base_url: base_url.into(), session, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Authenticate and install the session. On success the profile is
    /// enriched best-effort from the users endpoint; on failure the error
    /// is recorded in the session and returned.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        remember: bool,
    ) -> Result<(), ApiError> {
        self.session.set_loading(true);
        match self.try_login(username, password, remember).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.session.login_failure(err.to_string());
                Err(err)
            }
        }
    }

    async fn try_login(
        &self,
        username: &str,
        password: &str,
        remember: bool,
    ) -> Result<(), ApiError> {
        let form = [("username", username), ("password", password)];
        // The login endpoint is anonymous: a 401 here is bad credentials,
        // not an expired session, so it skips the interceptor.
        let resp = self
            .client
            .post(self.url("/api/v1/auth/login"))
            .form(&form)
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| ApiError::from_transport(&e))?;
        if !status.is_success() {
            return Err(ApiError::from_response(status.as_u16(), &body));
        }
        let token: TokenResponse = decode_body("login", &body)?;

        let profile = User::minimal(
            token.user_id.unwrap_or_default(),
            token.username.as_deref().unwrap_or(username),
            token.role.clone(),
        );
        self.session.login_success(profile, token.access_token, token.refresh_token, remember);

        // Best-effort enrichment; the login already succeeded.
        if let Some(user_id) = token.user_id {
            match self.get_user(user_id).await {
                Ok(user) => self.session.update_user(UserPatch::from(user)),
                Err(e) => debug!(err = %e, "profile enrichment failed"),
            }
        }
        Ok(())
    }

    /// Revoke the session server-side when possible, then always clear it
    /// locally.
    pub async fn logout(&self) {
        let req = self.apply_auth(self.client.post(self.url("/api/v1/auth/logout")));
        match req.send().await {
            Ok(resp) if !resp.status().is_success() => {
                debug!(status = resp.status().as_u16(), "server-side logout failed");
            }
            Ok(_) => {}
            Err(e) => debug!(err = %e, "server-side logout failed"),
        }
        self.session.logout();
    }

    /// Rotate the access token. Returns false when the session holds no
    /// refresh token.
    pub async fn refresh_token(&self) -> Result<bool, ApiError> {
        let Some(refresh_token) = self.session.refresh_token() else {
            return Ok(false);
        };
        let body = serde_json::json!({ "refresh_token": refresh_token });
        let req = self.apply_auth(self.client.post(self.url("/api/v1/auth/refresh")).json(&body));
        let token: TokenResponse = self.request("refresh", req).await?;
        self.session.set_token(token.access_token);
        Ok(true)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<User, ApiError> {
        let req = self.apply_auth(self.client.get(self.url(&format!("/api/v1/users/{user_id}"))));
        self.request("user", req).await
    }

    /// Re-fetch the signed-in user's profile and merge it into the
    /// session. Returns `Ok(None)` when signed out.
    pub async fn fetch_profile(&self) -> Result<Option<User>, ApiError> {
        let Some(user_id) = self.session.user_id() else {
            return Ok(None);
        };
        let user = self.get_user(user_id).await?;
        self.session.update_user(UserPatch::from(user.clone()));
        Ok(Some(user))
    }

    /// Backend liveness probe.
    pub async fn health(&self) -> Result<serde_json::Value, ApiError> {
        let req = self.client.get(self.url("/healthz"));
        self.request("health", req).await
    }

    /// Send a request and run the response interceptor: 401 expires an
    /// authenticated session, other non-2xx map to the backend's error
    /// envelope, transport failures get the normalized message.
    async fn request<T: DeserializeOwned>(
        &self,
        context: &'static str,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let resp = req.send().await.map_err(|e| ApiError::from_transport(&e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| ApiError::from_transport(&e))?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            if self.session.handle_unauthorized() {
                return Err(ApiError::SessionExpired);
            }
            return Err(ApiError::from_response(status.as_u16(), &body));
        }
        if !status.is_success() {
            return Err(ApiError::from_response(status.as_u16(), &body));
        }
        decode_body(context, &body)
    }
}

fn decode_body<T: DeserializeOwned>(context: &'static str, body: &str) -> Result<T, ApiError> {
    // 204s and empty bodies decode as JSON null.
    let body = if body.is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| ApiError::decode(context, &e))
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
