// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User records as served by the campus backend, plus the persisted
//! session layout.

use serde::{Deserialize, Serialize};

/// Role object attached to a user, e.g. `{"id": 2, "name": "Student"}`.
/// Some endpoints only carry the role name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
}

impl Role {
    pub fn named(name: impl Into<String>) -> Self {
        Self { id: None, name: name.into() }
    }
}

/// A user record. Only `user_id` and `username` are always present;
/// everything else depends on which endpoint produced the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl User {
    /// Minimal record from a login response: id, username, role name.
    pub fn minimal(user_id: i64, username: impl Into<String>, role: Option<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            email: None,
            full_name: None,
            phone: None,
            status: None,
            profile_image_path: None,
            last_login: None,
            role: role.map(Role::named),
        }
    }

    /// Merge `patch` into this record. `Some` fields overwrite, `None`
    /// fields are left alone; identity (`user_id`) never changes.
    pub fn apply(&mut self, patch: UserPatch) {
        if let Some(username) = patch.username {
            self.username = username;
        }
        if let Some(email) = patch.email {
            self.email = Some(email);
        }
        if let Some(full_name) = patch.full_name {
            self.full_name = Some(full_name);
        }
        if let Some(phone) = patch.phone {
            self.phone = Some(phone);
        }
        if let Some(status) = patch.status {
            self.status = Some(status);
        }
        if let Some(profile_image_path) = patch.profile_image_path {
            self.profile_image_path = Some(profile_image_path);
        }
        if let Some(last_login) = patch.last_login {
            self.last_login = Some(last_login);
        }
        if let Some(role) = patch.role {
            self.role = Some(role);
        }
    }
}

/// Partial user update; every field optional, PATCH semantics.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub profile_image_path: Option<String>,
    pub last_login: Option<String>,
    pub role: Option<Role>,
}

impl From<User> for UserPatch {
    fn from(user: User) -> Self {
        Self {
            username: Some(user.username),
            email: user.email,
            full_name: user.full_name,
            phone: user.phone,
            status: user.status,
            profile_image_path: user.profile_image_path,
            last_login: user.last_login,
            role: user.role,
        }
    }
}

/// Durable session record, one JSON document under a well-known key.
/// Absence means "no prior session".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAuthRecord {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub is_authenticated: bool,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
