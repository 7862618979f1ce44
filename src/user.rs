//! User profiles and the user directory
//!
//! A `User` is created when a connection registers, renamed through
//! `CHANGE_USERNAME`, and removed when the connection goes away.

use dashmap::DashMap;
use serde::Serialize;

use crate::types::ClientId;

/// Placeholder shown for authors that no longer exist
pub const REMOVED: &str = "<removed>";

/// Public user profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Same value as the owning connection's client id
    pub id: ClientId,
    /// Display name, starts out as the client id
    pub username: String,
    /// Avatar URL
    pub avatar: String,
}

impl User {
    /// Create a profile with the client id as placeholder username
    pub fn new(id: ClientId, avatar: impl Into<String>) -> Self {
        Self {
            id,
            username: id.to_string(),
            avatar: avatar.into(),
        }
    }
}

/// Author embedded into outgoing messages
///
/// Falls back to a `<removed>` profile when the author disconnected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Author {
    User(User),
    Removed {
        id: &'static str,
        username: &'static str,
        avatar: &'static str,
    },
}

impl Author {
    pub fn removed() -> Self {
        Author::Removed {
            id: REMOVED,
            username: REMOVED,
            avatar: "",
        }
    }
}

impl From<Option<User>> for Author {
    fn from(user: Option<User>) -> Self {
        user.map(Author::User).unwrap_or_else(Author::removed)
    }
}

/// Client id -> profile
///
/// Whole-record overwrite is the only update: load, modify, store.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: DashMap<ClientId, User>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, id: ClientId, user: User) {
        self.users.insert(id, user);
    }

    pub fn load(&self, id: &ClientId) -> Option<User> {
        self.users.get(id).map(|entry| entry.value().clone())
    }

    pub fn delete(&self, id: &ClientId) {
        self.users.remove(id);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
