//! Rooms and the room directory
//!
//! Topic rooms are seeded at startup and listed publicly. Every registered
//! user also gets a personal room keyed by its client id, which is never
//! listed.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use crate::error::AppError;
use crate::types::{ClientId, RoomId};

/// Room kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomKind {
    Topic,
    Personal,
}

/// Chat room with ordered membership
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub kind: RoomKind,
    /// Members in join order
    pub users: Vec<ClientId>,
}

impl Room {
    pub fn new(id: RoomId, name: impl Into<String>, kind: RoomKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            users: Vec::new(),
        }
    }

    /// Check if a user is a member of this room
    pub fn contains(&self, user_id: &ClientId) -> bool {
        self.users.contains(user_id)
    }

    /// Remove the first occurrence of a user
    ///
    /// Returns false if the user was not a member.
    pub fn remove_user(&mut self, user_id: &ClientId) -> bool {
        match self.users.iter().position(|id| id == user_id) {
            Some(index) => {
                self.users.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Result of a successful join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joined {
    /// User was added to the membership list
    New,
    /// User was already a member, nothing changed
    Already,
}

/// Room id -> room
///
/// Mutations hold the write lock for their whole duration; reads clone what
/// they need before releasing.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: RwLock<HashMap<RoomId, Room>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room. Returns false (and changes nothing) if the id exists.
    pub fn create(&self, id: RoomId, name: impl Into<String>, kind: RoomKind) -> bool {
        let mut rooms = self.rooms.write();
        if rooms.contains_key(&id) {
            return false;
        }
        rooms.insert(id.clone(), Room::new(id, name, kind));
        true
    }

    /// Add a user to a room
    ///
    /// A user belongs to at most one room: joining a second room is rejected
    /// with `AlreadyInRoom`, re-joining the current one is a no-op.
    pub fn join(&self, room_id: &RoomId, user_id: ClientId) -> Result<Joined, AppError> {
        let mut rooms = self.rooms.write();
        if !rooms.contains_key(room_id) {
            return Err(AppError::JoinUnknownRoom(room_id.clone()));
        }

        if let Some(current) = rooms.values().find(|room| room.contains(&user_id)) {
            if &current.id == room_id {
                return Ok(Joined::Already);
            }
            return Err(AppError::AlreadyInRoom(current.id.clone()));
        }

        match rooms.get_mut(room_id) {
            Some(room) => {
                room.users.push(user_id);
                Ok(Joined::New)
            }
            None => Err(AppError::JoinUnknownRoom(room_id.clone())),
        }
    }

    /// Remove the first occurrence of a user
    ///
    /// With `None` every room is scanned and the first match removed.
    /// Returns true if a membership entry was removed.
    pub fn leave(&self, room_id: Option<&RoomId>, user_id: &ClientId) -> bool {
        let mut rooms = self.rooms.write();
        match room_id {
            Some(room_id) => rooms
                .get_mut(room_id)
                .map(|room| room.remove_user(user_id))
                .unwrap_or(false),
            None => rooms.values_mut().any(|room| room.remove_user(user_id)),
        }
    }

    /// Members of a room in join order (empty if the room does not exist)
    pub fn users(&self, room_id: &RoomId) -> Vec<ClientId> {
        self.rooms
            .read()
            .get(room_id)
            .map(|room| room.users.clone())
            .unwrap_or_default()
    }

    pub fn room(&self, room_id: &RoomId) -> Option<Room> {
        self.rooms.read().get(room_id).cloned()
    }

    pub fn exists(&self, room_id: &RoomId) -> bool {
        self.rooms.read().contains_key(room_id)
    }

    /// Room listing sorted by name
    ///
    /// Only topic rooms unless `include_all_kinds` is set.
    pub fn rooms(&self, include_all_kinds: bool) -> Vec<Room> {
        let mut listed: Vec<Room> = self
            .rooms
            .read()
            .values()
            .filter(|room| include_all_kinds || room.kind == RoomKind::Topic)
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.0.cmp(&b.id.0)));
        listed
    }

    /// The room a user is currently a member of
    pub fn user_joined_to(&self, user_id: &ClientId) -> Option<Room> {
        self.rooms
            .read()
            .values()
            .find(|room| room.contains(user_id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }
}
