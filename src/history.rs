//! Per-room message history
//!
//! Messages are kept in arrival order. The log itself never evicts: the hub
//! drops the oldest entry before appending once a room is at capacity.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;

use crate::types::{ClientId, MessageId, RoomId};
use crate::user::Author;

/// Stored chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub user_id: ClientId,
    pub room_id: RoomId,
    pub message: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Message as sent to clients, optionally with the author profile embedded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Author>,
}

impl MessageView {
    pub fn bare(message: ChatMessage) -> Self {
        Self {
            message,
            user: None,
        }
    }

    pub fn with_author(message: ChatMessage, author: Author) -> Self {
        Self {
            message,
            user: Some(author),
        }
    }
}

/// Room id -> ordered messages
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Mutex<HashMap<RoomId, VecDeque<ChatMessage>>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, room_id: &RoomId) -> usize {
        self.messages
            .lock()
            .get(room_id)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    pub fn append(&self, room_id: &RoomId, message: ChatMessage) {
        self.messages
            .lock()
            .entry(room_id.clone())
            .or_default()
            .push_back(message);
    }

    /// Replace a room's whole history
    pub fn set(&self, room_id: &RoomId, messages: Vec<ChatMessage>) {
        self.messages
            .lock()
            .insert(room_id.clone(), VecDeque::from(messages));
    }

    /// Full history of a room, oldest first
    pub fn get(&self, room_id: &RoomId) -> Vec<ChatMessage> {
        self.messages
            .lock()
            .get(room_id)
            .map(|messages| messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop the oldest message of a room
    pub fn evict_oldest(&self, room_id: &RoomId) -> Option<ChatMessage> {
        self.messages
            .lock()
            .get_mut(room_id)
            .and_then(VecDeque::pop_front)
    }

    /// Up to `n` messages, oldest first
    ///
    /// Without a cursor these are the `n` most recent messages. With a cursor
    /// they are the `n` messages right before the one with that id; an
    /// unknown cursor behaves like no cursor.
    pub fn get_last_n(
        &self,
        room_id: &RoomId,
        n: usize,
        cursor: Option<&MessageId>,
    ) -> Vec<ChatMessage> {
        let guard = self.messages.lock();
        let Some(messages) = guard.get(room_id) else {
            return Vec::new();
        };

        let end = cursor
            .and_then(|cursor| messages.iter().position(|m| &m.id == cursor))
            .unwrap_or(messages.len());
        let start = end.saturating_sub(n);

        messages.range(start..end).cloned().collect()
    }
}
