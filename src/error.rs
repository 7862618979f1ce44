//! Error types for the chat hub
//!
//! Defines application-level errors and connection write errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::{ClientId, RoomId};

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// business errors (error envelope sent back to the requester).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Channel send error (fatal - hub channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Frame could not be decoded into a request envelope
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Request type is not one of the known opcodes
    #[error("Unknown request type: {0}")]
    UnknownOpcode(String),

    /// Body does not match the shape required by its request type
    #[error("Invalid {opcode} body: {source}")]
    InvalidBody {
        opcode: &'static str,
        source: serde_json::Error,
    },

    /// Body field present but unusable (e.g. empty)
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Join targeted a room that does not exist
    #[error("Cannot join unknown room: {0}")]
    JoinUnknownRoom(RoomId),

    /// Room does not exist
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    /// User is already a member of another room
    #[error("Already in room {0}")]
    AlreadyInRoom(RoomId),

    /// User record no longer exists
    #[error("User not found: {0}")]
    UserNotFound(ClientId),
}

/// Connection write errors
///
/// Occurs when the writer side of a connection has gone away.
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection's outbound queue has been closed
    #[error("Connection closed")]
    ConnectionClosed,
}
