//! Multi-room WebSocket Chat Hub Library
//!
//! The real-time core of a multi-room chat service built with
//! tokio-tungstenite, using the Actor pattern for state management.
//!
//! # Features
//! - Client admission with server-assigned ids and default profiles
//! - Topic rooms (listed) and per-user personal rooms (unlisted)
//! - Username changes announced to the current room
//! - Bounded per-room history with cursor pagination
//! - Fan-out that reaps dead peers without interrupting delivery
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Hub` is the single consumer of every event and the only writer of
//!   the connection, user, room and message stores
//! - Each connection has a reader task that decodes frames into requests
//!   and a writer task that drains the connection's outbound queue
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use room_hub::{handle_connection, Hub, HubOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let (hub_tx, hub_rx) = mpsc::channel(256);
//!
//!     tokio::spawn(Hub::new(hub_rx, HubOptions::default()).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let hub_tx = hub_tx.clone();
//!         tokio::spawn(handle_connection(stream, hub_tx));
//!     }
//! }
//! ```

pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod history;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod server;
pub mod types;
pub mod user;

// Re-export main types for convenience
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use connection::Connection;
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use history::{ChatMessage, MessageLog, MessageView};
pub use protocol::{ErrorCode, Request, RequestPayload, Response, ResponseType};
pub use registry::ConnectionRegistry;
pub use room::{Room, RoomDirectory, RoomKind};
pub use server::{Hub, HubCommand, HubOptions};
pub use types::{ClientId, MessageId, RequestId, RoomId};
pub use user::{User, UserDirectory};
