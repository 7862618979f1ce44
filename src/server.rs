//! Hub actor implementation
//!
//! The single consumer of every inbound event and the only writer of the
//! connection, user, room and message stores. Each command is processed to
//! completion before the next one is received, so all state transitions are
//! linearized. All outbound writes go through here as well.

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::connection::Connection;
use crate::error::AppError;
use crate::history::{ChatMessage, MessageLog, MessageView};
use crate::protocol::{Request, RequestPayload, Response};
use crate::registry::ConnectionRegistry;
use crate::room::{Joined, RoomDirectory, RoomKind};
use crate::types::{ClientId, MessageId, RequestId, RoomId};
use crate::user::{Author, User, UserDirectory};

/// Default avatar handed to new users
pub const DEFAULT_AVATAR: &str = "https://picsum.photos/56/56";

/// Commands sent from connection handlers to the hub
#[derive(Debug)]
pub enum HubCommand {
    /// New connection admitted with its client id
    Register { connection: Connection },
    /// Connection closed
    Unregister { client_id: ClientId },
    /// Decoded request from a connection
    Request(Request),
}

/// Hub tuning knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubOptions {
    /// Messages kept per room; the oldest is dropped past this
    pub max_saved_messages: usize,
    /// Page size for history sent on join and on `GET_OLD_MESSAGES`
    pub max_returned_messages: usize,
    /// Avatar given to newly registered users
    pub default_avatar: String,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            max_saved_messages: 500,
            max_returned_messages: 20,
            default_avatar: DEFAULT_AVATAR.to_string(),
        }
    }
}

/// The hub actor
///
/// Owns the four stores. Their internal locks keep them safe to share, but
/// consistency comes from this actor being their only caller.
pub struct Hub {
    options: HubOptions,
    connections: ConnectionRegistry,
    users: UserDirectory,
    rooms: RoomDirectory,
    messages: MessageLog,
    clock: Box<dyn Clock>,
    /// Command receiver channel
    receiver: mpsc::Receiver<HubCommand>,
}

impl Hub {
    /// Create a new hub with the given command receiver
    pub fn new(receiver: mpsc::Receiver<HubCommand>, options: HubOptions) -> Self {
        Self {
            options,
            connections: ConnectionRegistry::new(),
            users: UserDirectory::new(),
            rooms: RoomDirectory::new(),
            messages: MessageLog::new(),
            clock: Box::new(SystemClock),
            receiver,
        }
    }

    /// Replace the clock used for message timestamps
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seed a topic room. Returns false if the id is taken.
    pub fn create_topic_room(&self, id: RoomId, name: impl Into<String>) -> bool {
        self.rooms.create(id, name, RoomKind::Topic)
    }

    /// Fill a room with placeholder messages whose authors do not exist
    pub fn seed_history(&self, room_id: &RoomId, count: usize) {
        let count = count.min(self.options.max_saved_messages);
        let now = self.clock.now_millis();
        let messages = (1..=count)
            .map(|i| ChatMessage {
                id: MessageId::from(RequestId::new()),
                user_id: ClientId::new(),
                room_id: room_id.clone(),
                message: format!("initial {}", i),
                timestamp: now,
            })
            .collect();
        self.messages.set(room_id, messages);
    }

    /// Run the hub event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("Hub started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("Hub shutting down");
    }

    /// Process a single command
    pub(crate) async fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register { connection } => {
                self.register(connection).await;
            }
            HubCommand::Unregister { client_id } => {
                self.unregister(client_id).await;
            }
            HubCommand::Request(request) => {
                self.handle_request(request).await;
            }
        }
    }

    async fn handle_request(&mut self, request: Request) {
        let Request {
            id,
            client_id,
            payload,
        } = request;

        let Some(conn) = self.connections.load(&client_id) else {
            debug!(
                "Dropping {} from unregistered client {}",
                payload.opcode().name(),
                client_id
            );
            return;
        };

        let result = match payload {
            RequestPayload::GetRooms => self.get_rooms(&conn).await,
            RequestPayload::ChangeUsername { username } => {
                self.change_username(&conn, username).await
            }
            RequestPayload::JoinChat { room_id } => self.join_chat(&conn, room_id).await,
            RequestPayload::LeaveChat { room_id } => self.leave_chat(&conn, room_id).await,
            RequestPayload::SendMessage { room_id, message } => {
                self.send_message(&conn, id, room_id, message).await
            }
            RequestPayload::OldMessages {
                room_id,
                oldest_msg_id,
            } => self.old_messages(&conn, room_id, oldest_msg_id).await,
        };

        if let Err(err) = result {
            debug!("Request {} from {} rejected: {}", id, client_id, err);
            self.reply(&conn, err.into()).await;
        }
    }

    /// Handle a newly admitted connection
    async fn register(&mut self, connection: Connection) {
        let client_id = connection.client_id();
        let user = User::new(client_id, self.options.default_avatar.clone());

        self.connections.store(client_id, connection.clone());
        self.users.store(client_id, user.clone());
        self.rooms
            .create(RoomId::from(client_id), user.username.clone(), RoomKind::Personal);

        info!("Client {} registered", client_id);
        debug!(
            "Total connections: {}, Total rooms: {}",
            self.connections.len(),
            self.rooms.len()
        );

        self.reply(&connection, Response::connected(user)).await;
    }

    /// Remove a client from every store and tell its room
    ///
    /// Safe to call for an id that is already gone: nothing is broadcast
    /// because there is no profile left to announce. Boxed because it is
    /// re-entered from `broadcast` when a peer turns out to be dead.
    fn unregister(&mut self, client_id: ClientId) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let user = self.users.load(&client_id);
            let room_id = user
                .as_ref()
                .and_then(|user| self.rooms.user_joined_to(&user.id))
                .map(|room| room.id);

            self.rooms.leave(room_id.as_ref(), &client_id);
            self.connections.delete(&client_id);
            self.users.delete(&client_id);

            let Some(user) = user else {
                debug!("Client {} already unregistered", client_id);
                return;
            };

            info!("Client {} unregistered", client_id);
            debug!(
                "Total connections: {}, Total rooms: {}",
                self.connections.len(),
                self.rooms.len()
            );

            if let Some(room_id) = room_id {
                self.broadcast(&room_id, client_id, Response::other_lost_connection(user))
                    .await;
            }
        })
    }

    async fn get_rooms(&mut self, conn: &Connection) -> Result<(), AppError> {
        let rooms = self.rooms.rooms(false);
        self.reply(conn, Response::topic_rooms(rooms)).await;
        Ok(())
    }

    async fn change_username(
        &mut self,
        conn: &Connection,
        username: String,
    ) -> Result<(), AppError> {
        let client_id = conn.client_id();
        let mut user = self
            .users
            .load(&client_id)
            .ok_or(AppError::UserNotFound(client_id))?;

        info!("Client {} changed username to '{}'", client_id, username);
        user.username = username;
        self.users.store(client_id, user.clone());

        if !self.reply(conn, Response::me_changed_username(user.clone())).await {
            return Ok(());
        }

        if let Some(room) = self.rooms.user_joined_to(&client_id) {
            if room.kind == RoomKind::Topic {
                self.broadcast(&room.id, client_id, Response::other_changed_username(user))
                    .await;
            }
        }
        Ok(())
    }

    async fn join_chat(&mut self, conn: &Connection, room_id: RoomId) -> Result<(), AppError> {
        let client_id = conn.client_id();
        let joined = self.rooms.join(&room_id, client_id)?;

        let user = self
            .users
            .load(&client_id)
            .ok_or(AppError::UserNotFound(client_id))?;
        let room = self
            .rooms
            .room(&room_id)
            .ok_or_else(|| AppError::RoomNotFound(room_id.clone()))?;

        info!("Client {} joined room {}", client_id, room_id);

        let messages = self.history_page(&room_id, None);
        let users = room
            .users
            .iter()
            .filter_map(|id| self.users.load(id))
            .collect();

        let delivered = self
            .reply(conn, Response::me_joined_chat(room, messages, users))
            .await;

        // A reaped requester was already announced as gone
        if delivered && joined == Joined::New {
            self.broadcast(&room_id, client_id, Response::other_joined_chat(user))
                .await;
        }
        Ok(())
    }

    async fn leave_chat(&mut self, conn: &Connection, room_id: RoomId) -> Result<(), AppError> {
        let client_id = conn.client_id();
        let left = self.rooms.leave(Some(&room_id), &client_id);

        let user = self
            .users
            .load(&client_id)
            .ok_or(AppError::UserNotFound(client_id))?;

        if left {
            info!("Client {} left room {}", client_id, room_id);
        }

        // Already out of the room, so a reap here would announce nothing
        self.reply(conn, Response::me_left_chat(room_id.clone())).await;

        if left {
            self.broadcast(&room_id, client_id, Response::other_left_chat(user))
                .await;
        }
        Ok(())
    }

    async fn send_message(
        &mut self,
        conn: &Connection,
        request_id: RequestId,
        room_id: RoomId,
        text: String,
    ) -> Result<(), AppError> {
        let client_id = conn.client_id();
        if !self.rooms.exists(&room_id) {
            return Err(AppError::RoomNotFound(room_id));
        }
        let user = self
            .users
            .load(&client_id)
            .ok_or(AppError::UserNotFound(client_id))?;

        self.enforce_retention(&room_id);

        let message = ChatMessage {
            id: MessageId::from(request_id),
            user_id: client_id,
            room_id: room_id.clone(),
            message: text,
            timestamp: self.clock.now_millis(),
        };
        self.messages.append(&room_id, message.clone());

        if !self
            .reply(conn, Response::me_message_send(MessageView::bare(message.clone())))
            .await
        {
            return Ok(());
        }

        let view = MessageView::with_author(message, Author::User(user));
        self.broadcast(&room_id, client_id, Response::other_message_send(view))
            .await;
        Ok(())
    }

    async fn old_messages(
        &mut self,
        conn: &Connection,
        room_id: RoomId,
        oldest_msg_id: MessageId,
    ) -> Result<(), AppError> {
        let room = self
            .rooms
            .room(&room_id)
            .ok_or_else(|| AppError::RoomNotFound(room_id.clone()))?;

        let messages = self.history_page(&room_id, Some(&oldest_msg_id));
        self.reply(conn, Response::old_messages(room, messages)).await;
        Ok(())
    }

    /// Drop the oldest messages until there is room for one more
    fn enforce_retention(&self, room_id: &RoomId) {
        while self.messages.count(room_id) >= self.options.max_saved_messages {
            if self.messages.evict_oldest(room_id).is_none() {
                break;
            }
        }
    }

    /// One page of history with author profiles resolved
    fn history_page(&self, room_id: &RoomId, cursor: Option<&MessageId>) -> Vec<MessageView> {
        self.messages
            .get_last_n(room_id, self.options.max_returned_messages, cursor)
            .into_iter()
            .map(|message| {
                let author = Author::from(self.users.load(&message.user_id));
                MessageView::with_author(message, author)
            })
            .collect()
    }

    /// Write to one connection, reaping it if the write fails
    ///
    /// Returns false when the connection was reaped.
    async fn reply(&mut self, conn: &Connection, response: Response) -> bool {
        if conn.send(response).await.is_err() {
            warn!("Write to {} failed, unregistering", conn.client_id());
            self.unregister(conn.client_id()).await;
            return false;
        }
        true
    }

    /// Fan a response out to every member of a room except `origin`
    ///
    /// A dead member is unregistered on the spot and delivery continues with
    /// the remaining members.
    async fn broadcast(&mut self, room_id: &RoomId, origin: ClientId, response: Response) {
        for member in self.rooms.users(room_id) {
            if member == origin {
                continue;
            }
            // Already reaped earlier in this pass
            let Some(peer) = self.connections.load(&member) else {
                continue;
            };
            if peer.send(response.clone()).await.is_err() {
                warn!("Broadcast to {} in room {} failed, unregistering", member, room_id);
                self.unregister(member).await;
            }
        }
    }
}
