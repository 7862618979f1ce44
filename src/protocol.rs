//! Wire protocol definitions
//!
//! Inbound frames are `{ "type", "body" }` records. The type selects one of a
//! closed set of payload shapes and the body is validated against that shape
//! here, so the hub only ever sees well-formed requests. Outbound frames are
//! `{ "type", "body", "error" }` envelopes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::AppError;
use crate::history::MessageView;
use crate::room::Room;
use crate::types::{ClientId, MessageId, RequestId, RoomId};
use crate::user::User;

/// Request type
///
/// Accepted on the wire either by name or by its index in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    GetRooms,
    ChangeUsername,
    JoinChat,
    LeftChat,
    SendMessage,
    GetOldMessages,
}

impl Opcode {
    const ALL: [Opcode; 6] = [
        Opcode::GetRooms,
        Opcode::ChangeUsername,
        Opcode::JoinChat,
        Opcode::LeftChat,
        Opcode::SendMessage,
        Opcode::GetOldMessages,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Opcode::GetRooms => "GET_ROOMS",
            Opcode::ChangeUsername => "CHANGE_USERNAME",
            Opcode::JoinChat => "JOIN_CHAT",
            Opcode::LeftChat => "LEFT_CHAT",
            Opcode::SendMessage => "SEND_MESSAGE",
            Opcode::GetOldMessages => "GET_OLD_MESSAGES",
        }
    }

    fn from_wire(value: &Value) -> Result<Self, AppError> {
        match value {
            Value::String(name) => Self::ALL
                .into_iter()
                .find(|opcode| opcode.name() == name)
                .ok_or_else(|| AppError::UnknownOpcode(name.clone())),
            Value::Number(number) => number
                .as_u64()
                .and_then(|index| usize::try_from(index).ok())
                .and_then(|index| Self::ALL.get(index).copied())
                .ok_or_else(|| AppError::UnknownOpcode(number.to_string())),
            other => Err(AppError::MalformedFrame(format!(
                "request type must be a name or an index, got {}",
                other
            ))),
        }
    }
}

/// Raw frame; `id` and `clientId` sent by clients are ignored
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Value,
    #[serde(default)]
    body: Value,
}

#[derive(Debug, Deserialize)]
struct UsernameBody {
    username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomBody {
    room_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageBody {
    room_id: String,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OldMessagesBody {
    room_id: String,
    oldest_msg_id: String,
}

/// Validated request payload, one variant per request type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPayload {
    GetRooms,
    ChangeUsername { username: String },
    JoinChat { room_id: RoomId },
    LeaveChat { room_id: RoomId },
    SendMessage { room_id: RoomId, message: String },
    OldMessages { room_id: RoomId, oldest_msg_id: MessageId },
}

impl RequestPayload {
    /// Decode one inbound frame
    pub fn decode(frame: &[u8]) -> Result<Self, AppError> {
        let envelope: Envelope = serde_json::from_slice(frame)
            .map_err(|e| AppError::MalformedFrame(e.to_string()))?;
        let opcode = Opcode::from_wire(&envelope.kind)?;
        let body = envelope.body;

        let payload = match opcode {
            Opcode::GetRooms => RequestPayload::GetRooms,
            Opcode::ChangeUsername => {
                let UsernameBody { username } = parse_body(opcode, body)?;
                RequestPayload::ChangeUsername {
                    username: non_empty("username", username)?,
                }
            }
            Opcode::JoinChat => {
                let RoomBody { room_id } = parse_body(opcode, body)?;
                RequestPayload::JoinChat {
                    room_id: RoomId(non_empty("roomId", room_id)?),
                }
            }
            Opcode::LeftChat => {
                let RoomBody { room_id } = parse_body(opcode, body)?;
                RequestPayload::LeaveChat {
                    room_id: RoomId(non_empty("roomId", room_id)?),
                }
            }
            Opcode::SendMessage => {
                let SendMessageBody { room_id, message } = parse_body(opcode, body)?;
                RequestPayload::SendMessage {
                    room_id: RoomId(non_empty("roomId", room_id)?),
                    message: non_empty("message", message)?,
                }
            }
            Opcode::GetOldMessages => {
                let OldMessagesBody {
                    room_id,
                    oldest_msg_id,
                } = parse_body(opcode, body)?;
                RequestPayload::OldMessages {
                    room_id: RoomId(non_empty("roomId", room_id)?),
                    oldest_msg_id: MessageId(non_empty("oldestMsgId", oldest_msg_id)?),
                }
            }
        };
        Ok(payload)
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            RequestPayload::GetRooms => Opcode::GetRooms,
            RequestPayload::ChangeUsername { .. } => Opcode::ChangeUsername,
            RequestPayload::JoinChat { .. } => Opcode::JoinChat,
            RequestPayload::LeaveChat { .. } => Opcode::LeftChat,
            RequestPayload::SendMessage { .. } => Opcode::SendMessage,
            RequestPayload::OldMessages { .. } => Opcode::GetOldMessages,
        }
    }
}

fn parse_body<T: DeserializeOwned>(opcode: Opcode, body: Value) -> Result<T, AppError> {
    serde_json::from_value(body).map_err(|source| AppError::InvalidBody {
        opcode: opcode.name(),
        source,
    })
}

fn non_empty(field: &'static str, value: String) -> Result<String, AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidField {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(value)
}

/// Decoded request stamped by the connection reader
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub client_id: ClientId,
    pub payload: RequestPayload,
}

impl Request {
    /// Stamp a payload with a fresh request id and its connection's client id
    pub fn new(client_id: ClientId, payload: RequestPayload) -> Self {
        Self {
            id: RequestId::new(),
            client_id,
            payload,
        }
    }
}

/// Response type
///
/// Sent on the wire as its index in declaration order, which is what
/// clients switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseType {
    Error = 0,
    Connected,
    TopicRooms,
    MeChangedUsername,
    OtherChangedUsername,
    MeJoinedChat,
    OtherJoinedChat,
    MeLeftChat,
    OtherLeftChat,
    MeMessageSend,
    OtherMessageSend,
    OldMessages,
}

impl ResponseType {
    pub fn index(self) -> u8 {
        self as u8
    }
}

impl Serialize for ResponseType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.index())
    }
}

/// Error codes carried in error envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    InternalServerError,
}

/// `data` of a success body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    User(User),
    Rooms(Vec<Room>),
    RoomId(RoomId),
    Message(MessageView),
    JoinedChat {
        room: Room,
        messages: Vec<MessageView>,
        users: Vec<User>,
    },
    OldMessages {
        room: Room,
        messages: Vec<MessageView>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Payload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// Server → client envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub body: Option<ResponseBody>,
    pub error: Option<ErrorBody>,
    #[serde(rename = "type")]
    pub kind: ResponseType,
}

impl Response {
    fn ok(kind: ResponseType, message: Option<&'static str>, data: Option<Payload>) -> Self {
        Self {
            body: Some(ResponseBody { message, data }),
            error: None,
            kind,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            body: None,
            error: Some(ErrorBody {
                code,
                message: message.into(),
            }),
            kind: ResponseType::Error,
        }
    }

    pub fn connected(user: User) -> Self {
        Self::ok(
            ResponseType::Connected,
            Some("connection successful"),
            Some(Payload::User(user)),
        )
    }

    pub fn topic_rooms(rooms: Vec<Room>) -> Self {
        Self::ok(ResponseType::TopicRooms, None, Some(Payload::Rooms(rooms)))
    }

    pub fn me_changed_username(user: User) -> Self {
        Self::ok(
            ResponseType::MeChangedUsername,
            Some("your username is changed"),
            Some(Payload::User(user)),
        )
    }

    pub fn other_changed_username(user: User) -> Self {
        Self::ok(
            ResponseType::OtherChangedUsername,
            Some("a user changed its username"),
            Some(Payload::User(user)),
        )
    }

    pub fn me_joined_chat(room: Room, messages: Vec<MessageView>, users: Vec<User>) -> Self {
        Self::ok(
            ResponseType::MeJoinedChat,
            Some("you joined chat"),
            Some(Payload::JoinedChat {
                room,
                messages,
                users,
            }),
        )
    }

    pub fn other_joined_chat(user: User) -> Self {
        Self::ok(
            ResponseType::OtherJoinedChat,
            Some("a user joined chat"),
            Some(Payload::User(user)),
        )
    }

    pub fn me_left_chat(room_id: RoomId) -> Self {
        Self::ok(
            ResponseType::MeLeftChat,
            Some("you left the chat"),
            Some(Payload::RoomId(room_id)),
        )
    }

    pub fn other_left_chat(user: User) -> Self {
        Self::ok(
            ResponseType::OtherLeftChat,
            Some("a user left chat"),
            Some(Payload::User(user)),
        )
    }

    /// Sent to a room when a member's connection went away
    pub fn other_lost_connection(user: User) -> Self {
        Self::ok(
            ResponseType::OtherLeftChat,
            Some("a user lost connection"),
            Some(Payload::User(user)),
        )
    }

    pub fn me_message_send(message: MessageView) -> Self {
        Self::ok(
            ResponseType::MeMessageSend,
            None,
            Some(Payload::Message(message)),
        )
    }

    pub fn other_message_send(message: MessageView) -> Self {
        Self::ok(
            ResponseType::OtherMessageSend,
            None,
            Some(Payload::Message(message)),
        )
    }

    pub fn old_messages(room: Room, messages: Vec<MessageView>) -> Self {
        Self::ok(
            ResponseType::OldMessages,
            None,
            Some(Payload::OldMessages { room, messages }),
        )
    }

    /// Error code if this is an error envelope
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// Convert AppError to an error envelope for the requester
impl From<AppError> for Response {
    fn from(err: AppError) -> Self {
        let code = match &err {
            AppError::MalformedFrame(_)
            | AppError::UnknownOpcode(_)
            | AppError::InvalidBody { .. }
            | AppError::InvalidField { .. }
            | AppError::JoinUnknownRoom(_)
            | AppError::AlreadyInRoom(_) => ErrorCode::BadRequest,
            AppError::RoomNotFound(_) | AppError::UserNotFound(_) => ErrorCode::NotFound,
            // Transport failures are not described to clients
            _ => return Response::error(ErrorCode::InternalServerError, "Internal error"),
        };
        Response::error(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::RoomKind;

    fn decode(json: &str) -> Result<RequestPayload, AppError> {
        RequestPayload::decode(json.as_bytes())
    }

    #[test]
    fn test_decode_by_name() {
        let payload =
            decode(r#"{"id":"x","clientId":"y","type":"JOIN_CHAT","body":{"roomId":"r1"}}"#)
                .unwrap();
        assert_eq!(
            payload,
            RequestPayload::JoinChat {
                room_id: RoomId::from("r1")
            }
        );
    }

    #[test]
    fn test_decode_by_index() {
        let payload =
            decode(r#"{"type":4,"body":{"roomId":"r1","message":"hi"}}"#).unwrap();
        assert_eq!(
            payload,
            RequestPayload::SendMessage {
                room_id: RoomId::from("r1"),
                message: "hi".to_string()
            }
        );
        assert_eq!(payload.opcode(), Opcode::SendMessage);
    }

    #[test]
    fn test_get_rooms_needs_no_body() {
        assert_eq!(decode(r#"{"type":"GET_ROOMS"}"#).unwrap(), RequestPayload::GetRooms);
        assert_eq!(
            decode(r#"{"type":"GET_ROOMS","body":{}}"#).unwrap(),
            RequestPayload::GetRooms
        );
    }

    #[test]
    fn test_old_messages_fields() {
        let payload = decode(
            r#"{"type":"GET_OLD_MESSAGES","body":{"roomId":"r1","oldestMsgId":"m9"}}"#,
        )
        .unwrap();
        assert_eq!(
            payload,
            RequestPayload::OldMessages {
                room_id: RoomId::from("r1"),
                oldest_msg_id: MessageId("m9".to_string())
            }
        );
    }

    #[test]
    fn test_malformed_frame() {
        assert!(matches!(decode("not json"), Err(AppError::MalformedFrame(_))));
        assert!(matches!(decode(r#"{"body":{}}"#), Err(AppError::MalformedFrame(_))));
        assert!(matches!(
            decode(r#"{"type":true}"#),
            Err(AppError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_unknown_opcode() {
        assert!(matches!(
            decode(r#"{"type":"DANCE"}"#),
            Err(AppError::UnknownOpcode(_))
        ));
        assert!(matches!(decode(r#"{"type":6}"#), Err(AppError::UnknownOpcode(_))));
        assert!(matches!(decode(r#"{"type":-1}"#), Err(AppError::UnknownOpcode(_))));
    }

    #[test]
    fn test_missing_or_mistyped_field() {
        assert!(matches!(
            decode(r#"{"type":"CHANGE_USERNAME","body":{}}"#),
            Err(AppError::InvalidBody { .. })
        ));
        assert!(matches!(
            decode(r#"{"type":"CHANGE_USERNAME","body":{"username":42}}"#),
            Err(AppError::InvalidBody { .. })
        ));
        assert!(matches!(
            decode(r#"{"type":"SEND_MESSAGE","body":{"roomId":"r1"}}"#),
            Err(AppError::InvalidBody { .. })
        ));
        assert!(matches!(
            decode(r#"{"type":"LEFT_CHAT"}"#),
            Err(AppError::InvalidBody { .. })
        ));
    }

    #[test]
    fn test_empty_field_rejected() {
        assert!(matches!(
            decode(r#"{"type":"CHANGE_USERNAME","body":{"username":"  "}}"#),
            Err(AppError::InvalidField { field: "username", .. })
        ));
        assert!(matches!(
            decode(r#"{"type":"JOIN_CHAT","body":{"roomId":""}}"#),
            Err(AppError::InvalidField { field: "roomId", .. })
        ));
    }

    #[test]
    fn test_error_mapping() {
        let response: Response = AppError::UnknownOpcode("X".into()).into();
        assert_eq!(response.error_code(), Some(ErrorCode::BadRequest));

        let response: Response = AppError::RoomNotFound(RoomId::from("r")).into();
        assert_eq!(response.error_code(), Some(ErrorCode::NotFound));

        let response: Response = AppError::ChannelSend.into();
        assert_eq!(response.error_code(), Some(ErrorCode::InternalServerError));
        assert_eq!(response.error.unwrap().message, "Internal error");
    }

    #[test]
    fn test_error_envelope_shape() {
        let json = serde_json::to_value(Response::error(ErrorCode::NotFound, "gone")).unwrap();
        assert_eq!(json["type"], 0);
        assert!(json["body"].is_null());
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert_eq!(json["error"]["message"], "gone");
    }

    #[test]
    fn test_joined_chat_envelope_shape() {
        let id = ClientId::new();
        let user = User::new(id, "a.png");
        let mut room = Room::new(RoomId::from("r1"), "General", RoomKind::Topic);
        room.users.push(id);

        let json =
            serde_json::to_value(Response::me_joined_chat(room, Vec::new(), vec![user])).unwrap();

        assert_eq!(json["type"], 5);
        assert!(json["error"].is_null());
        assert_eq!(json["body"]["message"], "you joined chat");
        assert_eq!(json["body"]["data"]["room"]["kind"], "TOPIC");
        assert_eq!(json["body"]["data"]["room"]["users"][0], id.to_string());
        assert_eq!(json["body"]["data"]["users"][0]["avatar"], "a.png");
        assert_eq!(json["body"]["data"]["messages"], serde_json::json!([]));
    }

    #[test]
    fn test_response_type_sent_as_index() {
        let expected = [
            (ResponseType::Error, 0),
            (ResponseType::Connected, 1),
            (ResponseType::TopicRooms, 2),
            (ResponseType::MeChangedUsername, 3),
            (ResponseType::OtherChangedUsername, 4),
            (ResponseType::MeJoinedChat, 5),
            (ResponseType::OtherJoinedChat, 6),
            (ResponseType::MeLeftChat, 7),
            (ResponseType::OtherLeftChat, 8),
            (ResponseType::MeMessageSend, 9),
            (ResponseType::OtherMessageSend, 10),
            (ResponseType::OldMessages, 11),
        ];
        for (kind, index) in expected {
            assert_eq!(serde_json::to_string(&kind).unwrap(), index.to_string());
        }

        let json = serde_json::to_string(&Response::me_left_chat(RoomId::from("r1"))).unwrap();
        assert!(json.ends_with(r#""type":7}"#), "{}", json);
    }
}
