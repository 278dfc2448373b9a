use crate::{RequestId, RoomId, UserId};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Envelope type tag. Encoded on the wire as its position in this list,
/// which browser clients already depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Ping = 0,
    Pong = 1,
    Error = 2,
    RequestJoinRoom = 3,
    AllowJoinRoom = 4,
    DenyJoinRoom = 5,
    RoomReady = 6,
    RoomEnd = 7,
    Sdp = 8,
    Ice = 9,
}

impl MessageType {
    const ALL: [MessageType; 10] = [
        MessageType::Ping,
        MessageType::Pong,
        MessageType::Error,
        MessageType::RequestJoinRoom,
        MessageType::AllowJoinRoom,
        MessageType::DenyJoinRoom,
        MessageType::RoomReady,
        MessageType::RoomEnd,
        MessageType::Sdp,
        MessageType::Ice,
    ];

    /// Numeric wire code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a type by its wire code
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| D::Error::custom(format!("unknown message type {code}")))
    }
}

/// Sent to a room host when someone asks to join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequestPayload {
    pub request_id: RequestId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub username: String,
}

/// Outcome of a join request, sent to the requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomResultPayload {
    pub request_id: RequestId,
    pub room_id: RoomId,
    pub approved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    pub room_id: RoomId,
}

/// A message pushed to (or received from) a connected user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Ping,
    Pong,
    Error(String),
    RequestJoinRoom(JoinRoomRequestPayload),
    AllowJoinRoom(JoinRoomResultPayload),
    DenyJoinRoom(JoinRoomResultPayload),
    RoomReady(RoomPayload),
    RoomEnd(RoomPayload),
    /// Opaque session description, relayed untouched
    Sdp(String),
    /// Opaque ICE candidate, relayed untouched
    Ice(String),
}

impl Message {
    pub fn error(message: impl Into<String>) -> Self {
        Message::Error(message.into())
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Ping => MessageType::Ping,
            Message::Pong => MessageType::Pong,
            Message::Error(_) => MessageType::Error,
            Message::RequestJoinRoom(_) => MessageType::RequestJoinRoom,
            Message::AllowJoinRoom(_) => MessageType::AllowJoinRoom,
            Message::DenyJoinRoom(_) => MessageType::DenyJoinRoom,
            Message::RoomReady(_) => MessageType::RoomReady,
            Message::RoomEnd(_) => MessageType::RoomEnd,
            Message::Sdp(_) => MessageType::Sdp,
            Message::Ice(_) => MessageType::Ice,
        }
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, P> {
    #[serde(rename = "type")]
    kind: MessageType,
    payload: &'a P,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: MessageType,
    #[serde(default)]
    payload: serde_json::Value,
}

const EMPTY_PAYLOAD: &str = "";

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let kind = self.message_type();
        match self {
            Message::Ping | Message::Pong => EnvelopeRef {
                kind,
                payload: &EMPTY_PAYLOAD,
            }
            .serialize(serializer),
            Message::Error(text) | Message::Sdp(text) | Message::Ice(text) => {
                EnvelopeRef { kind, payload: text }.serialize(serializer)
            }
            Message::RequestJoinRoom(payload) => EnvelopeRef { kind, payload }.serialize(serializer),
            Message::AllowJoinRoom(payload) | Message::DenyJoinRoom(payload) => {
                EnvelopeRef { kind, payload }.serialize(serializer)
            }
            Message::RoomReady(payload) | Message::RoomEnd(payload) => {
                EnvelopeRef { kind, payload }.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let RawEnvelope { kind, payload } = RawEnvelope::deserialize(deserializer)?;
        let message = match kind {
            // keepalive payloads carry nothing meaningful
            MessageType::Ping => Ok(Message::Ping),
            MessageType::Pong => Ok(Message::Pong),
            MessageType::Error => serde_json::from_value(payload).map(Message::Error),
            MessageType::RequestJoinRoom => {
                serde_json::from_value(payload).map(Message::RequestJoinRoom)
            }
            MessageType::AllowJoinRoom => {
                serde_json::from_value(payload).map(Message::AllowJoinRoom)
            }
            MessageType::DenyJoinRoom => serde_json::from_value(payload).map(Message::DenyJoinRoom),
            MessageType::RoomReady => serde_json::from_value(payload).map(Message::RoomReady),
            MessageType::RoomEnd => serde_json::from_value(payload).map(Message::RoomEnd),
            MessageType::Sdp => serde_json::from_value(payload).map(Message::Sdp),
            MessageType::Ice => serde_json::from_value(payload).map(Message::Ice),
        };
        message.map_err(D::Error::custom)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl FromStr for Message {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_value(message: &Message) -> serde_json::Value {
        serde_json::to_value(message).unwrap()
    }

    #[test]
    fn type_codes_follow_wire_order() {
        assert_eq!(MessageType::Ping.code(), 0);
        assert_eq!(MessageType::RoomReady.code(), 6);
        assert_eq!(MessageType::Ice.code(), 9);
        assert_eq!(MessageType::from_code(7), Some(MessageType::RoomEnd));
        assert_eq!(MessageType::from_code(10), None);
    }

    #[test]
    fn keepalive_carries_empty_string_payload() {
        assert_eq!(to_value(&Message::Pong), json!({"type": 1, "payload": ""}));
    }

    #[test]
    fn join_request_uses_camel_case_fields() {
        let message = Message::RequestJoinRoom(JoinRoomRequestPayload {
            request_id: "q".into(),
            room_id: "r".into(),
            user_id: "g1".into(),
            username: "Guest".into(),
        });
        assert_eq!(
            to_value(&message),
            json!({
                "type": 3,
                "payload": {"requestId": "q", "roomId": "r", "userId": "g1", "username": "Guest"}
            })
        );
    }

    #[test]
    fn deny_reports_approved_false() {
        let message = Message::DenyJoinRoom(JoinRoomResultPayload {
            request_id: "q".into(),
            room_id: "r".into(),
            approved: false,
        });
        assert_eq!(
            to_value(&message),
            json!({"type": 5, "payload": {"requestId": "q", "roomId": "r", "approved": false}})
        );
    }

    #[test]
    fn sdp_payload_is_passed_through_as_is() {
        let blob = r#"{"type":"offer","sdp":"v=0\r\n"}"#;
        let message = Message::Sdp(blob.to_string());
        let text = message.to_string();
        assert_eq!(Message::from_str(&text).unwrap(), Message::Sdp(blob.to_string()));
        assert_eq!(to_value(&message)["payload"], json!(blob));
    }

    #[test]
    fn ping_parses_with_or_without_payload() {
        assert_eq!(Message::from_str(r#"{"type":0}"#).unwrap(), Message::Ping);
        assert_eq!(
            Message::from_str(r#"{"type":0,"payload":""}"#).unwrap(),
            Message::Ping
        );
    }

    #[test]
    fn rejects_unknown_type_and_garbage() {
        assert!(Message::from_str(r#"{"type":42,"payload":""}"#).is_err());
        assert!(Message::from_str("not json").is_err());
        assert!(Message::from_str(r#"{"payload":""}"#).is_err());
    }

    #[test]
    fn rejects_payload_of_wrong_shape() {
        assert!(Message::from_str(r#"{"type":6,"payload":"room"}"#).is_err());
        assert!(Message::from_str(r#"{"type":2}"#).is_err());
    }
}
