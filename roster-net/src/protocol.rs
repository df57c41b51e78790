//! Wire protocol types for the broker ↔ instance session.
//!
//! One JSON object per WebSocket text frame:
//!
//! ```text
//! { "Type": <int>, "Reply": <bool>, "Success": <bool>, "Data": { <string>: <string> } }
//! ```
//!
//! The same envelope is used for requests, replies, and broadcast events.
//! There is no request id: correlation is positional, one outstanding
//! request per connection (see `Emitter`).

use std::collections::HashMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Closed set of message types. The integer codes are the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Login = 0,
    Auth = 1,
    Logoff = 2,
    Deauth = 3,
    Identify = 4,
    NewAuthToken = 5,
    DeleteAuthToken = 6,
    EventNewGroup = 7,
    EventNewUser = 8,
    EventNewEndpoint = 9,
    EventRemoveEndpoint = 10,
    EventRemoveGroup = 11,
    EventRemoveUser = 12,
    EventEndpointOnline = 13,
    EventEndpointOffline = 14,
    EventGroupGroupJoin = 15,
    EventGroupGroupLeave = 16,
    EventGroupEndpointJoin = 17,
    EventGroupEndpointLeave = 18,
}

impl MessageType {
    /// True for the server-initiated replication events (types 7..=18).
    pub fn is_event(self) -> bool {
        self as u8 >= MessageType::EventNewGroup as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, u8> {
        use MessageType::*;
        Ok(match code {
            0 => Login,
            1 => Auth,
            2 => Logoff,
            3 => Deauth,
            4 => Identify,
            5 => NewAuthToken,
            6 => DeleteAuthToken,
            7 => EventNewGroup,
            8 => EventNewUser,
            9 => EventNewEndpoint,
            10 => EventRemoveEndpoint,
            11 => EventRemoveGroup,
            12 => EventRemoveUser,
            13 => EventEndpointOnline,
            14 => EventEndpointOffline,
            15 => EventGroupGroupJoin,
            16 => EventGroupGroupLeave,
            17 => EventGroupEndpointJoin,
            18 => EventGroupEndpointLeave,
            other => return Err(other),
        })
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        MessageType::try_from(code)
            .map_err(|c| D::Error::custom(format!("unknown message type {}", c)))
    }
}

/// The protocol envelope. `reply` is false on an outbound request, true on
/// the matching response and on server-initiated events. `success` is only
/// meaningful when `reply` is true. Missing data keys read as "".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "Type")]
    pub kind: MessageType,
    #[serde(rename = "Reply", default)]
    pub reply: bool,
    #[serde(rename = "Success", default)]
    pub success: bool,
    #[serde(rename = "Data", default)]
    pub data: HashMap<String, String>,
}

impl Message {
    /// A fresh request message with an empty data map.
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            reply: false,
            success: false,
            data: HashMap::new(),
        }
    }

    /// A broadcast event. Events travel with `reply` set: they are not
    /// requests and nothing awaits them.
    pub fn event(kind: MessageType) -> Self {
        Self {
            kind,
            reply: true,
            success: false,
            data: HashMap::new(),
        }
    }

    /// Read a data field; a missing key is the empty string.
    pub fn get(&self, key: &str) -> &str {
        self.data.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.data.insert(key.to_string(), value.to_string());
    }

    /// Builder-style `set`, for assembling requests and events.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_pascal_case_field_names() {
        let msg = Message::new(MessageType::Identify).with("hostname", "box1");
        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&msg).unwrap())
            .unwrap();
        assert_eq!(json["Type"], 4);
        assert_eq!(json["Reply"], false);
        assert_eq!(json["Success"], false);
        assert_eq!(json["Data"]["hostname"], "box1");
    }

    #[test]
    fn missing_fields_default() {
        let msg: Message = serde_json::from_str(r#"{"Type":2}"#).unwrap();
        assert_eq!(msg.kind, MessageType::Logoff);
        assert!(!msg.reply);
        assert!(!msg.success);
        assert_eq!(msg.get("anything"), "");
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<Message>(r#"{"Type":99}"#).is_err());
    }

    #[test]
    fn event_codes_match_wire_contract() {
        assert_eq!(MessageType::Login as u8, 0);
        assert_eq!(MessageType::EventNewGroup as u8, 7);
        assert_eq!(MessageType::EventGroupEndpointLeave as u8, 18);
        assert!(MessageType::EventNewUser.is_event());
        assert!(!MessageType::DeleteAuthToken.is_event());
    }
}
