//! Channel-broadcast wire protocol.
//!
//! Frames follow the ActionCable layout: the client sends `CableCommand`s whose
//! `identifier` is a JSON document encoded as a string, and receives
//! `CableFrame`s that are either typed control frames (`welcome`, `ping`,
//! subscription acks, `disconnect`) or untyped broadcasts carrying a `message`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CodecError, DecodeError};

pub const ROOM_CHANNEL: &str = "RoomChannel";
pub const BROADCAST_ACTION: &str = "broadcast";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub sender: String,
    pub content: String,
}

impl ChannelMessage {
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("sender".into(), Value::String(self.sender.clone()));
        payload.insert("content".into(), Value::String(self.content.clone()));
        payload
    }
}

/// Builds the outgoing chat payload. Content is trimmed; nothing is produced
/// for blank content or a missing sender.
pub fn encode(sender: &str, content: &str) -> Result<ChannelMessage, CodecError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(CodecError::EmptyContent);
    }
    if sender.trim().is_empty() {
        return Err(CodecError::MissingSender);
    }
    Ok(ChannelMessage {
        sender: sender.to_string(),
        content: content.to_string(),
    })
}

pub fn decode(raw: &Value) -> Result<ChannelMessage, DecodeError> {
    let object = raw
        .as_object()
        .ok_or_else(|| DecodeError::malformed("payload is not a JSON object"))?;
    let sender = required_string(object, "sender")?;
    let content = required_string(object, "content")?;
    if sender.is_empty() {
        return Err(DecodeError::malformed("sender is empty"));
    }
    if content.trim().is_empty() {
        return Err(DecodeError::malformed("content is empty"));
    }
    Ok(ChannelMessage {
        sender: sender.to_string(),
        content: content.to_string(),
    })
}

pub fn decode_str(raw: &str) -> Result<ChannelMessage, DecodeError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| DecodeError::malformed(err.to_string()))?;
    decode(&value)
}

fn required_string<'a>(object: &'a Map<String, Value>, field: &str) -> Result<&'a str, DecodeError> {
    match object.get(field) {
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(DecodeError::malformed(format!("field `{field}` is not a string"))),
        None => Err(DecodeError::malformed(format!("missing field `{field}`"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelIdentifier {
    pub channel: String,
}

impl ChannelIdentifier {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(raw).map_err(|err| DecodeError::malformed(err.to_string()))
    }

    /// The identifier as it travels on the wire: a JSON document in a string.
    pub fn to_wire(&self) -> String {
        serde_json::json!({ "channel": self.channel }).to_string()
    }
}

/// Compares two wire identifiers structurally so key order and spacing do not matter.
pub fn identifiers_match(left: &str, right: &str) -> bool {
    if left == right {
        return true;
    }
    match (
        serde_json::from_str::<Value>(left),
        serde_json::from_str::<Value>(right),
    ) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Subscribe,
    Unsubscribe,
    Message,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CableCommand {
    pub command: CommandKind,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl CableCommand {
    pub fn subscribe(identifier: &ChannelIdentifier) -> Self {
        Self {
            command: CommandKind::Subscribe,
            identifier: identifier.to_wire(),
            data: None,
        }
    }

    pub fn unsubscribe(identifier: &ChannelIdentifier) -> Self {
        Self {
            command: CommandKind::Unsubscribe,
            identifier: identifier.to_wire(),
            data: None,
        }
    }

    /// An action invocation; the action name travels inside `data` next to the payload fields.
    pub fn action(identifier: &ChannelIdentifier, action: &str, mut payload: Map<String, Value>) -> Self {
        payload.insert("action".into(), Value::String(action.to_string()));
        Self {
            command: CommandKind::Message,
            identifier: identifier.to_wire(),
            data: Some(Value::Object(payload).to_string()),
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Splits `data` of a `message` command into the action name and the remaining payload.
    pub fn action_payload(&self) -> Result<(String, Map<String, Value>), DecodeError> {
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| DecodeError::malformed("message command without data"))?;
        let Value::Object(mut payload) =
            serde_json::from_str(data).map_err(|err| DecodeError::malformed(err.to_string()))?
        else {
            return Err(DecodeError::malformed("action data is not a JSON object"));
        };
        match payload.remove("action") {
            Some(Value::String(action)) => Ok((action, payload)),
            _ => Err(DecodeError::malformed("action data without an action name")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Welcome,
    Ping,
    ConfirmSubscription,
    RejectSubscription,
    Disconnect,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CableFrame {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FrameType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<bool>,
}

impl CableFrame {
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(raw).map_err(|err| DecodeError::malformed(err.to_string()))
    }

    pub fn welcome() -> Self {
        Self {
            kind: Some(FrameType::Welcome),
            ..Self::default()
        }
    }

    pub fn ping(timestamp: i64) -> Self {
        Self {
            kind: Some(FrameType::Ping),
            message: Some(Value::from(timestamp)),
            ..Self::default()
        }
    }

    pub fn confirm_subscription(identifier: impl Into<String>) -> Self {
        Self {
            kind: Some(FrameType::ConfirmSubscription),
            identifier: Some(identifier.into()),
            ..Self::default()
        }
    }

    pub fn reject_subscription(identifier: impl Into<String>) -> Self {
        Self {
            kind: Some(FrameType::RejectSubscription),
            identifier: Some(identifier.into()),
            ..Self::default()
        }
    }

    pub fn disconnect(reason: impl Into<String>, reconnect: bool) -> Self {
        Self {
            kind: Some(FrameType::Disconnect),
            reason: Some(reason.into()),
            reconnect: Some(reconnect),
            ..Self::default()
        }
    }

    pub fn broadcast(identifier: impl Into<String>, message: Value) -> Self {
        Self {
            identifier: Some(identifier.into()),
            message: Some(message),
            ..Self::default()
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
