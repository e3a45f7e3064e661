//! Push message types for the live-updates channel
//!
//! Every inbound frame is a UTF-8 JSON object carrying at least a `type`
//! string. The tag selects a [`MessageKind`]; every other field is payload
//! that is handed to subscribers untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Message kinds known to the front end, plus a residual for forward compatibility
///
/// # Examples
/// ```
/// use livewire::protocol::MessageKind;
///
/// assert_eq!(MessageKind::from("price"), MessageKind::Price);
/// assert_eq!(MessageKind::from("halt").as_str(), "halt");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    /// Quote/price tick for a symbol
    Price,
    /// Traded volume update for a symbol
    Volume,
    /// Headline pushed for the news table
    News,
    /// Any tag this build does not know about
    Unknown(String),
}

impl MessageKind {
    /// Wire tag for this kind
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Price => "price",
            MessageKind::Volume => "volume",
            MessageKind::News => "news",
            MessageKind::Unknown(tag) => tag.as_str(),
        }
    }

    /// True for tags outside the known set
    pub fn is_unknown(&self) -> bool {
        matches!(self, MessageKind::Unknown(_))
    }
}

impl From<&str> for MessageKind {
    fn from(tag: &str) -> Self {
        match tag {
            "price" => MessageKind::Price,
            "volume" => MessageKind::Volume,
            "news" => MessageKind::News,
            other => MessageKind::Unknown(other.to_string()),
        }
    }
}

impl From<String> for MessageKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "price" | "volume" | "news" => MessageKind::from(tag.as_str()),
            _ => MessageKind::Unknown(tag),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to turn a raw frame into a [`PushMessage`]
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload has no non-empty string `type` field")]
    MissingType,
}

/// A decoded push message
///
/// `fields` holds everything except `type`.
///
/// # Examples
/// ```
/// use livewire::protocol::{MessageKind, PushMessage};
///
/// let msg = PushMessage::decode(r#"{"type":"price","symbol":"ABC","last":12.5}"#).unwrap();
/// assert_eq!(msg.kind, MessageKind::Price);
/// assert_eq!(msg.field("symbol").and_then(|v| v.as_str()), Some("ABC"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "Value")]
pub struct PushMessage {
    pub kind: MessageKind,
    pub fields: Map<String, Value>,
}

impl PushMessage {
    pub fn new(kind: impl Into<MessageKind>, fields: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            fields,
        }
    }

    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text).map_err(DecodeError::InvalidJson)?;
        let Value::Object(mut fields) = value else {
            return Err(DecodeError::NotAnObject);
        };

        match fields.remove("type") {
            Some(Value::String(tag)) if !tag.is_empty() => Ok(Self {
                kind: MessageKind::from(tag),
                fields,
            }),
            _ => Err(DecodeError::MissingType),
        }
    }

    /// Wire tag of this message
    pub fn message_type(&self) -> &str {
        self.kind.as_str()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Rebuild the wire envelope, `type` included
    pub fn to_json(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert("type".to_string(), Value::String(self.kind.to_string()));
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

impl From<PushMessage> for Value {
    fn from(message: PushMessage) -> Self {
        message.to_json()
    }
}
