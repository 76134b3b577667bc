use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type UserId = i64;
pub type ChatId = i64;

/// Row id of a stored message.
///
/// Sent as a decimal string (`"msg_id": "42"`) because existing clients read
/// the field as text; numbers are accepted on input as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MessageIdVisitor;

        impl Visitor<'_> for MessageIdVisitor {
            type Value = MessageId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a message id as integer or decimal string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<MessageId, E> {
                Ok(MessageId(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<MessageId, E> {
                i64::try_from(v)
                    .map(MessageId)
                    .map_err(|_| E::custom("message id out of range"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<MessageId, E> {
                v.trim()
                    .parse::<i64>()
                    .map(MessageId)
                    .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(MessageIdVisitor)
    }
}

/// Live presence of a login. Encoded as `"TRUE"` / `"FALSE"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Presence {
    #[serde(rename = "TRUE")]
    Online,
    #[serde(rename = "FALSE")]
    Offline,
}

impl From<bool> for Presence {
    fn from(online: bool) -> Self {
        if online { Self::Online } else { Self::Offline }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Fail,
}

/// One message inside a login's chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    #[serde(rename = "msg_id")]
    pub id: MessageId,
    pub sender: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

/// A chat as seen by one of its two participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatHistory {
    #[serde(rename = "otherUser")]
    pub other_user: String,
    pub messages: Vec<HistoryMessage>,
    pub online: Presence,
}

/// Search hit: a login and whether it currently holds a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPresence {
    pub login: String,
    pub online: Presence,
}
