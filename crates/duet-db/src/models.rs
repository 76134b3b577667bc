//! Row types as read from SQLite.
//! Kept apart from the wire models in duet-types.

use chrono::{DateTime, Utc};
use duet_types::MessageId;
use duet_types::models::{ChatId, UserId};

pub struct UserRow {
    pub id: UserId,
    pub login: String,
    pub password: String,
    pub salt: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}
