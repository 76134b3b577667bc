use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::models::{ChatHistory, MessageId, Presence, Status, UserPresence};

/// Requests sent FROM client TO server. One flat JSON object per frame,
/// discriminated by `type`. A frame missing a field its type requires fails
/// to decode and is dropped by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Authenticate an existing user
    Login { login: String, password: String },

    /// Create a user and authenticate as it
    Registration { login: String, password: String },

    /// Direct message to another login
    Chat {
        from: String,
        to: String,
        message: String,
    },

    /// Prefix search over logins
    SearchUsers {
        from: String,
        #[serde(rename = "message")]
        prefix: String,
    },

    /// Ask whether a login currently holds a session
    GetOnlineStatus {
        from: String,
        #[serde(rename = "message")]
        target: String,
    },

    /// Mark everything `to` sent to `from` as read
    MarkAsRead { from: String, to: String },

    /// Mark a single received message as read
    Ack { msg_id: MessageId },
}

impl ClientFrame {
    /// The `type` discriminator, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Registration { .. } => "registration",
            Self::Chat { .. } => "chat",
            Self::SearchUsers { .. } => "search_users",
            Self::GetOnlineStatus { .. } => "get_online_status",
            Self::MarkAsRead { .. } => "mark_as_read",
            Self::Ack { .. } => "ack",
        }
    }

    /// The claimed sender, for frames that carry one.
    pub fn sender(&self) -> Option<&str> {
        match self {
            Self::Chat { from, .. }
            | Self::SearchUsers { from, .. }
            | Self::GetOnlineStatus { from, .. }
            | Self::MarkAsRead { from, .. } => Some(from),
            Self::Login { .. } | Self::Registration { .. } | Self::Ack { .. } => None,
        }
    }
}

/// Frames sent FROM server TO client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Login {
        to: String,
        status: Status,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<ErrorCode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        history_messages: Option<Vec<ChatHistory>>,
    },

    Registration {
        to: String,
        status: Status,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<ErrorCode>,
    },

    /// Sender echo and live relay share this shape.
    Chat {
        from: String,
        to: String,
        message: String,
        status: Status,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg_id: Option<MessageId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<ErrorCode>,
    },

    SearchUsers {
        to: String,
        clients: Vec<UserPresence>,
    },

    GetOnlineStatus {
        to: String,
        online: Presence,
        message: String,
    },

    /// A login came online or went offline
    UpdateClients { login: String, online: Presence },
}

impl ServerFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Registration { .. } => "registration",
            Self::Chat { .. } => "chat",
            Self::SearchUsers { .. } => "search_users",
            Self::GetOnlineStatus { .. } => "get_online_status",
            Self::UpdateClients { .. } => "update_clients",
        }
    }
}
