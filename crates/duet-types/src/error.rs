use serde::{Deserialize, Serialize};

/// Stable failure codes, carried as `code` next to `status: "fail"`.
///
/// The human-readable `message` stays for older clients; new clients should
/// branch on the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    #[error("invalid login or password")]
    InvalidCredentials,

    #[error("login is already taken")]
    LoginTaken,

    #[error("request is missing a required value")]
    InvalidInput,

    #[error("no such user")]
    UnknownUser,

    #[error("recipient is not connected")]
    RecipientOffline,

    #[error("storage failure")]
    StorageFailure,
}
