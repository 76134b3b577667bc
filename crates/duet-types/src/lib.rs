//! Wire and domain types shared by the duet store, gateway and client.

pub mod error;
pub mod frames;
pub mod models;

pub use error::ErrorCode;
pub use frames::{ClientFrame, ServerFrame};
pub use models::{ChatHistory, HistoryMessage, MessageId, Presence, Status, UserPresence};
