#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("login is already taken")]
    LoginTaken,

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("a chat needs two distinct users")]
    SelfChat,

    #[error("credential hashing failed: {0}")]
    Credentials(String),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
