use rusqlite::Connection;
use tracing::info;

use crate::StoreError;

pub fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            login       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            salt        TEXT NOT NULL
        );

        -- One row per unordered pair, always stored as (lower id, higher id)
        CREATE TABLE IF NOT EXISTS chats (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            lo_user_id  INTEGER NOT NULL REFERENCES users(id),
            hi_user_id  INTEGER NOT NULL REFERENCES users(id),
            UNIQUE (lo_user_id, hi_user_id),
            CHECK (lo_user_id < hi_user_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id     INTEGER NOT NULL REFERENCES chats(id),
            sender_id   INTEGER NOT NULL REFERENCES users(id),
            body        TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            is_read     INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, created_at);

        CREATE TRIGGER IF NOT EXISTS messages_read_is_final
            BEFORE UPDATE OF is_read ON messages
            WHEN OLD.is_read = 1 AND NEW.is_read = 0
        BEGIN
            SELECT RAISE(ABORT, 'read flag cannot be cleared');
        END;
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
