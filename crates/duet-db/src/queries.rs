use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use rusqlite::{Connection, params, types::Type};
use tracing::debug;

use duet_types::models::{ChatId, UserId};
use duet_types::{ChatHistory, HistoryMessage, MessageId, Presence, UserPresence};

use crate::credentials;
use crate::models::{MessageRow, UserRow};
use crate::{Database, StoreError};

/// Fixed-width so that text order equals time order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

impl Database {
    // -- Users --

    /// Create a user. Fails with [`StoreError::LoginTaken`] and leaves the
    /// table untouched if the login exists.
    pub fn create_user(&self, login: &str, password: &str) -> Result<UserId, StoreError> {
        // Hash before taking the connection lock
        let creds = credentials::hash_password(password)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_user_id(&tx, login)?.is_some() {
                return Err(StoreError::LoginTaken);
            }

            tx.execute(
                "INSERT INTO users (login, password, salt) VALUES (?1, ?2, ?3)",
                params![login, creds.digest, creds.salt],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(id)
        })
    }

    /// Returns the user id when `password` matches the stored digest.
    pub fn verify_credentials(
        &self,
        login: &str,
        password: &str,
    ) -> Result<Option<UserId>, StoreError> {
        let Some(user) = self.get_user_by_login(login)? else {
            return Ok(None);
        };

        if credentials::verify_password(password, &user.password, &user.salt)? {
            Ok(Some(user.id))
        } else {
            Ok(None)
        }
    }

    pub fn get_user_by_login(&self, login: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| query_user_by_login(conn, login))
    }

    pub fn user_id(&self, login: &str) -> Result<Option<UserId>, StoreError> {
        self.with_conn(|conn| query_user_id(conn, login))
    }

    pub fn user_count(&self) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
        })
    }

    /// Case-insensitive prefix search over logins, excluding `requester`.
    ///
    /// Both sides are ASCII-lowercased; other characters compare as-is.
    /// Presence is supplied by the caller.
    pub fn search_users(
        &self,
        requester: &str,
        prefix: &str,
        is_online: impl Fn(&str) -> bool,
    ) -> Result<Vec<UserPresence>, StoreError> {
        let needle = prefix.to_ascii_lowercase();
        let needle_len = needle.chars().count() as i64;

        let logins = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT login FROM users
                 WHERE substr(lower(login), 1, ?1) = ?2 AND login <> ?3
                 ORDER BY login",
            )?;

            let rows = stmt
                .query_map(
                    params![needle_len, needle, requester],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })?;

        Ok(logins
            .into_iter()
            .map(|login| UserPresence {
                online: Presence::from(is_online(&login)),
                login,
            })
            .collect())
    }

    // -- Chats --

    pub fn find_chat(&self, a: &str, b: &str) -> Result<Option<ChatId>, StoreError> {
        self.with_conn(|conn| {
            let (Some(a), Some(b)) = (query_user_id(conn, a)?, query_user_id(conn, b)?) else {
                return Ok(None);
            };
            query_chat_id(conn, a, b)
        })
    }

    // -- Messages --

    /// Store a message from `from` to `to`, creating their chat on first
    /// contact. Runs as one transaction; nothing is written on failure.
    pub fn append_message(
        &self,
        from: &str,
        to: &str,
        body: &str,
    ) -> Result<MessageRow, StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let sender_id = query_user_id(&tx, from)?
                .ok_or_else(|| StoreError::UnknownUser(from.to_string()))?;
            let recipient_id = query_user_id(&tx, to)?
                .ok_or_else(|| StoreError::UnknownUser(to.to_string()))?;

            let chat_id = insert_or_get_chat(&tx, sender_id, recipient_id)?;
            let created_at = next_timestamp(&tx, chat_id)?;

            tx.execute(
                "INSERT INTO messages (chat_id, sender_id, body, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![chat_id, sender_id, body, format_timestamp(created_at)],
            )?;
            let id = MessageId(tx.last_insert_rowid());
            tx.commit()?;

            debug!("Stored message {} in chat {} ({} -> {})", id, chat_id, from, to);

            Ok(MessageRow {
                id,
                chat_id,
                sender_id,
                body: body.to_string(),
                created_at,
                is_read: false,
            })
        })
    }

    pub fn message(&self, id: MessageId) -> Result<Option<MessageRow>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, chat_id, sender_id, body, created_at, is_read FROM messages WHERE id = ?1",
                [id.0],
                message_from_row,
            )
            .optional()
        })
    }

    /// Every chat `login` takes part in, each with its messages in storage
    /// order and the peer's presence as reported by `is_online`.
    pub fn history(
        &self,
        login: &str,
        is_online: impl Fn(&str) -> bool,
    ) -> Result<Vec<ChatHistory>, StoreError> {
        let loaded = self.with_conn(|conn| {
            let Some(user_id) = query_user_id(conn, login)? else {
                return Ok(None);
            };

            let mut threads = Vec::new();
            for (chat_id, peer) in query_chats_of(conn, user_id)? {
                threads.push((peer, query_chat_messages(conn, chat_id)?));
            }
            Ok(Some((user_id, threads)))
        })?;

        let Some((user_id, threads)) = loaded else {
            return Ok(Vec::new());
        };

        Ok(threads
            .into_iter()
            .map(|(peer, rows)| ChatHistory {
                messages: rows
                    .into_iter()
                    .map(|row| HistoryMessage {
                        id: row.id,
                        sender: if row.sender_id == user_id {
                            login.to_string()
                        } else {
                            peer.clone()
                        },
                        message: row.body,
                        timestamp: row.created_at,
                        is_read: row.is_read,
                    })
                    .collect(),
                online: Presence::from(is_online(&peer)),
                other_user: peer,
            })
            .collect())
    }

    /// Mark every unread message `peer` sent to `reader` as read.
    /// Returns the number of messages that changed.
    pub fn mark_chat_read(&self, reader: &str, peer: &str) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let (Some(reader_id), Some(peer_id)) =
                (query_user_id(conn, reader)?, query_user_id(conn, peer)?)
            else {
                return Ok(0);
            };
            let Some(chat_id) = query_chat_id(conn, reader_id, peer_id)? else {
                return Ok(0);
            };

            let updated = conn.execute(
                "UPDATE messages SET is_read = 1 WHERE chat_id = ?1 AND sender_id = ?2 AND is_read = 0",
                [chat_id, peer_id],
            )?;
            Ok(updated)
        })
    }

    /// Mark one message as read on behalf of its recipient. Returns false if
    /// the message is unknown, already read, sent by `reader`, or in a chat
    /// `reader` is not part of.
    pub fn mark_message_read(&self, reader: &str, id: MessageId) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let Some(reader_id) = query_user_id(conn, reader)? else {
                return Ok(false);
            };

            let updated = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE id = ?1 AND is_read = 0 AND sender_id <> ?2
                   AND chat_id IN (SELECT id FROM chats WHERE lo_user_id = ?2 OR hi_user_id = ?2)",
                [id.0, reader_id],
            )?;
            Ok(updated == 1)
        })
    }
}

/// Order a pair so that both call directions address the same chat row.
pub fn canonical_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b { (a, b) } else { (b, a) }
}

fn query_user_by_login(conn: &Connection, login: &str) -> Result<Option<UserRow>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, login, password, salt FROM users WHERE login = ?1")?;

    stmt.query_row([login], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            login: row.get(1)?,
            password: row.get(2)?,
            salt: row.get(3)?,
        })
    })
    .optional()
}

fn query_user_id(conn: &Connection, login: &str) -> Result<Option<UserId>, StoreError> {
    conn.query_row("SELECT id FROM users WHERE login = ?1", [login], |row| {
        row.get(0)
    })
    .optional()
}

fn query_chat_id(conn: &Connection, a: UserId, b: UserId) -> Result<Option<ChatId>, StoreError> {
    let (lo, hi) = canonical_pair(a, b);
    conn.query_row(
        "SELECT id FROM chats WHERE lo_user_id = ?1 AND hi_user_id = ?2",
        [lo, hi],
        |row| row.get(0),
    )
    .optional()
}

/// Atomic under the enclosing transaction: the UNIQUE pair constraint turns a
/// racing second insert into a no-op, and the select then finds the winner.
fn insert_or_get_chat(conn: &Connection, a: UserId, b: UserId) -> Result<ChatId, StoreError> {
    if a == b {
        return Err(StoreError::SelfChat);
    }

    let (lo, hi) = canonical_pair(a, b);
    conn.execute(
        "INSERT OR IGNORE INTO chats (lo_user_id, hi_user_id) VALUES (?1, ?2)",
        [lo, hi],
    )?;

    let id = conn.query_row(
        "SELECT id FROM chats WHERE lo_user_id = ?1 AND hi_user_id = ?2",
        [lo, hi],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn query_chats_of(conn: &Connection, user_id: UserId) -> Result<Vec<(ChatId, String)>, StoreError> {
    // JOIN users to fetch the peer login in the same query
    let mut stmt = conn.prepare(
        "SELECT c.id, u.login
         FROM chats c
         JOIN users u
           ON u.id = CASE WHEN c.lo_user_id = ?1 THEN c.hi_user_id ELSE c.lo_user_id END
         WHERE c.lo_user_id = ?1 OR c.hi_user_id = ?1
         ORDER BY c.id",
    )?;

    let rows = stmt
        .query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_chat_messages(conn: &Connection, chat_id: ChatId) -> Result<Vec<MessageRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, sender_id, body, created_at, is_read
         FROM messages
         WHERE chat_id = ?1
         ORDER BY created_at ASC, id ASC",
    )?;

    let rows = stmt
        .query_map([chat_id], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Never earlier than the newest message already in the chat, so stored
/// order and timestamp order agree even if the wall clock steps back.
fn next_timestamp(conn: &Connection, chat_id: ChatId) -> Result<DateTime<Utc>, StoreError> {
    let now = Utc::now().trunc_subsecs(3);

    let latest: Option<String> = conn.query_row(
        "SELECT MAX(created_at) FROM messages WHERE chat_id = ?1",
        [chat_id],
        |row| row.get(0),
    )?;

    let latest = match latest {
        Some(raw) => Some(parse_timestamp(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
        })?),
        None => None,
    };

    Ok(latest.map_or(now, |latest| latest.max(now)))
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|ndt| ndt.and_utc())
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    let raw: String = row.get(4)?;
    let created_at = parse_timestamp(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(MessageRow {
        id: MessageId(row.get(0)?),
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        body: row.get(3)?,
        created_at,
        is_read: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, StoreError>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, StoreError> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
