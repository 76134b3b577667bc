use std::collections::HashMap;

use tokio::sync::mpsc;
use uuid::Uuid;

use duet_types::ServerFrame;

pub type ConnId = Uuid;

/// Outbound side of one live connection: its id plus the queue its writer
/// task drains.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnId,
    tx: mpsc::UnboundedSender<ServerFrame>,
}

impl ConnectionHandle {
    pub fn new(id: ConnId, tx: mpsc::UnboundedSender<ServerFrame>) -> Self {
        Self { id, tx }
    }

    /// A handle with a fresh id, and the receiver for its frames.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(Uuid::new_v4(), tx), rx)
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Queue a frame. Returns false once the writer is gone.
    pub fn send(&self, frame: ServerFrame) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// What [`ConnectionRegistry::register`] changed besides the new binding.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Registration {
    /// Connection that held the login before; it no longer has a session.
    pub displaced: Option<ConnId>,
    /// Different login this connection held before; that session has ended.
    pub replaced_login: Option<String>,
}

/// Live connections and the login↔connection session indices.
///
/// Owned by the reactor and only touched from there, so it needs no locks.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Every attached connection, authenticated or not
    connections: HashMap<ConnId, ConnectionHandle>,

    /// login -> session connection
    by_login: HashMap<String, ConnectionHandle>,

    /// session connection -> login
    by_conn: HashMap<ConnId, String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, handle: ConnectionHandle) {
        self.connections.insert(handle.id(), handle);
    }

    /// Forget a connection. Returns the login whose session it held.
    pub fn detach(&mut self, conn: ConnId) -> Option<String> {
        let login = self.unregister(conn);
        self.connections.remove(&conn);
        login
    }

    pub fn connection(&self, conn: ConnId) -> Option<&ConnectionHandle> {
        self.connections.get(&conn)
    }

    /// Bind `login` to `handle`, replacing any earlier binding of either.
    pub fn register(&mut self, login: &str, handle: ConnectionHandle) -> Registration {
        let conn = handle.id();
        let mut outcome = Registration::default();

        if let Some(previous) = self.by_conn.remove(&conn) {
            if previous != login {
                self.by_login.remove(&previous);
                outcome.replaced_login = Some(previous);
            }
        }

        if let Some(old) = self.by_login.insert(login.to_string(), handle) {
            if old.id() != conn {
                self.by_conn.remove(&old.id());
                outcome.displaced = Some(old.id());
            }
        }

        self.by_conn.insert(conn, login.to_string());
        outcome
    }

    /// End the session held by `conn`, if any. Returns its login.
    pub fn unregister(&mut self, conn: ConnId) -> Option<String> {
        let login = self.by_conn.remove(&conn)?;

        // Only clear the login if this connection still owns it
        if self
            .by_login
            .get(&login)
            .is_some_and(|handle| handle.id() == conn)
        {
            self.by_login.remove(&login);
        }

        Some(login)
    }

    pub fn lookup(&self, login: &str) -> Option<&ConnectionHandle> {
        self.by_login.get(login)
    }

    pub fn is_online(&self, login: &str) -> bool {
        self.by_login.contains_key(login)
    }

    pub fn login_of(&self, conn: ConnId) -> Option<&str> {
        self.by_conn.get(&conn).map(String::as_str)
    }

    /// Every session except the one on `exclude`.
    pub fn others(&self, exclude: ConnId) -> impl Iterator<Item = (&str, &ConnectionHandle)> {
        self.by_login
            .iter()
            .filter(move |(_, handle)| handle.id() != exclude)
            .map(|(login, handle)| (login.as_str(), handle))
    }

    pub fn session_count(&self) -> usize {
        self.by_login.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
