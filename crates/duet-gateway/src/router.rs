use tracing::{debug, error, info, warn};

use duet_db::{Database, StoreError};
use duet_types::{ClientFrame, ErrorCode, MessageId, Presence, ServerFrame, Status};

use crate::presence;
use crate::registry::{ConnId, ConnectionHandle, ConnectionRegistry};

/// Events fed to the router, in arrival order.
#[derive(Debug)]
pub enum Inbound {
    Connected(ConnectionHandle),
    Frame { conn: ConnId, text: String },
    Disconnected(ConnId),
}

/// Decodes frames, applies them to the registry and the store, and queues
/// responses. Every side effect of one frame (session change, presence
/// fan-out, storage) completes before that frame's response is queued.
pub struct Router {
    db: Database,
    registry: ConnectionRegistry,
}

impl Router {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            registry: ConnectionRegistry::new(),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn handle(&mut self, event: Inbound) {
        match event {
            Inbound::Connected(handle) => {
                debug!("Connection {} attached", handle.id());
                self.registry.attach(handle);
            }
            Inbound::Frame { conn, text } => self.handle_text(conn, &text),
            Inbound::Disconnected(conn) => self.handle_disconnect(conn),
        }
    }

    /// Malformed or unknown frames are dropped without a response.
    pub fn handle_text(&mut self, conn: ConnId, text: &str) {
        match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => self.dispatch(conn, frame),
            Err(e) => {
                warn!(
                    "Connection {} bad frame: {} -- raw: {}",
                    conn,
                    e,
                    text.chars().take(200).collect::<String>()
                );
            }
        }
    }

    pub fn dispatch(&mut self, conn: ConnId, frame: ClientFrame) {
        let Some(handle) = self.registry.connection(conn).cloned() else {
            warn!("Frame {} from unattached connection {}", frame.kind(), conn);
            return;
        };

        debug!("Connection {} -> {}", conn, frame.kind());

        match frame {
            ClientFrame::Login { login, password } => self.login(&handle, &login, &password),

            ClientFrame::Registration { login, password } => {
                self.registration(&handle, &login, &password)
            }

            // Everything else acts on behalf of the connection's session
            frame => {
                let Some(session) = self.session(conn, &frame) else {
                    return;
                };

                match frame {
                    ClientFrame::Chat { to, message, .. } => {
                        self.chat(&handle, &session, &to, &message)
                    }
                    ClientFrame::SearchUsers { prefix, .. } => {
                        self.search_users(&handle, &session, &prefix)
                    }
                    ClientFrame::GetOnlineStatus { target, .. } => {
                        handle.send(ServerFrame::GetOnlineStatus {
                            to: session,
                            online: Presence::from(self.registry.is_online(&target)),
                            message: target,
                        });
                    }
                    ClientFrame::MarkAsRead { to, .. } => self.mark_as_read(&session, &to),
                    ClientFrame::Ack { msg_id } => self.ack(&session, msg_id),
                    ClientFrame::Login { .. } | ClientFrame::Registration { .. } => {}
                }
            }
        }
    }

    /// The login bound to `conn`, provided it matches the sender the frame
    /// claims. Frames failing either check are dropped.
    fn session(&self, conn: ConnId, frame: &ClientFrame) -> Option<String> {
        let Some(login) = self.registry.login_of(conn) else {
            warn!("Dropping {} from unauthenticated connection {}", frame.kind(), conn);
            return None;
        };

        if let Some(claimed) = frame.sender() {
            if claimed != login {
                warn!(
                    "Dropping {} from {} ({}): claims to be {}",
                    frame.kind(),
                    login,
                    conn,
                    claimed
                );
                return None;
            }
        }

        Some(login.to_string())
    }

    fn login(&mut self, handle: &ConnectionHandle, login: &str, password: &str) {
        let reply = |status: Status, message: &str, code: Option<ErrorCode>| ServerFrame::Login {
            to: login.to_string(),
            status,
            message: message.to_string(),
            code,
            history_messages: None,
        };

        if login.is_empty() || password.is_empty() {
            handle.send(reply(
                Status::Fail,
                "Login and password are required",
                Some(ErrorCode::InvalidInput),
            ));
            return;
        }

        match self.db.verify_credentials(login, password) {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!("Rejected login for {} on {}", login, handle.id());
                handle.send(reply(
                    Status::Fail,
                    "Invalid login or password",
                    Some(ErrorCode::InvalidCredentials),
                ));
                return;
            }
            Err(e) => {
                error!("Credential check for {} failed: {}", login, e);
                handle.send(reply(
                    Status::Fail,
                    "Login failed, please try again",
                    Some(ErrorCode::StorageFailure),
                ));
                return;
            }
        }

        // Session first, so peer presence in the history reflects it
        self.open_session(handle, login);

        let registry = &self.registry;
        let history = match self.db.history(login, |peer| registry.is_online(peer)) {
            Ok(history) => history,
            Err(e) => {
                error!("Loading history for {} failed: {}", login, e);
                self.close_session(handle.id());
                handle.send(reply(
                    Status::Fail,
                    "Login failed, please try again",
                    Some(ErrorCode::StorageFailure),
                ));
                return;
            }
        };

        handle.send(ServerFrame::Login {
            to: login.to_string(),
            status: Status::Success,
            message: "Login successful".to_string(),
            code: None,
            history_messages: Some(history),
        });
    }

    fn registration(&mut self, handle: &ConnectionHandle, login: &str, password: &str) {
        let reply = |status: Status, message: &str, code: Option<ErrorCode>| {
            ServerFrame::Registration {
                to: login.to_string(),
                status,
                message: message.to_string(),
                code,
            }
        };

        if login.is_empty() || password.is_empty() {
            handle.send(reply(
                Status::Fail,
                "Login and password are required",
                Some(ErrorCode::InvalidInput),
            ));
            return;
        }

        match self.db.create_user(login, password) {
            Ok(user_id) => {
                info!("Registered {} (user {})", login, user_id);
                self.open_session(handle, login);
                handle.send(reply(Status::Success, "Registration successful", None));
            }
            Err(StoreError::LoginTaken) => {
                info!("Registration for taken login {} rejected", login);
                handle.send(reply(
                    Status::Fail,
                    "Login is used, please try again",
                    Some(ErrorCode::LoginTaken),
                ));
            }
            Err(e) => {
                error!("Registering {} failed: {}", login, e);
                handle.send(reply(
                    Status::Fail,
                    "Registration failed, please try again",
                    Some(ErrorCode::StorageFailure),
                ));
            }
        }
    }

    /// Bind the session and announce it. Runs before the caller's response.
    fn open_session(&mut self, handle: &ConnectionHandle, login: &str) {
        // Re-authenticating as the same login changes nothing
        if self.registry.login_of(handle.id()) == Some(login) {
            debug!("{} already holds connection {}", login, handle.id());
            return;
        }

        let outcome = self.registry.register(login, handle.clone());

        if let Some(old) = outcome.displaced {
            info!("{} moved from connection {} to {}", login, old, handle.id());
        }
        if let Some(previous) = outcome.replaced_login {
            info!("{} went offline ({} logged in on {})", previous, login, handle.id());
            presence::broadcast(&self.registry, handle.id(), &previous, Presence::Offline);
        }

        info!("{} is online ({})", login, handle.id());
        presence::broadcast(&self.registry, handle.id(), login, Presence::Online);
    }

    /// End the session on `conn` and announce it, keeping the connection.
    fn close_session(&mut self, conn: ConnId) {
        if let Some(login) = self.registry.unregister(conn) {
            info!("{} is offline ({})", login, conn);
            presence::broadcast(&self.registry, conn, &login, Presence::Offline);
        }
    }

    fn chat(&mut self, handle: &ConnectionHandle, from: &str, to: &str, body: &str) {
        let frame = |message: &str,
                     status: Status,
                     msg_id: Option<MessageId>,
                     code: Option<ErrorCode>| ServerFrame::Chat {
            from: from.to_string(),
            to: to.to_string(),
            message: message.to_string(),
            status,
            msg_id,
            code,
        };

        if body.is_empty() || to == from {
            handle.send(frame(
                "Message needs a body and another recipient",
                Status::Fail,
                None,
                Some(ErrorCode::InvalidInput),
            ));
            return;
        }

        let stored = match self.db.append_message(from, to, body) {
            Ok(stored) => stored,
            Err(StoreError::UnknownUser(login)) => {
                warn!("{} wrote to unknown user {}", from, login);
                handle.send(frame(
                    "User not found!",
                    Status::Fail,
                    None,
                    Some(ErrorCode::UnknownUser),
                ));
                return;
            }
            Err(e) => {
                error!("Storing message {} -> {} failed: {}", from, to, e);
                handle.send(frame(
                    "Message could not be stored",
                    Status::Fail,
                    None,
                    Some(ErrorCode::StorageFailure),
                ));
                return;
            }
        };

        let delivered = frame(body, Status::Success, Some(stored.id), None);
        let relayed = self
            .registry
            .lookup(to)
            .is_some_and(|recipient| recipient.send(delivered.clone()));

        if relayed {
            debug!("Message {} relayed {} -> {}", stored.id, from, to);
            handle.send(delivered);
        } else {
            debug!("Message {} stored for offline {}", stored.id, to);
            handle.send(frame(
                "Client not found!",
                Status::Fail,
                Some(stored.id),
                Some(ErrorCode::RecipientOffline),
            ));
        }
    }

    fn search_users(&mut self, handle: &ConnectionHandle, login: &str, prefix: &str) {
        let registry = &self.registry;
        let clients = match self.db.search_users(login, prefix, |l| registry.is_online(l)) {
            Ok(clients) => clients,
            Err(e) => {
                error!("Search by {} for {:?} failed: {}", login, prefix, e);
                Vec::new()
            }
        };

        handle.send(ServerFrame::SearchUsers {
            to: login.to_string(),
            clients,
        });
    }

    fn mark_as_read(&mut self, reader: &str, peer: &str) {
        match self.db.mark_chat_read(reader, peer) {
            Ok(count) => debug!("{} read {} messages from {}", reader, count, peer),
            Err(e) => error!("Marking chat {} <- {} read failed: {}", reader, peer, e),
        }
    }

    fn ack(&mut self, reader: &str, msg_id: MessageId) {
        match self.db.mark_message_read(reader, msg_id) {
            Ok(true) => debug!("{} acked message {}", reader, msg_id),
            Ok(false) => debug!("Ack of message {} by {} changed nothing", msg_id, reader),
            Err(e) => error!("Ack of message {} by {} failed: {}", msg_id, reader, e),
        }
    }

    fn handle_disconnect(&mut self, conn: ConnId) {
        match self.registry.detach(conn) {
            Some(login) => {
                info!("{} is offline ({})", login, conn);
                presence::broadcast(&self.registry, conn, &login, Presence::Offline);
            }
            None => debug!("Connection {} closed without a session", conn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use uuid::Uuid;

    fn router() -> Router {
        Router::new(Database::open_in_memory().unwrap())
    }

    fn connect(router: &mut Router) -> (ConnId, UnboundedReceiver<ServerFrame>) {
        let (handle, rx) = ConnectionHandle::channel();
        let id = handle.id();
        router.handle(Inbound::Connected(handle));
        (id, rx)
    }

    fn send(router: &mut Router, conn: ConnId, frame: serde_json::Value) {
        router.handle(Inbound::Frame {
            conn,
            text: frame.to_string(),
        });
    }

    fn chat(from: &str, to: &str, message: &str) -> serde_json::Value {
        json!({"type": "chat", "from": from, "to": to, "message": message})
    }

    fn auth(kind: &str, login: &str, password: &str) -> serde_json::Value {
        json!({"type": kind, "login": login, "password": password})
    }

    fn drain(rx: &mut UnboundedReceiver<ServerFrame>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn status_of(frame: &ServerFrame) -> Status {
        match frame {
            ServerFrame::Login { status, .. }
            | ServerFrame::Registration { status, .. }
            | ServerFrame::Chat { status, .. } => *status,
            other => panic!("no status on {:?}", other),
        }
    }

    /// Register `login` on a fresh connection and drain the response.
    fn registered(router: &mut Router, login: &str) -> (ConnId, UnboundedReceiver<ServerFrame>) {
        let (conn, mut rx) = connect(router);
        send(router, conn, auth("registration", login, "pw"));
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(status_of(&frames[0]), Status::Success);
        (conn, rx)
    }

    #[test]
    fn test_offline_recipient_scenario() {
        let mut router = router();
        let (bob_reg, _) = registered(&mut router, "bob");
        router.handle(Inbound::Disconnected(bob_reg));
        let (alice, mut alice_rx) = registered(&mut router, "alice");

        send(&mut router, alice, chat("alice", "bob", "hi"));
        match drain(&mut alice_rx).as_slice() {
            [ServerFrame::Chat { status, message, code, msg_id, .. }] => {
                assert_eq!(*status, Status::Fail);
                assert_eq!(message, "Client not found!");
                assert_eq!(*code, Some(ErrorCode::RecipientOffline));
                assert!(msg_id.is_some());
            }
            other => panic!("unexpected frames {:?}", other),
        }

        // bob logs in and finds the stored message, unread, with alice online
        let (bob, mut bob_rx) = connect(&mut router);
        send(&mut router, bob, auth("login", "bob", "pw"));
        match drain(&mut bob_rx).as_slice() {
            [ServerFrame::Login {
                status: Status::Success,
                history_messages: Some(history),
                ..
            }] => {
                assert_eq!(history.len(), 1);
                assert_eq!(history[0].other_user, "alice");
                assert_eq!(history[0].online, Presence::Online);
                assert_eq!(history[0].messages.len(), 1);
                assert_eq!(history[0].messages[0].message, "hi");
                assert_eq!(history[0].messages[0].sender, "alice");
                assert!(!history[0].messages[0].is_read);
            }
            other => panic!("unexpected frames {:?}", other),
        }

        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerFrame::UpdateClients { login: "bob".into(), online: Presence::Online }]
        );
    }

    #[test]
    fn test_first_login_has_empty_history() {
        let mut router = router();
        let (reg, _) = registered(&mut router, "alice");
        router.handle(Inbound::Disconnected(reg));

        let (conn, mut rx) = connect(&mut router);
        send(&mut router, conn, auth("login", "alice", "pw"));
        match drain(&mut rx).as_slice() {
            [ServerFrame::Login {
                status: Status::Success,
                history_messages: Some(history),
                to,
                ..
            }] => {
                assert!(history.is_empty());
                assert_eq!(to, "alice");
            }
            other => panic!("unexpected frames {:?}", other),
        }
    }

    #[test]
    fn test_live_relay_between_online_users() {
        let mut router = router();
        let (alice, mut alice_rx) = registered(&mut router, "alice");
        let (_bob, mut bob_rx) = registered(&mut router, "bob");
        drain(&mut alice_rx);

        send(&mut router, alice, chat("alice", "bob", "hi"));

        let relayed = drain(&mut bob_rx);
        let echoed = drain(&mut alice_rx);
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed, echoed);
        match &relayed[0] {
            ServerFrame::Chat { from, to, message, status, msg_id, code } => {
                assert_eq!((from.as_str(), to.as_str(), message.as_str()), ("alice", "bob", "hi"));
                assert_eq!(*status, Status::Success);
                assert!(msg_id.is_some());
                assert!(code.is_none());
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_search_scenario() {
        let mut router = router();
        let (alice, mut alice_rx) = registered(&mut router, "alice");
        let _bob = registered(&mut router, "bob");
        drain(&mut alice_rx);

        send(&mut router, alice, json!({"type": "search_users", "from": "alice", "message": "b"}));
        let frames = drain(&mut alice_rx);
        assert_eq!(
            serde_json::to_value(&frames[0]).unwrap(),
            json!({
                "type": "search_users",
                "to": "alice",
                "clients": [{"login": "bob", "online": "TRUE"}],
            })
        );
    }

    #[test]
    fn test_get_online_status() {
        let mut router = router();
        let (alice, mut alice_rx) = registered(&mut router, "alice");

        send(
            &mut router,
            alice,
            json!({"type": "get_online_status", "from": "alice", "message": "bob"}),
        );
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerFrame::GetOnlineStatus {
                to: "alice".into(),
                online: Presence::Offline,
                message: "bob".into(),
            }]
        );
    }

    #[test]
    fn test_duplicate_registration() {
        let mut router = router();
        let (_alice, _) = registered(&mut router, "alice");
        let (other, mut other_rx) = connect(&mut router);

        send(&mut router, other, auth("registration", "alice", "x"));
        match drain(&mut other_rx).as_slice() {
            [ServerFrame::Registration {
                status: Status::Fail,
                code: Some(ErrorCode::LoginTaken),
                ..
            }] => {}
            other => panic!("unexpected frames {:?}", other),
        }
        assert_eq!(router.database().user_count().unwrap(), 1);
        assert_eq!(router.registry().login_of(other), None);
    }

    #[test]
    fn test_bad_password_creates_no_session() {
        let mut router = router();
        let (_alice, mut alice_rx) = registered(&mut router, "alice");
        let (_bob, _) = registered(&mut router, "bob");
        drain(&mut alice_rx);

        let (conn, mut rx) = connect(&mut router);
        send(&mut router, conn, auth("login", "bob", "wrong"));
        match drain(&mut rx).as_slice() {
            [ServerFrame::Login {
                status: Status::Fail,
                code: Some(ErrorCode::InvalidCredentials),
                history_messages: None,
                ..
            }] => {}
            other => panic!("unexpected frames {:?}", other),
        }
        assert_eq!(router.registry().login_of(conn), None);
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[test]
    fn test_empty_credentials_fail() {
        let mut router = router();
        let (conn, mut rx) = connect(&mut router);
        send(&mut router, conn, auth("registration", "", "pw"));
        match drain(&mut rx).as_slice() {
            [ServerFrame::Registration {
                status: Status::Fail,
                code: Some(ErrorCode::InvalidInput),
                ..
            }] => {}
            other => panic!("unexpected frames {:?}", other),
        }
        assert_eq!(router.database().user_count().unwrap(), 0);
    }

    #[test]
    fn test_one_session_per_login() {
        let mut router = router();
        let (first, _first_rx) = registered(&mut router, "alice");
        let (_bob, mut bob_rx) = registered(&mut router, "bob");

        let (second, mut second_rx) = connect(&mut router);
        send(&mut router, second, auth("login", "alice", "pw"));
        assert_eq!(status_of(&drain(&mut second_rx)[0]), Status::Success);

        assert_eq!(router.registry().lookup("alice").map(|h| h.id()), Some(second));
        assert_eq!(router.registry().login_of(first), None);
        assert_eq!(router.registry().session_count(), 2);
        drain(&mut bob_rx);

        // the displaced connection closing is not an offline transition
        router.handle(Inbound::Disconnected(first));
        assert!(router.registry().is_online("alice"));
        assert!(drain(&mut bob_rx).is_empty());

        // and it can no longer act as alice
        send(&mut router, first, chat("alice", "bob", "x"));
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[test]
    fn test_disconnect_broadcasts_offline() {
        let mut router = router();
        let (alice, _) = registered(&mut router, "alice");
        let (_bob, mut bob_rx) = registered(&mut router, "bob");

        router.handle(Inbound::Disconnected(alice));
        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerFrame::UpdateClients { login: "alice".into(), online: Presence::Offline }]
        );
        assert!(!router.registry().is_online("alice"));
        assert_eq!(router.registry().connection(alice).map(|h| h.id()), None);
    }

    #[test]
    fn test_switching_login_announces_previous_offline() {
        let mut router = router();
        let (_watcher, mut watcher_rx) = registered(&mut router, "carol");
        let (conn, _) = registered(&mut router, "alice");
        router.database().create_user("bob", "pw").unwrap();
        drain(&mut watcher_rx);

        send(&mut router, conn, auth("login", "bob", "pw"));
        assert_eq!(
            drain(&mut watcher_rx),
            vec![
                ServerFrame::UpdateClients { login: "alice".into(), online: Presence::Offline },
                ServerFrame::UpdateClients { login: "bob".into(), online: Presence::Online },
            ]
        );
    }

    #[test]
    fn test_presence_queued_before_login_response() {
        // Two connections sharing one queue expose the global queueing order.
        let mut router = router();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = ConnectionHandle::new(Uuid::new_v4(), tx.clone());
        let joiner = ConnectionHandle::new(Uuid::new_v4(), tx);
        router.handle(Inbound::Connected(watcher.clone()));
        router.handle(Inbound::Connected(joiner.clone()));

        send(&mut router, watcher.id(), auth("registration", "alice", "pw"));
        drain(&mut rx);

        send(&mut router, joiner.id(), auth("registration", "bob", "pw"));
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].kind(), "update_clients");
        assert_eq!(frames[1].kind(), "registration");
    }

    #[test]
    fn test_unauthenticated_and_spoofed_frames_are_dropped() {
        let mut router = router();
        let (_alice, mut alice_rx) = registered(&mut router, "alice");
        let (mallory, mut mallory_rx) = registered(&mut router, "mallory");
        let (anon, mut anon_rx) = connect(&mut router);
        drain(&mut alice_rx);

        send(&mut router, anon, chat("mallory", "alice", "x"));
        send(&mut router, anon, json!({"type": "search_users", "from": "mallory", "message": ""}));
        send(&mut router, mallory, chat("bob", "alice", "x"));

        assert!(drain(&mut anon_rx).is_empty());
        assert!(drain(&mut mallory_rx).is_empty());
        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(router.database().find_chat("mallory", "alice").unwrap(), None);
    }

    #[test]
    fn test_malformed_frames_are_dropped_and_connection_survives() {
        let mut router = router();
        let (conn, mut rx) = connect(&mut router);

        router.handle(Inbound::Frame { conn, text: "{not json".into() });
        send(&mut router, conn, json!({"type": "teleport"}));
        send(&mut router, conn, json!({"type": "login", "login": "alice"}));
        assert!(drain(&mut rx).is_empty());

        send(&mut router, conn, auth("registration", "alice", "pw"));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_chat_to_unknown_user_and_self() {
        let mut router = router();
        let (alice, mut rx) = registered(&mut router, "alice");

        send(&mut router, alice, chat("alice", "ghost", "hi"));
        send(&mut router, alice, chat("alice", "alice", "hi"));
        send(&mut router, alice, chat("alice", "bob", ""));

        let codes: Vec<Option<ErrorCode>> = drain(&mut rx)
            .into_iter()
            .map(|frame| match frame {
                ServerFrame::Chat { code, .. } => code,
                other => panic!("unexpected frame {:?}", other),
            })
            .collect();
        assert_eq!(
            codes,
            vec![
                Some(ErrorCode::UnknownUser),
                Some(ErrorCode::InvalidInput),
                Some(ErrorCode::InvalidInput),
            ]
        );
    }

    #[test]
    fn test_mark_as_read_and_ack_share_read_state() {
        let mut router = router();
        let (alice, mut alice_rx) = registered(&mut router, "alice");
        let (bob, mut bob_rx) = registered(&mut router, "bob");
        drain(&mut alice_rx);

        send(&mut router, alice, chat("alice", "bob", "one"));
        send(&mut router, alice, chat("alice", "bob", "two"));
        let ids: Vec<MessageId> = drain(&mut bob_rx)
            .into_iter()
            .filter_map(|frame| match frame {
                ServerFrame::Chat { msg_id, .. } => msg_id,
                _ => None,
            })
            .collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(drain(&mut alice_rx).len(), 2);

        // sender cannot ack its own message
        send(&mut router, alice, json!({"type": "ack", "msg_id": ids[0].to_string()}));
        assert!(!router.database().message(ids[0]).unwrap().unwrap().is_read);

        send(&mut router, bob, json!({"type": "ack", "msg_id": ids[0].to_string()}));
        assert!(router.database().message(ids[0]).unwrap().unwrap().is_read);
        assert!(!router.database().message(ids[1]).unwrap().unwrap().is_read);

        send(&mut router, bob, json!({"type": "mark_as_read", "from": "bob", "to": "alice"}));
        assert!(router.database().message(ids[1]).unwrap().unwrap().is_read);

        // neither produces a response
        assert!(drain(&mut bob_rx).is_empty());
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[test]
    fn test_history_after_login_switch_reports_previous_login_offline() {
        let mut router = router();
        router.database().create_user("alice", "pw").unwrap();
        router.database().create_user("bob", "pw").unwrap();
        router.database().append_message("alice", "bob", "hi").unwrap();

        let (conn, mut rx) = connect(&mut router);
        send(&mut router, conn, auth("login", "alice", "pw"));
        drain(&mut rx);

        send(&mut router, conn, auth("login", "bob", "pw"));
        assert!(!router.registry().is_online("alice"));
        match drain(&mut rx).as_slice() {
            [ServerFrame::Login {
                status: Status::Success,
                history_messages: Some(history),
                ..
            }] => {
                assert_eq!(history.len(), 1);
                assert_eq!(history[0].other_user, "alice");
                assert_eq!(history[0].online, Presence::Offline);
            }
            other => panic!("unexpected frames {:?}", other),
        }
    }

    #[test]
    fn test_relogin_as_same_user_is_not_a_presence_change() {
        let mut router = router();
        let (_watcher, mut watcher_rx) = registered(&mut router, "carol");
        let (conn, mut rx) = registered(&mut router, "alice");
        drain(&mut watcher_rx);

        send(&mut router, conn, auth("login", "alice", "pw"));
        assert_eq!(status_of(&drain(&mut rx)[0]), Status::Success);
        assert!(drain(&mut watcher_rx).is_empty());
        assert_eq!(router.registry().login_of(conn), Some("alice"));
    }
}
