use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tracing::{debug, info};

use duet_db::Database;

use crate::registry::{ConnId, ConnectionHandle};
use crate::router::{Inbound, Router};

/// Cheap, cloneable sender side of the reactor. Connection tasks hold one
/// each; the reactor stops once every clone is dropped.
#[derive(Debug, Clone)]
pub struct ReactorHandle {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl ReactorHandle {
    pub fn connected(&self, handle: ConnectionHandle) {
        self.submit(Inbound::Connected(handle));
    }

    pub fn frame(&self, conn: ConnId, text: String) {
        self.submit(Inbound::Frame { conn, text });
    }

    pub fn disconnected(&self, conn: ConnId) {
        self.submit(Inbound::Disconnected(conn));
    }

    fn submit(&self, event: Inbound) {
        if self.tx.send(event).is_err() {
            debug!("Reactor stopped, event dropped");
        }
    }
}

/// Start the reactor thread. It owns the router (registry and store) and
/// processes events strictly one at a time in arrival order.
pub fn spawn(db: Database) -> anyhow::Result<(ReactorHandle, JoinHandle<()>)> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Inbound>();
    let mut router = Router::new(db);

    let join = thread::Builder::new()
        .name("duet-reactor".into())
        .spawn(move || {
            info!("Reactor started");
            while let Some(event) = rx.blocking_recv() {
                router.handle(event);
            }
            info!(
                "Reactor stopped ({} connections, {} sessions still attached)",
                router.registry().connection_count(),
                router.registry().session_count()
            );
        })?;

    Ok((ReactorHandle { tx }, join))
}
