use tracing::{debug, trace};

use duet_types::{Presence, ServerFrame};

use crate::registry::{ConnId, ConnectionRegistry};

/// Queue one `update_clients` frame for `login` on every session except
/// `origin`. Best-effort: a session whose writer is gone is skipped.
/// Returns how many sessions the frame was queued for.
pub fn broadcast(
    registry: &ConnectionRegistry,
    origin: ConnId,
    login: &str,
    presence: Presence,
) -> usize {
    let frame = ServerFrame::UpdateClients {
        login: login.to_string(),
        online: presence,
    };

    let mut delivered = 0;
    for (peer, handle) in registry.others(origin) {
        if handle.send(frame.clone()) {
            delivered += 1;
        } else {
            trace!("Presence of {} not queued for {}: writer closed", login, peer);
        }
    }

    debug!(
        "Presence {} = {:?} fanned out to {} sessions",
        login, presence, delivered
    );
    delivered
}
