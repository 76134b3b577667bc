use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, trace, warn};

use crate::reactor::ReactorHandle;
use crate::registry::ConnectionHandle;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one WebSocket connection until either side goes away.
///
/// Text frames go to the reactor verbatim; decoding happens there. Frames
/// the reactor queues for this connection are written in queue order.
pub async fn handle_connection(socket: WebSocket, reactor: ReactorHandle) {
    let (mut sender, mut receiver) = socket.split();
    let (handle, mut outbound) = ConnectionHandle::channel();
    let conn = handle.id();

    info!("Connection {} opened", conn);
    reactor.connected(handle);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };

                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Connection {}: cannot encode {}: {}", conn, frame.kind(), e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(
                                "Connection {} heartbeat timeout (missed {} pongs), dropping",
                                conn, missed_heartbeats
                            );
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let reactor_recv = reactor.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    trace!("Connection {} <- {} bytes", conn, text.len());
                    reactor_recv.frame(conn, text.as_str().to_owned());
                }
                Message::Binary(data) => {
                    warn!("Connection {} sent {} binary bytes, ignoring", conn, data.len());
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    reactor.disconnected(conn);
    info!("Connection {} closed", conn);
}
