//! WebSocket client for the duet server.
//!
//! One [`DuetClient`] wraps one connection and carries its own
//! [`ReconnectPolicy`], so attempts on one connection never affect another.

pub mod reconnect;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use duet_types::{ClientFrame, ServerFrame};

pub use reconnect::{ReconnectDecision, ReconnectPolicy};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("gave up reconnecting after {0} attempts")]
    RetriesExhausted(u32),
}

pub struct DuetClient {
    url: String,
    stream: WsStream,
    policy: ReconnectPolicy,
}

impl DuetClient {
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        Self::connect_with_policy(url, ReconnectPolicy::default()).await
    }

    pub async fn connect_with_policy(
        url: &str,
        policy: ReconnectPolicy,
    ) -> Result<Self, ClientError> {
        let (stream, _) = connect_async(url).await?;
        info!("Connected to {}", url);

        Ok(Self {
            url: url.to_string(),
            stream,
            policy,
        })
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub async fn send(&mut self, frame: &ClientFrame) -> Result<(), ClientError> {
        let text = serde_json::to_string(frame)?;
        debug!("-> {}", frame.kind());
        self.stream.send(Message::text(text)).await?;
        Ok(())
    }

    /// Next server frame, or `None` once the server closes the connection.
    /// Control frames and undecodable text are skipped.
    pub async fn recv(&mut self) -> Result<Option<ServerFrame>, ClientError> {
        while let Some(msg) = self.stream.next().await {
            match msg? {
                Message::Text(text) => match serde_json::from_str::<ServerFrame>(text.as_str()) {
                    Ok(frame) => {
                        debug!("<- {}", frame.kind());
                        return Ok(Some(frame));
                    }
                    Err(e) => {
                        warn!(
                            "Undecodable frame: {} -- raw: {}",
                            e,
                            text.as_str().chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    /// Replace the connection with a fresh one, waiting out the policy's
    /// backoff before each try. The session does not survive; callers log
    /// in again afterwards.
    pub async fn reconnect(&mut self) -> Result<(), ClientError> {
        loop {
            let delay = match self.policy.next_delay() {
                ReconnectDecision::Retry(delay) => delay,
                ReconnectDecision::GiveUp => {
                    warn!("Giving up on {} after {} attempts", self.url, self.policy.attempts());
                    return Err(ClientError::RetriesExhausted(self.policy.attempts()));
                }
            };

            info!(
                "Reconnecting to {} in {:?} (attempt {})",
                self.url,
                delay,
                self.policy.attempts()
            );
            tokio::time::sleep(delay).await;

            match connect_async(self.url.as_str()).await {
                Ok((stream, _)) => {
                    self.stream = stream;
                    self.policy.reset();
                    info!("Reconnected to {}", self.url);
                    return Ok(());
                }
                Err(e) => warn!("Reconnect to {} failed: {}", self.url, e),
            }
        }
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.close(None).await?;
        Ok(())
    }
}
