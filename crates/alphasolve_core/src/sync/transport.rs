//! WebSocket transport for sync packets.
//!
//! # Responsibility
//! - Connect to the sync server with session identity as query parameters.
//! - Pump inbound text messages to the session and outbound packets to the socket.
//! - Reconnect with exponential backoff after abnormal closes.
//!
//! # Invariants
//! - One WebSocket text message carries exactly one JSON packet.
//! - A normal close ends the transport without reconnecting.
//! - Outbound sends are fire-and-forget; delivery is never confirmed.

use crate::model::project::ProjectId;
use crate::sync::packet::Packet;
use futures::{SinkExt, StreamExt};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use url::Url;

/// Transport-level failures. None of them touches project state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Server URL cannot be parsed or uses a non-WebSocket scheme.
    InvalidUrl(String),
    /// Handshake with the server failed.
    Connect(String),
    /// An established socket failed or closed abnormally.
    Socket(String),
    /// Reconnect schedule ran out.
    RetriesExhausted { attempts: u32 },
}

impl Display for ConnectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl(message) => write!(f, "invalid sync server url: {message}"),
            Self::Connect(message) => write!(f, "sync connect failed: {message}"),
            Self::Socket(message) => write!(f, "sync socket failed: {message}"),
            Self::RetriesExhausted { attempts } => {
                write!(f, "sync reconnect gave up after {attempts} attempts")
            }
        }
    }
}

impl Error for ConnectionError {}

/// Exponential reconnect schedule: `base_delay * 2^attempt`, bounded attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (0-based), or `None` when exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor))
    }
}

/// Identity sent to the sync server on connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub server_url: String,
    pub display_name: String,
    pub project_id: ProjectId,
    pub user_id: String,
}

impl ConnectionParams {
    /// Builds the connection URL with `name`, `projectId` and `userId` query parameters.
    pub fn url(&self) -> Result<Url, ConnectionError> {
        let mut url = Url::parse(self.server_url.trim())
            .map_err(|err| ConnectionError::InvalidUrl(err.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConnectionError::InvalidUrl(format!(
                "unsupported scheme `{}`",
                url.scheme()
            )));
        }
        url.query_pairs_mut()
            .append_pair("name", &self.display_name)
            .append_pair("projectId", &self.project_id.to_string())
            .append_pair("userId", &self.user_id);
        Ok(url)
    }
}

/// Outbound packet destination.
pub trait PacketSink: Send {
    /// Hands `packet` to the transport without waiting for delivery.
    fn send(&self, packet: Packet);
}

/// [`PacketSink`] backed by an unbounded channel drained by [`run_transport`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<Packet>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<Packet>) -> Self {
        Self { tx }
    }
}

impl PacketSink for ChannelSink {
    fn send(&self, packet: Packet) {
        let kind = packet.kind();
        if self.tx.send(packet).is_err() {
            warn!(
                "event=packet_send module=sync status=skip packet_type={} reason=transport_closed",
                kind.as_str()
            );
        }
    }
}

/// Creates a channel sink and the receiver the transport drains.
pub fn outbound_channel() -> (ChannelSink, UnboundedReceiver<Packet>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink::new(tx), rx)
}

enum SocketEnd {
    Normal,
    Abnormal(ConnectionError),
}

/// Runs the connect / pump / reconnect loop until a normal close.
///
/// Inbound text messages are forwarded to `inbound`. Dropping every
/// [`ChannelSink`] for `outbound` closes the socket normally.
///
/// # Errors
/// - `InvalidUrl` before any connect attempt.
/// - `RetriesExhausted` when the reconnect schedule runs out.
pub async fn run_transport(
    params: &ConnectionParams,
    policy: ReconnectPolicy,
    inbound: UnboundedSender<String>,
    mut outbound: UnboundedReceiver<Packet>,
) -> Result<(), ConnectionError> {
    let url = params.url()?;
    let mut attempt = 0;
    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                attempt = 0;
                info!(
                    "event=sync_connect module=sync status=ok project_id={}",
                    params.project_id
                );
                match pump(stream, &inbound, &mut outbound).await {
                    SocketEnd::Normal => {
                        info!("event=sync_close module=sync status=ok reason=normal");
                        return Ok(());
                    }
                    SocketEnd::Abnormal(err) => warn!(
                        "event=sync_close module=sync status=error error={}",
                        err
                    ),
                }
            }
            Err(err) => warn!(
                "event=sync_connect module=sync status=error attempt={} error={}",
                attempt,
                ConnectionError::Connect(err.to_string())
            ),
        }

        let Some(delay) = policy.delay_for(attempt) else {
            return Err(ConnectionError::RetriesExhausted { attempts: attempt });
        };
        attempt += 1;
        info!(
            "event=sync_reconnect module=sync status=start attempt={} delay_ms={}",
            attempt,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
    }
}

async fn pump<S>(
    stream: WebSocketStream<S>,
    inbound: &UnboundedSender<String>,
    outbound: &mut UnboundedReceiver<Packet>,
) -> SocketEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut writer, mut reader) = stream.split();
    loop {
        tokio::select! {
            outgoing = outbound.recv() => match outgoing {
                Some(packet) => {
                    let text = match packet.encode() {
                        Ok(text) => text,
                        Err(err) => {
                            warn!("event=packet_encode module=sync status=error error={}", err);
                            continue;
                        }
                    };
                    if let Err(err) = writer.send(Message::Text(text)).await {
                        return SocketEnd::Abnormal(ConnectionError::Socket(err.to_string()));
                    }
                }
                None => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "session closed".into(),
                    };
                    let _ = writer.send(Message::Close(Some(frame))).await;
                    return SocketEnd::Normal;
                }
            },
            incoming = reader.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if inbound.send(text).is_err() {
                        return SocketEnd::Normal;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return match frame {
                        None => SocketEnd::Normal,
                        Some(frame) if frame.code == CloseCode::Normal => SocketEnd::Normal,
                        Some(frame) => SocketEnd::Abnormal(ConnectionError::Socket(format!(
                            "closed with code {}",
                            u16::from(frame.code)
                        ))),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    return SocketEnd::Abnormal(ConnectionError::Socket(err.to_string()));
                }
                None => {
                    return SocketEnd::Abnormal(ConnectionError::Socket(
                        "stream ended without close frame".to_string(),
                    ));
                }
            },
        }
    }
}
