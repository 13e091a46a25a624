//! [`GatewayServer`] – WebSocket listener and per-connection sessions.
//!
//! Listens on `0.0.0.0:3000` by default.  Every accepted TCP stream is
//! upgraded to a WebSocket and served by its own task:
//!
//! * the greeting is sent before anything is read,
//! * each text frame is validated and executed by the shared
//!   [`ProtocolHandler`]; lid motions run in spawned tasks so a moving lid
//!   never stalls the connection,
//! * a peer that does not finish the upgrade within `handshake_timeout_ms`
//!   is dropped,
//! * the server pings the peer every `ping_interval_ms` and drops it as soon
//!   as `ping_timeout_ms` pass without any inbound frame,
//! * however the session ends (close frame, socket error, keepalive timeout,
//!   server shutdown, even a panic in the session task), the robot is forced
//!   to `STOP`.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{WebSocketStream, accept_async_with_config};
use tracing::{Instrument, debug, error, info, info_span, warn};
use trashbot_types::{BotError, Frame, Reply};
use uuid::Uuid;

use crate::liveness::Liveness;
use crate::protocol::ProtocolHandler;

/// Default TCP port for the control WebSocket.
pub const DEFAULT_PORT: u16 = 3000;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Listener and connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Upper bound for one inbound message and for one frame.
    pub max_message_bytes: usize,
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    /// A TCP peer that has not completed the WebSocket upgrade by then is
    /// dropped.
    pub handshake_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_message_bytes: 16 * 1024 * 1024,
            ping_interval_ms: 12_000,
            ping_timeout_ms: 20_000,
            handshake_timeout_ms: 10_000,
        }
    }
}

impl ServerConfig {
    /// # Errors
    ///
    /// [`BotError::Config`] when `bind_address` is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, BotError> {
        let ip: IpAddr = self.bind_address.parse().map_err(|e| {
            BotError::Config(format!("bind_address '{}': {e}", self.bind_address))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.max(1))
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Builder for the gateway listener.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use trashbot_gateway::{GatewayServer, ProtocolHandler};
/// # async fn demo(handler: Arc<ProtocolHandler>) -> Result<(), trashbot_types::BotError> {
/// let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);
/// GatewayServer::new(handler).with_port(3000).run(stop_rx).await
/// # }
/// ```
pub struct GatewayServer {
    handler: Arc<ProtocolHandler>,
    config: ServerConfig,
}

impl GatewayServer {
    /// A server for `handler` with the default [`ServerConfig`].
    pub fn new(handler: Arc<ProtocolHandler>) -> Self {
        Self {
            handler,
            config: ServerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Bind the TCP listener without accepting yet.
    ///
    /// # Errors
    ///
    /// [`BotError::Config`] for an unparsable bind address,
    /// [`BotError::Transport`] if the port cannot be bound.
    pub async fn bind(self) -> Result<BoundGateway, BotError> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BotError::Transport(format!("bind error on {addr}: {e}")))?;
        Ok(BoundGateway {
            listener,
            handler: self.handler,
            config: self.config,
        })
    }

    /// Bind and serve until `shutdown` flips to `true`.
    ///
    /// # Errors
    ///
    /// See [`GatewayServer::bind`].
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), BotError> {
        self.bind().await?.serve(shutdown).await
    }
}

/// A bound listener, ready to accept.
pub struct BoundGateway {
    listener: TcpListener,
    handler: Arc<ProtocolHandler>,
    config: ServerConfig,
}

impl BoundGateway {
    /// # Errors
    ///
    /// [`BotError::Transport`] if the socket cannot report its address.
    pub fn local_addr(&self) -> Result<SocketAddr, BotError> {
        self.listener
            .local_addr()
            .map_err(|e| BotError::Transport(format!("local_addr: {e}")))
    }

    /// Accept connections until `shutdown` flips to `true` (or its sender is
    /// dropped).  Open sessions are told to close as well.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<(), BotError> {
        info!(addr = %self.local_addr()?, "gateway listening");

        while !*shutdown.borrow() {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_session(stream, peer, shutdown.clone()),
                    Err(e) => error!(error = %e, "accept error"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("gateway stopped accepting connections");
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr, shutdown: watch::Receiver<bool>) {
        let handler = Arc::clone(&self.handler);
        let config = self.config.clone();
        let span = info_span!("session", id = %Uuid::new_v4(), %peer);

        tokio::spawn(
            async move {
                if let Err(e) = handle_connection(stream, peer, handler, config, shutdown).await {
                    warn!(error = %e, "session ended with error");
                }
            }
            .instrument(span),
        );
    }
}

/// Forces `STOP` when the session is torn down, including by unwinding.
struct StopOnDisconnect(Arc<ProtocolHandler>);

impl Drop for StopOnDisconnect {
    fn drop(&mut self) {
        self.0.connection_closed();
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<ProtocolHandler>,
    config: ServerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), BotError> {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_bytes);
    ws_config.max_frame_size = Some(config.max_message_bytes);

    let handshake = accept_async_with_config(stream, Some(ws_config));
    let ws_stream = tokio::time::timeout(config.handshake_timeout(), handshake)
        .await
        .map_err(|_| BotError::Transport(format!("ws handshake from {peer} timed out")))?
        .map_err(|e| BotError::Transport(format!("ws handshake from {peer}: {e}")))?;

    info!("client connected");
    let _stop = StopOnDisconnect(Arc::clone(&handler));

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Reply>();
    send_reply(&mut ws_tx, &Reply::greeting()).await?;

    let mut liveness = Liveness::new(config.ping_timeout());
    let ping_every = config.ping_interval();
    let mut keepalive = tokio::time::interval_at(Instant::now() + ping_every, ping_every);

    let reason = loop {
        tokio::select! {
            Some(reply) = reply_rx.recv() => send_reply(&mut ws_tx, &reply).await?,
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    liveness.touch();
                    let frame = Frame::Text(text.as_str().to_owned());
                    dispatch(&handler, frame, &reply_tx).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    liveness.touch();
                    dispatch(&handler, Frame::Binary, &reply_tx).await;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => liveness.touch(),
                Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => break "closed by peer",
                Some(Err(e)) => {
                    return Err(BotError::Transport(format!("read error from {peer}: {e}")));
                }
            },
            _ = tokio::time::sleep_until(liveness.deadline()) => {
                warn!(silent_ms = liveness.silent_for().as_millis() as u64, "peer stopped answering");
                break "keepalive timeout";
            }
            _ = keepalive.tick() => {
                ws_tx
                    .send(Message::Ping(Default::default()))
                    .await
                    .map_err(|e| BotError::Transport(format!("ping to {peer}: {e}")))?;
            }
            _ = shutdown.changed() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break "server shutdown";
            }
        }
    };

    info!(reason, "client disconnected");
    Ok(())
}

/// Validate `frame` and route the reply to the session's outbound queue.
///
/// Lid motions are spawned so later frames are served while the lid moves;
/// their reply is queued once the motion finishes.
async fn dispatch(
    handler: &Arc<ProtocolHandler>,
    frame: Frame,
    replies: &mpsc::UnboundedSender<Reply>,
) {
    match handler.parse(&frame) {
        Err(e) => {
            debug!(error = %e, "request rejected");
            let _ = replies.send(Reply::error(&e));
        }
        Ok(request) if request.is_lid_motion() => {
            let handler = Arc::clone(handler);
            let replies = replies.clone();
            tokio::spawn(
                async move {
                    let reply = handler.execute(request).await;
                    // The client may be gone by now; the motion still ran.
                    let _ = replies.send(reply);
                }
                .in_current_span(),
            );
        }
        Ok(request) => {
            let _ = replies.send(handler.execute(request).await);
        }
    }
}

async fn send_reply(ws_tx: &mut WsSink, reply: &Reply) -> Result<(), BotError> {
    ws_tx
        .send(Message::Text(reply.to_json().into()))
        .await
        .map_err(|e| BotError::Transport(format!("send error: {e}")))
}
