//! WebSocket gateway server
//!
//! Each accepted socket becomes one session. The socket task forwards queued
//! server events to the client, feeds client frames to the message handler and
//! disposes the session when the socket closes.

use crate::config::GatewaySettings;
use crate::error::MatchmakingError;
use crate::gateway::handlers::MessageHandler;
use crate::gateway::messages::{MessageUtils, GATEWAY_PATH};
use crate::session::{ChannelSender, ConnectionManager};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Gateway server configuration
#[derive(Debug, Clone)]
pub struct GatewayServerConfig {
    pub host: String,
    pub port: u16,
    /// Sockets accepted concurrently before new upgrades get 503
    pub max_connections: usize,
    /// Largest client message handed to the message handler
    pub max_message_bytes: usize,
    /// Transport frame limit; must not be below `max_message_bytes`
    pub max_frame_bytes: usize,
}

impl Default for GatewayServerConfig {
    fn default() -> Self {
        Self::from(&GatewaySettings::default())
    }
}

impl From<&GatewaySettings> for GatewayServerConfig {
    fn from(settings: &GatewaySettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_connections: settings.max_connections,
            max_message_bytes: settings.max_message_bytes,
            max_frame_bytes: settings.max_frame_bytes.max(settings.max_message_bytes),
        }
    }
}

/// Query parameters accepted on upgrade
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Optional opaque client identity
    pub identity: Option<String>,
}

/// Shared state for socket tasks
#[derive(Clone)]
struct GatewayState {
    connections: ConnectionManager,
    handler: Arc<dyn MessageHandler>,
    active: Arc<AtomicUsize>,
    max_connections: usize,
    max_message_bytes: usize,
    max_frame_bytes: usize,
    shutdown_tx: broadcast::Sender<()>,
}

/// Slot in the connection cap, released on drop
struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        let previous = active.fetch_add(1, Ordering::SeqCst);
        if previous >= max {
            active.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(Self {
            active: active.clone(),
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Server accepting client WebSocket connections
pub struct GatewayServer {
    config: GatewayServerConfig,
    state: GatewayState,
    shutdown_tx: broadcast::Sender<()>,
}

impl GatewayServer {
    pub fn new(
        config: GatewayServerConfig,
        connections: ConnectionManager,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            state: GatewayState {
                connections,
                handler,
                active: Arc::new(AtomicUsize::new(0)),
                max_connections: config.max_connections,
                max_message_bytes: config.max_message_bytes,
                max_frame_bytes: config.max_frame_bytes,
                shutdown_tx: shutdown_tx.clone(),
            },
            config,
            shutdown_tx,
        }
    }

    /// Sockets currently open
    pub fn active_connections(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Bind the gateway listener
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid gateway address")?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind gateway to {}", addr))?;
        info!("Gateway listening on ws://{}{}", addr, GATEWAY_PATH);
        Ok(listener)
    }

    /// Serve a bound listener until [`GatewayServer::stop`] is called
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let app = self.create_router();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Gateway shutdown signal received");
            })
            .await?;

        info!("Gateway stopped");
        Ok(())
    }

    fn create_router(&self) -> Router {
        Router::new()
            .route(GATEWAY_PATH, get(upgrade_handler))
            .with_state(self.state.clone())
    }

    /// Stop accepting sockets and close the open ones
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping gateway...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to gateway: {}", e);
        }
        Ok(())
    }
}

async fn upgrade_handler(
    State(state): State<GatewayState>,
    Query(params): Query<ConnectParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(slot) = ConnectionSlot::acquire(&state.active, state.max_connections) else {
        warn!(
            "Rejecting connection - limit of {} reached",
            state.max_connections
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Connection limit reached").into_response();
    };

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    // Frames between the two limits reach the handler and get `invalidMessage`
    upgrade
        .max_message_size(state.max_frame_bytes)
        .max_frame_size(state.max_frame_bytes)
        .on_upgrade(move |socket| async move {
            run_session(socket, state, params.identity).await;
            drop(slot);
        })
}

/// Frame transport a session loop runs over
#[async_trait]
trait FrameSocket: Send {
    async fn recv_frame(&mut self) -> Option<Result<Message, axum::Error>>;

    async fn send_frame(&mut self, message: Message) -> Result<(), axum::Error>;
}

#[async_trait]
impl FrameSocket for WebSocket {
    async fn recv_frame(&mut self) -> Option<Result<Message, axum::Error>> {
        self.recv().await
    }

    async fn send_frame(&mut self, message: Message) -> Result<(), axum::Error> {
        self.send(message).await
    }
}

async fn run_session<S: FrameSocket>(mut socket: S, state: GatewayState, identity: Option<String>) {
    let (sender, mut rx) = ChannelSender::channel();
    let handle = match state.connections.connect(identity, Arc::new(sender)) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to register session: {}", e);
            let _ = socket.send_frame(Message::Close(None)).await;
            return;
        }
    };
    let session_id = handle.session_id();
    let mut shutdown_rx = state.shutdown_tx.subscribe();

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                let text = match MessageUtils::encode_event(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Dropping event for session {}: {}", session_id, e);
                        continue;
                    }
                };
                if socket.send_frame(Message::Text(text.into())).await.is_err() {
                    debug!("Socket for session {} stopped accepting frames", session_id);
                    break;
                }
            }
            maybe_msg = socket.recv_frame() => {
                match maybe_msg {
                    Some(Ok(Message::Text(text))) => {
                        state
                            .handler
                            .handle_frame(session_id, text.as_str(), state.max_message_bytes)
                            .await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let error = MatchmakingError::InvalidMessage {
                            reason: "Binary frames are not supported".to_string(),
                        };
                        state.handler.handle_error(session_id, error).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("Socket error for session {}: {}", session_id, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            _ = shutdown_rx.recv() => {
                let _ = socket.send_frame(Message::Close(None)).await;
                break;
            }
        }
    }

    match handle.dispose() {
        Ok(outcome) => debug!("Socket for session {} closed - released: {:?}", session_id, outcome),
        Err(e) => error!("Cleanup of session {} failed: {}", session_id, e),
    }
}
