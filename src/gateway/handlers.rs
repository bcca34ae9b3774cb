//! Client request handlers for the WebSocket gateway
//!
//! Decoded frames are dispatched to the connection manager. Every failure is
//! answered with an `error` event on the originating session only.

use crate::error::{MatchmakingError, MatchmakingResult};
use crate::gateway::messages::MessageUtils;
use crate::metrics::MetricsCollector;
use crate::session::ConnectionManager;
use crate::types::{ClientRequest, ServerEvent, SessionId};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Trait defining the interface for handling client requests
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a decoded request from a session
    async fn handle_request(&self, session_id: SessionId, request: ClientRequest)
        -> MatchmakingResult<()>;

    /// Handle a failed or undecodable request
    async fn handle_error(&self, session_id: SessionId, error: MatchmakingError);

    /// Decode a text frame and dispatch it
    async fn handle_frame(&self, session_id: SessionId, text: &str, max_bytes: usize) {
        match MessageUtils::parse_request(text, max_bytes) {
            Ok(request) => {
                if let Err(e) = self.handle_request(session_id, request).await {
                    self.handle_error(session_id, e).await;
                }
            }
            Err(e) => self.handle_error(session_id, e).await,
        }
    }
}

/// Handler routing requests into the matchmaking core
pub struct CoreMessageHandler {
    connections: ConnectionManager,
    metrics: Arc<MetricsCollector>,
}

impl CoreMessageHandler {
    pub fn new(connections: ConnectionManager, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            connections,
            metrics,
        }
    }

    fn dispatch(&self, session_id: SessionId, request: ClientRequest) -> MatchmakingResult<()> {
        match request {
            ClientRequest::JoinQueue { mode } => {
                let outcome = self.connections.join_queue(session_id, mode)?;
                if !outcome.rooms_created.is_empty() {
                    info!(
                        "Join by session {} completed {} room(s) in mode {}",
                        session_id,
                        outcome.rooms_created.len(),
                        mode
                    );
                }
            }
            ClientRequest::LeaveQueue { mode } => {
                self.connections.leave_queue(session_id, mode)?;
            }
            ClientRequest::Ready { room_id } => {
                let state = self.connections.acknowledge_ready(session_id, room_id)?;
                debug!("Session {} ready in room {} - state: {}", session_id, room_id, state);
            }
            ClientRequest::RoomMessage { room_id, payload } => {
                self.connections
                    .send_room_message(session_id, room_id, payload)?;
            }
            ClientRequest::LeaveRoom { room_id } => {
                self.connections.leave_room(session_id, room_id)?;
            }
            ClientRequest::Ping => {
                self.connections.session(session_id)?.send(ServerEvent::Pong);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for CoreMessageHandler {
    async fn handle_request(
        &self,
        session_id: SessionId,
        request: ClientRequest,
    ) -> MatchmakingResult<()> {
        let event = request.event_name();
        let timer = self.metrics.start_timer();

        let result = self.dispatch(session_id, request);
        self.metrics
            .record_client_message(event, result.is_ok(), timer.stop());
        result
    }

    async fn handle_error(&self, session_id: SessionId, error: MatchmakingError) {
        if error.is_client_error() {
            debug!("Request from session {} rejected: {}", session_id, error);
        } else {
            warn!("Request from session {} failed: {}", session_id, error);
        }

        match self.connections.session(session_id) {
            Ok(session) => {
                session.send(ServerEvent::error(&error));
            }
            Err(_) => debug!("Dropping error for closed session {}", session_id),
        }
    }
}
