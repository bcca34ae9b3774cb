//! Connection manager for live client sessions
//!
//! This module issues sessions on connect, routes client requests to the
//! matchmaker and room manager, and releases whatever a session occupies when
//! it disconnects.

use crate::error::{MatchmakingError, MatchmakingResult};
use crate::metrics::MetricsCollector;
use crate::queue::{JoinOutcome, Matchmaker};
use crate::room::RoomManager;
use crate::session::player::{PlayerSession, SessionSender};
use crate::types::{DepartureReason, GameMode, Membership, RoomId, RoomState, ServerEvent, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// Re-reads of a changing membership before disconnect cleanup gives up
const MAX_RELEASE_ATTEMPTS: usize = 8;

/// What a disconnect released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum DisconnectOutcome {
    /// The session was idle
    Idle,
    /// The session was removed from a mode queue
    LeftQueue(GameMode),
    /// The session's room was abandoned
    AbandonedRoom(RoomId),
    /// Cleanup already ran for this session
    AlreadyClosed,
}

/// Statistics about connection manager operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    /// Sessions currently connected
    pub connected: usize,
    /// Total sessions issued
    pub connects_total: u64,
    /// Total sessions cleaned up
    pub disconnects_total: u64,
}

/// The connection manager
#[derive(Clone)]
pub struct ConnectionManager {
    /// Live sessions by ID
    sessions: Arc<RwLock<HashMap<SessionId, Arc<PlayerSession>>>>,
    /// Matchmaker owning the mode queues
    matchmaker: Matchmaker,
    /// Manager statistics
    stats: Arc<RwLock<ConnectionStats>>,
    /// Metrics collector for connection data
    metrics: Arc<MetricsCollector>,
}

impl ConnectionManager {
    pub fn new(matchmaker: Matchmaker, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            matchmaker,
            stats: Arc::new(RwLock::new(ConnectionStats::default())),
            metrics,
        }
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    pub fn rooms(&self) -> &RoomManager {
        self.matchmaker.rooms()
    }

    /// Issue a fresh idle session; the returned handle owns its cleanup
    pub fn connect(
        &self,
        identity: Option<String>,
        sender: Arc<dyn SessionSender>,
    ) -> MatchmakingResult<SessionHandle> {
        let session = Arc::new(PlayerSession::new(identity, sender));
        let session_id = session.id();

        {
            let mut sessions = self
                .sessions
                .write()
                .map_err(|_| MatchmakingError::internal("Failed to acquire sessions lock"))?;
            sessions.insert(session_id, session.clone());
        }
        {
            let mut stats = self
                .stats
                .write()
                .map_err(|_| MatchmakingError::internal("Failed to acquire connection stats lock"))?;
            stats.connects_total += 1;
        }
        self.metrics.record_connection_opened();

        session.send(ServerEvent::Connected { session_id });
        info!(
            "Session {} connected - identity: {}",
            session_id,
            session.identity().unwrap_or("anonymous")
        );

        Ok(SessionHandle {
            session_id,
            manager: self.clone(),
            disposed: false,
        })
    }

    /// Tear down a session and release its queue or room membership
    pub fn disconnect(&self, session_id: SessionId) -> MatchmakingResult<DisconnectOutcome> {
        self.close_session(session_id, DepartureReason::Disconnect)
    }

    /// Disconnect every live session; returns how many were closed
    pub fn shutdown(&self) -> MatchmakingResult<usize> {
        let session_ids = self.session_ids()?;
        let mut closed = 0;

        for session_id in session_ids {
            match self.close_session(session_id, DepartureReason::Shutdown) {
                Ok(DisconnectOutcome::AlreadyClosed) => {}
                Ok(_) => closed += 1,
                Err(e) => error!("Failed to close session {} on shutdown: {}", session_id, e),
            }
        }

        info!("Closed {} sessions on shutdown", closed);
        Ok(closed)
    }

    pub fn session(&self, session_id: SessionId) -> MatchmakingResult<Arc<PlayerSession>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| MatchmakingError::internal("Failed to acquire sessions lock"))?;
        sessions
            .get(&session_id)
            .cloned()
            .ok_or(MatchmakingError::SessionNotFound { session_id })
    }

    pub fn membership(&self, session_id: SessionId) -> MatchmakingResult<Membership> {
        Ok(self.session(session_id)?.membership())
    }

    pub fn session_ids(&self) -> MatchmakingResult<Vec<SessionId>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| MatchmakingError::internal("Failed to acquire sessions lock"))?;
        Ok(sessions.keys().copied().collect())
    }

    pub fn connected_count(&self) -> MatchmakingResult<usize> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| MatchmakingError::internal("Failed to acquire sessions lock"))?;
        Ok(sessions.len())
    }

    pub fn stats(&self) -> MatchmakingResult<ConnectionStats> {
        let mut stats = self
            .stats
            .read()
            .map_err(|_| MatchmakingError::internal("Failed to acquire connection stats lock"))?
            .clone();
        stats.connected = self.connected_count()?;
        Ok(stats)
    }

    pub fn join_queue(
        &self,
        session_id: SessionId,
        mode: GameMode,
    ) -> MatchmakingResult<JoinOutcome> {
        let session = self.session(session_id)?;
        self.matchmaker.enqueue(&session, mode)
    }

    /// Leave a mode queue and acknowledge with `leftQueue`
    pub fn leave_queue(&self, session_id: SessionId, mode: GameMode) -> MatchmakingResult<()> {
        let session = self.session(session_id)?;
        self.matchmaker.leave(&session, mode)?;
        session.send(ServerEvent::LeftQueue { mode });
        Ok(())
    }

    pub fn acknowledge_ready(
        &self,
        session_id: SessionId,
        room_id: RoomId,
    ) -> MatchmakingResult<RoomState> {
        let session = self.session(session_id)?;
        self.rooms().acknowledge_ready(session.id(), room_id)
    }

    pub fn send_room_message(
        &self,
        session_id: SessionId,
        room_id: RoomId,
        payload: serde_json::Value,
    ) -> MatchmakingResult<usize> {
        let session = self.session(session_id)?;
        self.rooms().relay(session.id(), room_id, payload)
    }

    /// Explicitly leave a room, abandoning it for the other occupants
    pub fn leave_room(&self, session_id: SessionId, room_id: RoomId) -> MatchmakingResult<()> {
        let session = self.session(session_id)?;
        self.rooms()
            .depart(session.id(), room_id, DepartureReason::Left)
    }

    fn close_session(
        &self,
        session_id: SessionId,
        reason: DepartureReason,
    ) -> MatchmakingResult<DisconnectOutcome> {
        let removed = {
            let mut sessions = self
                .sessions
                .write()
                .map_err(|_| MatchmakingError::internal("Failed to acquire sessions lock"))?;
            sessions.remove(&session_id)
        };

        let Some(session) = removed else {
            debug!("Session {} already closed", session_id);
            return Ok(DisconnectOutcome::AlreadyClosed);
        };
        if !session.mark_closed() {
            return Ok(DisconnectOutcome::AlreadyClosed);
        }

        {
            let mut stats = self
                .stats
                .write()
                .map_err(|_| MatchmakingError::internal("Failed to acquire connection stats lock"))?;
            stats.disconnects_total += 1;
        }
        self.metrics.record_connection_closed();

        let outcome = self.release_membership(&session, reason)?;
        info!(
            "Session {} disconnected - released: {:?}",
            session_id, outcome
        );
        Ok(outcome)
    }

    /// Release a closed session's membership
    ///
    /// Each attempt acts on a fresh membership read. A queue leave that finds
    /// the session already matched, or a room departure that finds the room
    /// already ended, re-reads and follows the session to its new state.
    fn release_membership(
        &self,
        session: &PlayerSession,
        reason: DepartureReason,
    ) -> MatchmakingResult<DisconnectOutcome> {
        for _ in 0..MAX_RELEASE_ATTEMPTS {
            match session.membership() {
                Membership::None => return Ok(DisconnectOutcome::Idle),
                Membership::Queued(mode) => match self.matchmaker.leave(session, mode) {
                    Ok(()) => return Ok(DisconnectOutcome::LeftQueue(mode)),
                    Err(MatchmakingError::NotQueued { .. }) => {
                        debug!("Session {} left queue {} mid-match", session.id(), mode);
                    }
                    Err(e) => return Err(e),
                },
                Membership::InRoom(room_id) => {
                    match self.rooms().depart(session.id(), room_id, reason) {
                        Ok(()) => return Ok(DisconnectOutcome::AbandonedRoom(room_id)),
                        Err(MatchmakingError::RoomNotFound { .. })
                        | Err(MatchmakingError::NotInRoom { .. }) => {
                            debug!("Room {} ended before session {} departed", room_id, session.id());
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        warn!(
            "Session {} membership kept changing during cleanup",
            session.id()
        );
        Err(MatchmakingError::internal(format!(
            "Could not release membership of session {}",
            session.id()
        )))
    }
}

/// Subscription returned by [`ConnectionManager::connect`]
///
/// Disposing the handle, explicitly or by dropping it, runs disconnect
/// cleanup exactly once.
pub struct SessionHandle {
    session_id: SessionId,
    manager: ConnectionManager,
    disposed: bool,
}

impl SessionHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Disconnect now and report what was released
    pub fn dispose(mut self) -> MatchmakingResult<DisconnectOutcome> {
        self.disposed = true;
        self.manager.disconnect(self.session_id)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        if let Err(e) = self.manager.disconnect(self.session_id) {
            error!("Cleanup of session {} failed: {}", self.session_id, e);
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("disposed", &self.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::StaticModeProvider;
    use crate::session::testing::RecordingSender;
    use serde_json::json;

    fn manager() -> ConnectionManager {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let matchmaker = Matchmaker::new(
            Arc::new(StaticModeProvider::new()),
            RoomManager::new(metrics.clone()),
            metrics.clone(),
        )
        .unwrap();
        ConnectionManager::new(matchmaker, metrics)
    }

    fn connect(manager: &ConnectionManager) -> (SessionHandle, Arc<RecordingSender>) {
        let sender = RecordingSender::new();
        let handle = manager.connect(None, sender.clone()).unwrap();
        (handle, sender)
    }

    #[test]
    fn test_connect_issues_idle_session() {
        let manager = manager();
        let (handle, sender) = connect(&manager);

        assert_eq!(
            manager.membership(handle.session_id()).unwrap(),
            Membership::None
        );
        assert_eq!(
            sender.events(),
            vec![ServerEvent::Connected {
                session_id: handle.session_id()
            }]
        );
        assert_eq!(manager.connected_count().unwrap(), 1);
    }

    #[test]
    fn test_dispose_runs_cleanup_once() {
        let manager = manager();
        let (handle, _) = connect(&manager);
        let session_id = handle.session_id();
        manager.join_queue(session_id, GameMode::new(0)).unwrap();

        assert_eq!(
            handle.dispose().unwrap(),
            DisconnectOutcome::LeftQueue(GameMode::new(0))
        );
        assert_eq!(
            manager.disconnect(session_id).unwrap(),
            DisconnectOutcome::AlreadyClosed
        );
        assert_eq!(manager.matchmaker().queue_len(GameMode::new(0)).unwrap(), 0);

        let stats = manager.stats().unwrap();
        assert_eq!(stats.connects_total, 1);
        assert_eq!(stats.disconnects_total, 1);
        assert_eq!(stats.connected, 0);
    }

    #[test]
    fn test_drop_disconnects_and_abandons_room() {
        let manager = manager();
        let (a, _) = connect(&manager);
        let (b, b_events) = connect(&manager);
        let mode = GameMode::new(0);

        manager.join_queue(a.session_id(), mode).unwrap();
        let room_id = manager.join_queue(b.session_id(), mode).unwrap().rooms_created[0];

        drop(a);

        assert_eq!(
            b_events.count(|e| matches!(
                e,
                ServerEvent::Abandoned { room_id: r, reason: DepartureReason::Disconnect } if *r == room_id
            )),
            1
        );
        assert_eq!(manager.membership(b.session_id()).unwrap(), Membership::None);
        assert!(!manager.rooms().registry().contains(room_id).unwrap());
    }

    #[test]
    fn test_requests_on_closed_session_fail() {
        let manager = manager();
        let (handle, _) = connect(&manager);
        let session_id = handle.session_id();
        handle.dispose().unwrap();

        let error = manager.join_queue(session_id, GameMode::new(0)).unwrap_err();
        assert_eq!(error, MatchmakingError::SessionNotFound { session_id });
        assert_eq!(error.code(), crate::types::ErrorCode::SessionClosed);
    }

    #[test]
    fn test_room_routing() {
        let manager = manager();
        let (a, a_events) = connect(&manager);
        let (b, b_events) = connect(&manager);
        let (c, _) = connect(&manager);
        let mode = GameMode::new(2);

        manager.join_queue(a.session_id(), mode).unwrap();
        let room_id = manager.join_queue(b.session_id(), mode).unwrap().rooms_created[0];

        assert_eq!(
            manager
                .send_room_message(a.session_id(), room_id, json!({"hello": true}))
                .unwrap(),
            1
        );
        assert_eq!(
            b_events.count(|e| matches!(e, ServerEvent::RoomMessage { from, .. } if *from == a.session_id())),
            1
        );
        assert!(matches!(
            manager.send_room_message(c.session_id(), room_id, json!(1)),
            Err(MatchmakingError::NotInRoom { .. })
        ));

        manager.leave_room(b.session_id(), room_id).unwrap();
        assert_eq!(
            a_events.count(|e| matches!(e, ServerEvent::Abandoned { reason: DepartureReason::Left, .. })),
            1
        );
        assert_eq!(
            manager.send_room_message(a.session_id(), room_id, json!(1)),
            Err(MatchmakingError::RoomNotFound { room_id })
        );
    }

    #[test]
    fn test_leave_queue_acknowledges() {
        let manager = manager();
        let (a, a_events) = connect(&manager);
        let mode = GameMode::new(1);

        manager.join_queue(a.session_id(), mode).unwrap();
        manager.leave_queue(a.session_id(), mode).unwrap();

        assert_eq!(
            a_events.events().last(),
            Some(&ServerEvent::LeftQueue { mode })
        );
        assert!(matches!(
            manager.leave_queue(a.session_id(), mode),
            Err(MatchmakingError::NotQueued { .. })
        ));
    }

    #[test]
    fn test_shutdown_closes_everything() {
        let manager = manager();
        let (a, a_events) = connect(&manager);
        let (b, _) = connect(&manager);
        let (c, _) = connect(&manager);
        let mode = GameMode::new(0);

        manager.join_queue(a.session_id(), mode).unwrap();
        manager.join_queue(b.session_id(), mode).unwrap();
        manager.join_queue(c.session_id(), mode).unwrap();

        assert_eq!(manager.shutdown().unwrap(), 3);
        assert_eq!(manager.connected_count().unwrap(), 0);
        assert_eq!(manager.matchmaker().queue_len(mode).unwrap(), 0);
        assert!(manager.rooms().registry().is_empty().unwrap());

        let abandoned_on_shutdown = a_events.count(|e| {
            matches!(e, ServerEvent::Abandoned { reason: DepartureReason::Shutdown, .. })
        });
        assert!(abandoned_on_shutdown <= 1);

        drop((a, b, c));
        assert_eq!(manager.stats().unwrap().disconnects_total, 3);
    }
}
