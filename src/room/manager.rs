//! Room manager: creation, transitions and retirement of game rooms
//!
//! This module owns the room registry and is the only component that changes
//! a room's state. Terminal rooms are removed from the registry and reported
//! to the gameplay [`RoomHook`] after every lock has been released.

use crate::config::ModeConfig;
use crate::error::{MatchmakingError, MatchmakingResult};
use crate::metrics::MetricsCollector;
use crate::room::instance::{GameRoom, RoomSnapshot};
use crate::room::registry::{RoomRegistry, SharedRoom};
use crate::session::PlayerSession;
use crate::types::{DepartureReason, GameMode, RoomId, RoomOutcome, RoomState, SessionId};
use crate::utils::generate_room_id;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default number of id draws before room creation is aborted
pub const DEFAULT_MAX_ID_ATTEMPTS: u32 = 8;

/// Source of candidate room identifiers
pub trait RoomIdSource: Send + Sync {
    /// Next candidate id, or `None` if the source failed to produce one
    fn next_id(&self) -> Option<RoomId>;
}

/// Random UUID v4 room ids
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRoomIds;

impl RoomIdSource for UuidRoomIds {
    fn next_id(&self) -> Option<RoomId> {
        Some(generate_room_id())
    }
}

/// Gameplay collaborator notified about room lifecycle
///
/// Hooks run on the caller's thread outside every matchmaking lock and must
/// not block; spawn a task for anything slow.
pub trait RoomHook: Send + Sync {
    /// The room became active; `completion` ends it normally
    fn on_room_active(&self, room: RoomSnapshot, completion: CompletionHandle);

    /// The room reached a terminal state and left the registry
    fn on_room_closed(&self, _room_id: RoomId, _outcome: RoomOutcome) {}
}

/// Hook that leaves every room running until an occupant departs
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRoomHook;

impl RoomHook for NoopRoomHook {
    fn on_room_active(&self, room: RoomSnapshot, _completion: CompletionHandle) {
        debug!("Room {} active with no gameplay hook", room.room_id);
    }
}

/// Single-use completion callback for one room
pub struct CompletionHandle {
    room_id: RoomId,
    manager: Weak<RoomManagerInner>,
}

impl CompletionHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Signal the normal end of the game: Active → Completed
    ///
    /// Fails with `RoomNotFound` if the room already ended or the manager is gone.
    pub fn complete(self) -> MatchmakingResult<()> {
        let inner = self
            .manager
            .upgrade()
            .ok_or(MatchmakingError::RoomNotFound {
                room_id: self.room_id,
            })?;
        RoomManager { inner }.complete(self.room_id)
    }
}

impl std::fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("room_id", &self.room_id)
            .finish()
    }
}

/// Statistics about room manager operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomStats {
    /// Rooms currently registered
    pub active_rooms: usize,
    /// Total rooms created
    pub rooms_created: u64,
    /// Rooms that ended normally
    pub rooms_completed: u64,
    /// Rooms ended by a departure
    pub rooms_abandoned: u64,
}

/// A room freshly created under a queue lock
#[derive(Debug, Clone)]
pub struct CreatedRoom {
    pub room_id: RoomId,
    /// Set when the room went straight to `Active`; pass to [`RoomManager::notify_active`]
    pub activated: Option<RoomSnapshot>,
}

struct RoomManagerInner {
    registry: Arc<RoomRegistry>,
    id_source: Arc<dyn RoomIdSource>,
    hook: Arc<dyn RoomHook>,
    max_id_attempts: u32,
    stats: RwLock<RoomStats>,
    metrics: Arc<MetricsCollector>,
}

/// The room manager
#[derive(Clone)]
pub struct RoomManager {
    inner: Arc<RoomManagerInner>,
}

impl RoomManager {
    /// Create a room manager with UUID ids and no gameplay hook
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self::with_options(
            Arc::new(UuidRoomIds),
            Arc::new(NoopRoomHook),
            DEFAULT_MAX_ID_ATTEMPTS,
            metrics,
        )
    }

    /// Create with a custom id source, hook and id attempt budget
    pub fn with_options(
        id_source: Arc<dyn RoomIdSource>,
        hook: Arc<dyn RoomHook>,
        max_id_attempts: u32,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            inner: Arc::new(RoomManagerInner {
                registry: Arc::new(RoomRegistry::new()),
                id_source,
                hook,
                max_id_attempts: max_id_attempts.max(1),
                stats: RwLock::new(RoomStats::default()),
                metrics,
            }),
        }
    }

    pub fn registry(&self) -> Arc<RoomRegistry> {
        self.inner.registry.clone()
    }

    /// Create, register and announce a room for a popped group
    ///
    /// Must be called with the mode queue locked. On error nothing has been
    /// registered and no membership has changed.
    pub(crate) fn create_room(
        &self,
        config: &ModeConfig,
        occupants: Vec<Arc<PlayerSession>>,
    ) -> MatchmakingResult<CreatedRoom> {
        let registry = &self.inner.registry;

        for attempt in 1..=self.inner.max_id_attempts {
            let Some(room_id) = self.inner.id_source.next_id() else {
                warn!(
                    "Room id source failed for mode {} (attempt {}/{})",
                    config.mode, attempt, self.inner.max_id_attempts
                );
                continue;
            };

            if registry.contains(room_id)? {
                warn!("Room id collision on {} (attempt {})", room_id, attempt);
                continue;
            }

            let shared: SharedRoom = Arc::new(Mutex::new(GameRoom::new(
                room_id,
                config,
                occupants.clone(),
            )));
            let mut room = lock_room(&shared)?;

            if !registry.register(room_id, shared.clone())? {
                warn!("Room id {} taken during registration", room_id);
                continue;
            }

            if let Err(e) = room.admit_occupants() {
                drop(room);
                registry.remove(room_id)?;
                return Err(e);
            }

            let activated = if room.requires_ready() {
                None
            } else {
                room.activate()?;
                Some(room.snapshot())
            };
            drop(room);

            {
                let mut stats = self.lock_stats()?;
                stats.rooms_created += 1;
            }
            self.inner.metrics.record_room_created(config.mode);

            info!(
                "Created room {} - mode: {}, occupants: {:?}",
                room_id,
                config.mode,
                occupants.iter().map(|s| s.id()).collect::<Vec<_>>()
            );
            return Ok(CreatedRoom { room_id, activated });
        }

        Err(MatchmakingError::IdGenerationExhausted {
            attempts: self.inner.max_id_attempts,
        })
    }

    /// Hand an active room to the gameplay hook; call with no locks held
    pub fn notify_active(&self, room: RoomSnapshot) {
        let completion = CompletionHandle {
            room_id: room.room_id,
            manager: Arc::downgrade(&self.inner),
        };
        self.inner.hook.on_room_active(room, completion);
    }

    /// Record a ready-up; activates the room once everyone is ready
    pub fn acknowledge_ready(
        &self,
        session_id: SessionId,
        room_id: RoomId,
    ) -> MatchmakingResult<RoomState> {
        let shared = self.inner.registry.lookup(room_id)?;

        let activated = {
            let mut room = lock_room(&shared)?;
            if room.acknowledge_ready(session_id)? {
                room.activate()?;
                Some(room.snapshot())
            } else {
                None
            }
        };

        match activated {
            Some(snapshot) => {
                self.notify_active(snapshot);
                Ok(RoomState::Active)
            }
            None => Ok(RoomState::Forming),
        }
    }

    /// Relay an opaque payload from one occupant to the others
    pub fn relay(
        &self,
        session_id: SessionId,
        room_id: RoomId,
        payload: serde_json::Value,
    ) -> MatchmakingResult<usize> {
        let shared = self.inner.registry.lookup(room_id)?;
        let (mode, delivered) = {
            let room = lock_room(&shared)?;
            (room.mode(), room.relay(session_id, payload)?)
        };

        self.inner.metrics.record_room_message(mode);
        Ok(delivered)
    }

    /// An occupant left or disconnected: abandon the room
    pub fn depart(
        &self,
        session_id: SessionId,
        room_id: RoomId,
        reason: DepartureReason,
    ) -> MatchmakingResult<()> {
        let shared = self.inner.registry.lookup(room_id)?;
        let (mode, lifetime) = {
            let mut room = lock_room(&shared)?;
            room.handle_departure(session_id, reason)?;
            (room.mode(), room.lifetime())
        };

        self.retire(room_id, mode, lifetime, RoomOutcome::Abandoned(reason))
    }

    /// Complete an active room
    pub fn complete(&self, room_id: RoomId) -> MatchmakingResult<()> {
        let shared = self.inner.registry.lookup(room_id)?;
        let (mode, lifetime) = {
            let mut room = lock_room(&shared)?;
            room.complete()?;
            (room.mode(), room.lifetime())
        };

        self.retire(room_id, mode, lifetime, RoomOutcome::Completed)
    }

    pub fn snapshot(&self, room_id: RoomId) -> MatchmakingResult<RoomSnapshot> {
        let shared = self.inner.registry.lookup(room_id)?;
        let room = lock_room(&shared)?;
        Ok(room.snapshot())
    }

    pub fn stats(&self) -> MatchmakingResult<RoomStats> {
        let mut stats = self
            .inner
            .stats
            .read()
            .map_err(|_| MatchmakingError::internal("Failed to acquire room stats lock"))?
            .clone();
        stats.active_rooms = self.inner.registry.len()?;
        Ok(stats)
    }

    /// Remove a terminal room and report it
    fn retire(
        &self,
        room_id: RoomId,
        mode: GameMode,
        lifetime: Duration,
        outcome: RoomOutcome,
    ) -> MatchmakingResult<()> {
        self.inner.registry.remove(room_id)?;

        {
            let mut stats = self.lock_stats()?;
            match outcome {
                RoomOutcome::Completed => stats.rooms_completed += 1,
                RoomOutcome::Abandoned(_) => stats.rooms_abandoned += 1,
            }
        }
        self.inner
            .metrics
            .record_room_closed(mode, outcome, lifetime);

        debug!("Room {} retired ({})", room_id, outcome.label());
        self.inner.hook.on_room_closed(room_id, outcome);
        Ok(())
    }

    fn lock_stats(&self) -> MatchmakingResult<std::sync::RwLockWriteGuard<'_, RoomStats>> {
        self.inner
            .stats
            .write()
            .map_err(|_| MatchmakingError::internal("Failed to acquire room stats lock"))
    }
}

fn lock_room(room: &SharedRoom) -> MatchmakingResult<MutexGuard<'_, GameRoom>> {
    room.lock()
        .map_err(|_| MatchmakingError::internal("Failed to acquire room lock"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{recording_session, RecordingSender};
    use crate::types::{Membership, ServerEvent};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hook that keeps completion handles for the test to fire
    #[derive(Default)]
    struct CapturingHook {
        handles: Mutex<Vec<CompletionHandle>>,
        closed: Mutex<Vec<(RoomId, RoomOutcome)>>,
    }

    impl RoomHook for CapturingHook {
        fn on_room_active(&self, _room: RoomSnapshot, completion: CompletionHandle) {
            self.handles.lock().unwrap().push(completion);
        }

        fn on_room_closed(&self, room_id: RoomId, outcome: RoomOutcome) {
            self.closed.lock().unwrap().push((room_id, outcome));
        }
    }

    /// Fails a fixed number of draws, then falls back to UUIDs
    struct FlakyIds {
        failures: AtomicUsize,
    }

    impl RoomIdSource for FlakyIds {
        fn next_id(&self) -> Option<RoomId> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                None
            } else {
                Some(generate_room_id())
            }
        }
    }

    fn metrics() -> Arc<MetricsCollector> {
        Arc::new(MetricsCollector::new().unwrap())
    }

    fn queued_pair(
        mode: GameMode,
    ) -> (Vec<Arc<PlayerSession>>, Vec<Arc<RecordingSender>>) {
        let (sessions, senders): (Vec<_>, Vec<_>) = (0..2).map(|_| recording_session()).unzip();
        for session in &sessions {
            *session.lock_membership() = Membership::Queued(mode);
        }
        (sessions, senders)
    }

    #[test]
    fn test_create_room_without_ready_up_activates() {
        let manager = RoomManager::new(metrics());
        let config = ModeConfig::duel(0);
        let (sessions, senders) = queued_pair(config.mode);

        let created = manager.create_room(&config, sessions.clone()).unwrap();
        let snapshot = created.activated.unwrap();

        assert_eq!(snapshot.state, RoomState::Active);
        assert!(manager.registry().contains(created.room_id).unwrap());
        assert!(sessions
            .iter()
            .all(|s| s.membership() == Membership::InRoom(created.room_id)));
        assert!(senders.iter().all(|s| {
            s.events()
                == vec![
                    ServerEvent::Matched {
                        room_id: created.room_id,
                        mode: config.mode,
                        occupants: snapshot.occupants.clone(),
                    },
                    ServerEvent::RoomStarted {
                        room_id: created.room_id,
                    },
                ]
        }));
    }

    #[test]
    fn test_id_exhaustion_leaves_state_untouched() {
        let manager = RoomManager::with_options(
            Arc::new(FlakyIds {
                failures: AtomicUsize::new(usize::MAX),
            }),
            Arc::new(NoopRoomHook),
            3,
            metrics(),
        );
        let config = ModeConfig::duel(0);
        let (sessions, senders) = queued_pair(config.mode);

        assert_eq!(
            manager.create_room(&config, sessions.clone()).unwrap_err(),
            MatchmakingError::IdGenerationExhausted { attempts: 3 }
        );
        assert!(manager.registry().is_empty().unwrap());
        assert!(sessions
            .iter()
            .all(|s| s.membership() == Membership::Queued(config.mode)));
        assert!(senders.iter().all(|s| s.events().is_empty()));
    }

    #[test]
    fn test_id_source_retries_within_budget() {
        let manager = RoomManager::with_options(
            Arc::new(FlakyIds {
                failures: AtomicUsize::new(2),
            }),
            Arc::new(NoopRoomHook),
            3,
            metrics(),
        );
        let config = ModeConfig::duel(0);
        let (sessions, _) = queued_pair(config.mode);

        assert!(manager.create_room(&config, sessions).is_ok());
        assert_eq!(manager.stats().unwrap().rooms_created, 1);
    }

    #[test]
    fn test_ready_up_flow_notifies_hook() {
        let hook = Arc::new(CapturingHook::default());
        let manager = RoomManager::with_options(
            Arc::new(UuidRoomIds),
            hook.clone(),
            DEFAULT_MAX_ID_ATTEMPTS,
            metrics(),
        );
        let mut config = ModeConfig::duel(1);
        config.require_ready = true;
        let (sessions, _) = queued_pair(config.mode);

        let created = manager.create_room(&config, sessions.clone()).unwrap();
        assert!(created.activated.is_none());

        assert_eq!(
            manager
                .acknowledge_ready(sessions[0].id(), created.room_id)
                .unwrap(),
            RoomState::Forming
        );
        assert!(hook.handles.lock().unwrap().is_empty());

        assert_eq!(
            manager
                .acknowledge_ready(sessions[1].id(), created.room_id)
                .unwrap(),
            RoomState::Active
        );
        assert_eq!(hook.handles.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_completion_handle_retires_room_once() {
        let hook = Arc::new(CapturingHook::default());
        let manager = RoomManager::with_options(
            Arc::new(UuidRoomIds),
            hook.clone(),
            DEFAULT_MAX_ID_ATTEMPTS,
            metrics(),
        );
        let config = ModeConfig::duel(0);
        let (sessions, senders) = queued_pair(config.mode);

        let created = manager.create_room(&config, sessions.clone()).unwrap();
        manager.notify_active(created.activated.unwrap());

        let handle = hook.handles.lock().unwrap().pop().unwrap();
        assert_eq!(handle.room_id(), created.room_id);
        handle.complete().unwrap();

        assert!(!manager.registry().contains(created.room_id).unwrap());
        assert!(sessions.iter().all(|s| s.membership() == Membership::None));
        assert!(senders
            .iter()
            .all(|s| s.count(|e| matches!(e, ServerEvent::Completed { .. })) == 1));
        assert_eq!(
            *hook.closed.lock().unwrap(),
            vec![(created.room_id, RoomOutcome::Completed)]
        );

        assert_eq!(
            manager.complete(created.room_id),
            Err(MatchmakingError::RoomNotFound {
                room_id: created.room_id
            })
        );

        let stats = manager.stats().unwrap();
        assert_eq!(stats.rooms_completed, 1);
        assert_eq!(stats.active_rooms, 0);
    }

    #[test]
    fn test_depart_abandons_and_unregisters() {
        let manager = RoomManager::new(metrics());
        let config = ModeConfig::duel(0);
        let (sessions, senders) = queued_pair(config.mode);
        let created = manager.create_room(&config, sessions.clone()).unwrap();

        manager
            .relay(sessions[1].id(), created.room_id, json!({"x": 1}))
            .unwrap();
        manager
            .depart(sessions[0].id(), created.room_id, DepartureReason::Left)
            .unwrap();

        assert_eq!(
            manager.snapshot(created.room_id).unwrap_err(),
            MatchmakingError::RoomNotFound {
                room_id: created.room_id
            }
        );
        assert_eq!(
            senders[1].count(|e| matches!(
                e,
                ServerEvent::Abandoned {
                    reason: DepartureReason::Left,
                    ..
                }
            )),
            1
        );
        assert_eq!(
            senders[0].count(|e| matches!(e, ServerEvent::RoomMessage { .. })),
            1
        );
        assert_eq!(manager.stats().unwrap().rooms_abandoned, 1);
    }
}
