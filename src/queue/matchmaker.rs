//! Matchmaker: per-mode queues drained into rooms
//!
//! Every mode has its own queue lock. `enqueue`, `leave` and `try_match` for a
//! mode run entirely under that lock, so concurrent joins can never both see
//! a group one short and complete it twice. Rooms are created while the lock
//! is still held; gameplay hooks fire after it is released.

use crate::error::{MatchmakingError, MatchmakingResult};
use crate::metrics::MetricsCollector;
use crate::queue::mode_queue::{ModeQueue, QueueEntry};
use crate::queue::provider::ModeProvider;
use crate::room::{RoomManager, RoomSnapshot};
use crate::session::PlayerSession;
use crate::types::{GameMode, Membership, RoomId, ServerEvent, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tracing::{error, info};

/// Result of a successful `enqueue`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// 1-based queue position if the session is still waiting
    pub position: Option<usize>,
    /// Rooms created by the match attempt the join triggered
    pub rooms_created: Vec<RoomId>,
}

impl JoinOutcome {
    pub fn is_waiting(&self) -> bool {
        self.position.is_some()
    }
}

/// Statistics about matchmaker operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchmakerStats {
    /// Total successful joins
    pub players_queued_total: u64,
    /// Sessions currently waiting across all modes
    pub players_waiting: usize,
    /// Total rooms created by matching
    pub matches_made: u64,
    /// Match attempts aborted by room creation failures
    pub match_failures: u64,
}

/// Outcome of one drain of a queue
#[derive(Default)]
struct MatchPass {
    rooms: Vec<RoomId>,
    activated: Vec<RoomSnapshot>,
    failures: u64,
}

/// The matchmaker
#[derive(Clone)]
pub struct Matchmaker {
    /// One queue per configured mode; the key set is fixed at construction
    queues: Arc<BTreeMap<GameMode, Mutex<ModeQueue>>>,
    /// Mode provider the queues were built from
    mode_provider: Arc<dyn ModeProvider>,
    /// Room manager used for room creation
    rooms: RoomManager,
    /// Matchmaker statistics
    stats: Arc<RwLock<MatchmakerStats>>,
    /// Metrics collector for recording queue and match data
    metrics: Arc<MetricsCollector>,
}

impl Matchmaker {
    /// Create a matchmaker with one queue per mode the provider knows
    pub fn new(
        mode_provider: Arc<dyn ModeProvider>,
        rooms: RoomManager,
        metrics: Arc<MetricsCollector>,
    ) -> MatchmakingResult<Self> {
        let mut queues = BTreeMap::new();
        for mode in mode_provider.available_modes() {
            let config = mode_provider.mode_config(mode)?;
            mode_provider.validate_config(&config)?;
            queues.insert(mode, Mutex::new(ModeQueue::new(config)));
        }

        if queues.is_empty() {
            return Err(MatchmakingError::ConfigurationError {
                message: "Matchmaker needs at least one game mode".to_string(),
            });
        }

        Ok(Self {
            queues: Arc::new(queues),
            mode_provider,
            rooms,
            stats: Arc::new(RwLock::new(MatchmakerStats::default())),
            metrics,
        })
    }

    pub fn modes(&self) -> Vec<GameMode> {
        self.queues.keys().copied().collect()
    }

    pub fn mode_provider(&self) -> Arc<dyn ModeProvider> {
        self.mode_provider.clone()
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    /// Append a session to a mode's queue, then match as many groups as possible
    ///
    /// A session still waiting afterwards is sent `queued` with its position.
    /// Room creation failures do not fail the join: the group goes back to the
    /// head of the queue and the failure is logged and counted.
    pub fn enqueue(
        &self,
        session: &Arc<PlayerSession>,
        mode: GameMode,
    ) -> MatchmakingResult<JoinOutcome> {
        let timer = self.metrics.start_timer();
        let session_id = session.id();

        let (outcome, pass) = {
            let mut queue = self.lock_queue(mode)?;

            {
                let mut membership = session.lock_membership();
                if session.is_closed() {
                    return Err(MatchmakingError::SessionClosed { session_id });
                }
                match *membership {
                    Membership::None => {}
                    Membership::Queued(queued) => {
                        return Err(MatchmakingError::AlreadyQueued {
                            session_id,
                            mode: queued,
                        })
                    }
                    Membership::InRoom(room_id) => {
                        return Err(MatchmakingError::AlreadyInRoom {
                            session_id,
                            room_id,
                        })
                    }
                }
                *membership = Membership::Queued(mode);
            }

            queue.push_back(QueueEntry::new(session.clone()));
            self.metrics.record_queue_join(mode);

            let pass = self.match_locked(&mut queue);
            let position = queue.position(session_id);
            if let Some(position) = position {
                session.send(ServerEvent::Queued { mode, position });
            }
            self.metrics.set_queue_depth(mode, queue.len());

            (
                JoinOutcome {
                    position,
                    rooms_created: pass.rooms.clone(),
                },
                pass,
            )
        };

        self.finish_pass(pass, true)?;

        info!(
            "Session {} joined mode {} - waiting: {}, rooms created: {}, duration: {:.2}ms",
            session_id,
            mode,
            outcome.is_waiting(),
            outcome.rooms_created.len(),
            timer.stop().as_secs_f64() * 1000.0
        );
        Ok(outcome)
    }

    /// Remove a session from a mode's queue, wherever it stands
    ///
    /// Fails with `NotQueued` if the session is not waiting in this mode,
    /// including when a match already popped it.
    pub fn leave(&self, session: &PlayerSession, mode: GameMode) -> MatchmakingResult<()> {
        let session_id = session.id();

        let remaining = {
            let mut queue = self.lock_queue(mode)?;
            let mut membership = session.lock_membership();
            if *membership != Membership::Queued(mode) {
                return Err(MatchmakingError::NotQueued { session_id, mode });
            }

            if queue.remove(session_id).is_none() {
                return Err(MatchmakingError::internal(format!(
                    "Session {} marked queued for mode {} but missing from its queue",
                    session_id, mode
                )));
            }
            *membership = Membership::None;
            queue.len()
        };

        self.metrics.record_queue_leave(mode);
        self.metrics.set_queue_depth(mode, remaining);

        info!(
            "Session {} left mode {} queue - remaining: {}",
            session_id, mode, remaining
        );
        Ok(())
    }

    /// Pop full groups from a mode's queue into new rooms
    pub fn try_match(&self, mode: GameMode) -> MatchmakingResult<Vec<RoomId>> {
        let pass = {
            let mut queue = self.lock_queue(mode)?;
            let pass = self.match_locked(&mut queue);
            self.metrics.set_queue_depth(mode, queue.len());
            pass
        };

        let rooms = pass.rooms.clone();
        self.finish_pass(pass, false)?;
        Ok(rooms)
    }

    /// Number of sessions waiting in a mode
    pub fn queue_len(&self, mode: GameMode) -> MatchmakingResult<usize> {
        Ok(self.lock_queue(mode)?.len())
    }

    /// Waiting sessions of a mode in arrival order
    pub fn queued_sessions(&self, mode: GameMode) -> MatchmakingResult<Vec<SessionId>> {
        Ok(self.lock_queue(mode)?.session_ids())
    }

    pub fn stats(&self) -> MatchmakingResult<MatchmakerStats> {
        let mut players_waiting = 0;
        for mode in self.queues.keys() {
            players_waiting += self.queue_len(*mode)?;
        }

        let mut stats = self
            .stats
            .read()
            .map_err(|_| MatchmakingError::internal("Failed to acquire matchmaker stats lock"))?
            .clone();
        stats.players_waiting = players_waiting;
        Ok(stats)
    }

    fn lock_queue(&self, mode: GameMode) -> MatchmakingResult<MutexGuard<'_, ModeQueue>> {
        self.queues
            .get(&mode)
            .ok_or(MatchmakingError::InvalidMode { mode })?
            .lock()
            .map_err(|_| MatchmakingError::internal("Failed to acquire queue lock"))
    }

    /// Drain full groups; the caller holds the queue lock
    fn match_locked(&self, queue: &mut ModeQueue) -> MatchPass {
        let mode = queue.mode();
        let mut pass = MatchPass::default();

        while let Some(group) = queue.pop_group() {
            let timer = self.metrics.start_timer();
            let occupants = group.iter().map(|entry| entry.session.clone()).collect();

            match self.rooms.create_room(queue.config(), occupants) {
                Ok(room) => {
                    let waits: Vec<Duration> = group.iter().map(QueueEntry::waited).collect();
                    self.metrics.record_match(mode, &waits, timer.stop());
                    pass.rooms.push(room.room_id);
                    pass.activated.extend(room.activated);
                }
                Err(e) => {
                    error!(
                        "Room creation failed for mode {} - re-queued {} sessions at head: {}",
                        mode,
                        group.len(),
                        e
                    );
                    queue.restore_group(group);
                    self.metrics.record_match_failure(mode);
                    pass.failures += 1;
                    break;
                }
            }
        }

        pass
    }

    /// Update statistics and run hooks once the queue lock is released
    fn finish_pass(&self, pass: MatchPass, joined: bool) -> MatchmakingResult<()> {
        {
            let mut stats = self
                .stats
                .write()
                .map_err(|_| MatchmakingError::internal("Failed to acquire matchmaker stats lock"))?;
            if joined {
                stats.players_queued_total += 1;
            }
            stats.matches_made += pass.rooms.len() as u64;
            stats.match_failures += pass.failures;
        }

        for room in pass.activated {
            self.rooms.notify_active(room);
        }
        Ok(())
    }
}
