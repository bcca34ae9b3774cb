//! Game room instance and lifecycle state machine
//!
//! A room is created in `Forming` by the matchmaker, becomes `Active` once
//! every occupant is ready (or immediately when the mode needs no ready-up),
//! and ends in `Completed` or `Abandoned`. Callers hold the room's lock for
//! every operation; the room in turn locks occupant memberships, never the
//! other way around.

use crate::config::ModeConfig;
use crate::error::{MatchmakingError, MatchmakingResult};
use crate::session::PlayerSession;
use crate::types::{
    DepartureReason, GameMode, Membership, RoomId, RoomState, ServerEvent, SessionId,
};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Point-in-time view of a room handed to collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub mode: GameMode,
    pub state: RoomState,
    pub occupants: Vec<SessionId>,
    pub ready: Vec<SessionId>,
    pub created_at: DateTime<Utc>,
}

/// A single match instance
#[derive(Debug)]
pub struct GameRoom {
    id: RoomId,
    mode: GameMode,
    require_ready: bool,
    occupants: Vec<Arc<PlayerSession>>,
    ready: HashSet<SessionId>,
    state: RoomState,
    created_at: DateTime<Utc>,
    started: Instant,
}

impl GameRoom {
    /// Create a room in `Forming` with its occupants in match order
    pub fn new(id: RoomId, config: &ModeConfig, occupants: Vec<Arc<PlayerSession>>) -> Self {
        Self {
            id,
            mode: config.mode,
            require_ready: config.require_ready,
            occupants,
            ready: HashSet::new(),
            state: RoomState::Forming,
            created_at: current_timestamp(),
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn requires_ready(&self) -> bool {
        self.require_ready
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time since the room was created
    pub fn lifetime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn occupant_ids(&self) -> Vec<SessionId> {
        self.occupants.iter().map(|session| session.id()).collect()
    }

    pub fn is_occupant(&self, session_id: SessionId) -> bool {
        self.occupants.iter().any(|session| session.id() == session_id)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        let occupants = self.occupant_ids();
        let ready = occupants
            .iter()
            .copied()
            .filter(|id| self.ready.contains(id))
            .collect();

        RoomSnapshot {
            room_id: self.id,
            mode: self.mode,
            state: self.state,
            occupants,
            ready,
            created_at: self.created_at,
        }
    }

    /// Move every occupant into this room and tell them about the match
    ///
    /// Only valid right after creation, while the caller holds the mode queue
    /// lock and occupants are still marked as queued for this room's mode.
    /// Nothing is changed if any occupant is in another state.
    pub fn admit_occupants(&mut self) -> MatchmakingResult<()> {
        if self.state != RoomState::Forming {
            return Err(self.not_active());
        }

        if let Some(stale) = self
            .occupants
            .iter()
            .find(|session| session.membership() != Membership::Queued(self.mode))
        {
            return Err(MatchmakingError::internal(format!(
                "Session {} matched into room {} while {}",
                stale.id(),
                self.id,
                stale.membership()
            )));
        }

        for session in &self.occupants {
            *session.lock_membership() = Membership::InRoom(self.id);
        }

        let event = ServerEvent::Matched {
            room_id: self.id,
            mode: self.mode,
            occupants: self.occupant_ids(),
        };
        self.broadcast(&event, None);

        Ok(())
    }

    /// Record an occupant's ready-up; returns true once every occupant is ready
    pub fn acknowledge_ready(&mut self, session_id: SessionId) -> MatchmakingResult<bool> {
        self.ensure_occupant(session_id)?;
        if self.state != RoomState::Forming {
            return Err(self.not_active());
        }

        if self.ready.insert(session_id) {
            debug!(
                "Session {} ready in room {} ({}/{})",
                session_id,
                self.id,
                self.ready.len(),
                self.occupants.len()
            );
        }

        Ok(self.ready.len() == self.occupants.len())
    }

    /// Forming → Active
    pub fn activate(&mut self) -> MatchmakingResult<()> {
        if self.state != RoomState::Forming {
            return Err(self.not_active());
        }

        self.state = RoomState::Active;
        self.broadcast(&ServerEvent::RoomStarted { room_id: self.id }, None);

        info!(
            "Room {} active - mode: {}, occupants: {}",
            self.id,
            self.mode,
            self.occupants.len()
        );
        Ok(())
    }

    /// Forward an opaque payload to every other occupant; returns recipients reached
    pub fn relay(
        &self,
        from: SessionId,
        payload: serde_json::Value,
    ) -> MatchmakingResult<usize> {
        self.ensure_live()?;
        self.ensure_occupant(from)?;
        if self.state != RoomState::Active {
            return Err(self.not_active());
        }

        let event = ServerEvent::RoomMessage {
            room_id: self.id,
            from,
            payload,
        };
        Ok(self.broadcast(&event, Some(from)))
    }

    /// An occupant left before completion: Forming or Active → Abandoned
    pub fn handle_departure(
        &mut self,
        session_id: SessionId,
        reason: DepartureReason,
    ) -> MatchmakingResult<()> {
        self.ensure_live()?;
        self.ensure_occupant(session_id)?;

        self.state = RoomState::Abandoned;
        self.release_memberships();

        let event = ServerEvent::Abandoned {
            room_id: self.id,
            reason,
        };
        let notified = self.broadcast(&event, Some(session_id));

        info!(
            "Room {} abandoned - departed: {}, reason: {:?}, notified: {}",
            self.id, session_id, reason, notified
        );
        Ok(())
    }

    /// Normal end signalled by the gameplay collaborator: Active → Completed
    pub fn complete(&mut self) -> MatchmakingResult<()> {
        self.ensure_live()?;
        if self.state != RoomState::Active {
            return Err(self.not_active());
        }

        self.state = RoomState::Completed;
        self.release_memberships();
        self.broadcast(&ServerEvent::Completed { room_id: self.id }, None);

        info!(
            "Room {} completed after {:.1}s",
            self.id,
            self.lifetime().as_secs_f64()
        );
        Ok(())
    }

    fn release_memberships(&self) {
        for session in &self.occupants {
            let mut membership = session.lock_membership();
            if *membership == Membership::InRoom(self.id) {
                *membership = Membership::None;
            }
        }
    }

    fn broadcast(&self, event: &ServerEvent, except: Option<SessionId>) -> usize {
        self.occupants
            .iter()
            .filter(|session| Some(session.id()) != except)
            .filter(|session| session.send(event.clone()))
            .count()
    }

    /// Terminal rooms are treated as already gone from the registry
    fn ensure_live(&self) -> MatchmakingResult<()> {
        if self.state.is_terminal() {
            return Err(MatchmakingError::RoomNotFound { room_id: self.id });
        }
        Ok(())
    }

    fn ensure_occupant(&self, session_id: SessionId) -> MatchmakingResult<()> {
        if !self.is_occupant(session_id) {
            return Err(MatchmakingError::NotInRoom {
                session_id,
                room_id: self.id,
            });
        }
        Ok(())
    }

    fn not_active(&self) -> MatchmakingError {
        if self.state.is_terminal() {
            return MatchmakingError::RoomNotFound { room_id: self.id };
        }
        MatchmakingError::RoomNotActive {
            room_id: self.id,
            state: self.state,
        }
    }
}
