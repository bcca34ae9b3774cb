//! Player sessions and the capability used to reach their clients
//!
//! A [`PlayerSession`] is the queue element and room occupant. It carries no
//! transport state; outbound events go through a [`SessionSender`] so the
//! matchmaking core can be driven without a real connection.

use crate::error::{MatchmakingError, MatchmakingResult};
use crate::types::{Membership, ServerEvent, SessionId};
use crate::utils::{current_timestamp, generate_session_id};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// Opaque send-capability to a connected client
///
/// Implementations must not block: events are delivered while matchmaking
/// locks are held.
#[cfg_attr(test, mockall::automock)]
pub trait SessionSender: Send + Sync {
    /// Deliver an event to the client
    fn send(&self, event: ServerEvent) -> MatchmakingResult<()>;
}

/// Sender backed by an unbounded tokio channel drained by the connection task
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ChannelSender {
    /// Create a sender together with the receiving half for the transport
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SessionSender for ChannelSender {
    fn send(&self, event: ServerEvent) -> MatchmakingResult<()> {
        self.tx
            .send(event)
            .map_err(|_| MatchmakingError::internal("Client channel closed"))
    }
}

/// Ephemeral record binding a connected client to its matchmaking state
pub struct PlayerSession {
    id: SessionId,
    identity: Option<String>,
    sender: Arc<dyn SessionSender>,
    membership: Mutex<Membership>,
    closed: AtomicBool,
    connected_at: DateTime<Utc>,
}

impl PlayerSession {
    /// Create a session with a fresh identifier
    pub fn new(identity: Option<String>, sender: Arc<dyn SessionSender>) -> Self {
        Self::with_id(generate_session_id(), identity, sender)
    }

    /// Create a session with a specific identifier
    pub fn with_id(
        id: SessionId,
        identity: Option<String>,
        sender: Arc<dyn SessionSender>,
    ) -> Self {
        Self {
            id,
            identity,
            sender,
            membership: Mutex::new(Membership::None),
            closed: AtomicBool::new(false),
            connected_at: current_timestamp(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Label supplied by the identity collaborator, if any
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Current membership snapshot
    pub fn membership(&self) -> Membership {
        *self.lock_membership()
    }

    /// Whether disconnect cleanup has begun
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Lock the membership slot
    ///
    /// A poisoned lock still holds a valid value since `Membership` is `Copy`
    /// and every write is a single assignment.
    pub(crate) fn lock_membership(&self) -> MutexGuard<'_, Membership> {
        self.membership
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the session closed; returns true only for the first caller
    ///
    /// The flag is flipped under the membership lock so an enqueue that
    /// checks it while holding that lock cannot interleave with cleanup.
    pub(crate) fn mark_closed(&self) -> bool {
        let _membership = self.lock_membership();
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Deliver an event; failures are logged and reported as `false`
    pub fn send(&self, event: ServerEvent) -> bool {
        match self.sender.send(event) {
            Ok(()) => true,
            Err(e) => {
                debug!("Dropped event for session {}: {}", self.id, e);
                false
            }
        }
    }
}

impl std::fmt::Debug for PlayerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerSession")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("membership", &self.membership())
            .field("closed", &self.is_closed())
            .finish()
    }
}
