//! Common types used throughout the matchmaking service

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for connected client sessions
pub type SessionId = Uuid;

/// Unique identifier for game rooms
pub type RoomId = Uuid;

/// Opaque key selecting a game variant
///
/// Any integer decodes; keys without a configured mode are rejected by the
/// matchmaker as `InvalidMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameMode(i64);

impl GameMode {
    pub const fn new(key: i64) -> Self {
        Self(key)
    }

    pub fn key(&self) -> i64 {
        self.0
    }
}

impl From<i64> for GameMode {
    fn from(key: i64) -> Self {
        Self(key)
    }
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Matchmaking membership of a session; exactly one at any instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum Membership {
    #[default]
    None,
    Queued(GameMode),
    InRoom(RoomId),
}

impl std::fmt::Display for Membership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Membership::None => write!(f, "none"),
            Membership::Queued(mode) => write!(f, "queued({})", mode),
            Membership::InRoom(room_id) => write!(f, "in-room({})", room_id),
        }
    }
}

/// Lifecycle states of a game room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomState {
    /// Occupants assigned, waiting for ready-up
    Forming,
    /// Gameplay messages are relayed between occupants
    Active,
    /// Normal end signalled by the gameplay collaborator (terminal)
    Completed,
    /// An occupant departed before completion (terminal)
    Abandoned,
}

impl RoomState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoomState::Completed | RoomState::Abandoned)
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomState::Forming => write!(f, "forming"),
            RoomState::Active => write!(f, "active"),
            RoomState::Completed => write!(f, "completed"),
            RoomState::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Reason an occupant left a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DepartureReason {
    Disconnect,
    Left,
    Shutdown,
}

/// How a room reached its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomOutcome {
    Completed,
    Abandoned(DepartureReason),
}

impl RoomOutcome {
    /// Label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            RoomOutcome::Completed => "completed",
            RoomOutcome::Abandoned(_) => "abandoned",
        }
    }
}

/// Error codes carried by failure acknowledgments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    InvalidMode,
    AlreadyQueued,
    AlreadyInRoom,
    NotQueued,
    RoomNotFound,
    NotInRoom,
    RoomNotActive,
    SessionClosed,
    InvalidMessage,
    Internal,
}

/// Requests a client sends over its real-time channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientRequest {
    #[serde(rename_all = "camelCase")]
    JoinQueue { mode: GameMode },
    #[serde(rename_all = "camelCase")]
    LeaveQueue { mode: GameMode },
    #[serde(rename_all = "camelCase")]
    Ready { room_id: RoomId },
    #[serde(rename_all = "camelCase")]
    RoomMessage {
        room_id: RoomId,
        payload: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: RoomId },
    Ping,
}

impl ClientRequest {
    /// Event name used in logs and metrics
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientRequest::JoinQueue { .. } => "joinQueue",
            ClientRequest::LeaveQueue { .. } => "leaveQueue",
            ClientRequest::Ready { .. } => "ready",
            ClientRequest::RoomMessage { .. } => "roomMessage",
            ClientRequest::LeaveRoom { .. } => "leaveRoom",
            ClientRequest::Ping => "ping",
        }
    }
}

/// Events the server delivers to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Connected { session_id: SessionId },
    #[serde(rename_all = "camelCase")]
    Queued { mode: GameMode, position: usize },
    #[serde(rename_all = "camelCase")]
    LeftQueue { mode: GameMode },
    #[serde(rename_all = "camelCase")]
    Matched {
        room_id: RoomId,
        mode: GameMode,
        occupants: Vec<SessionId>,
    },
    #[serde(rename_all = "camelCase")]
    RoomStarted { room_id: RoomId },
    #[serde(rename_all = "camelCase")]
    RoomMessage {
        room_id: RoomId,
        from: SessionId,
        payload: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    Abandoned {
        room_id: RoomId,
        reason: DepartureReason,
    },
    #[serde(rename_all = "camelCase")]
    Completed { room_id: RoomId },
    Error { code: ErrorCode, message: String },
    Pong,
}

impl ServerEvent {
    /// Build a failure acknowledgment from a core error
    pub fn error(error: &crate::error::MatchmakingError) -> Self {
        ServerEvent::Error {
            code: error.code(),
            message: error.to_string(),
        }
    }
}
