//! Error types for the matchmaking service
//!
//! Core matchmaking operations return [`MatchmakingResult`] so callers can map
//! every failure to a wire-level [`ErrorCode`]. Service plumbing (startup,
//! configuration, HTTP servers) uses anyhow like the rest of the application.

use crate::types::{ErrorCode, GameMode, RoomId, RoomState, SessionId};

/// Result type alias for service plumbing
pub type Result<T> = anyhow::Result<T>;

/// Result type alias for core matchmaking operations
pub type MatchmakingResult<T> = std::result::Result<T, MatchmakingError>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Invalid game mode: {mode}")]
    InvalidMode { mode: GameMode },

    #[error("Session {session_id} is already queued for mode {mode}")]
    AlreadyQueued { session_id: SessionId, mode: GameMode },

    #[error("Session {session_id} is already in room {room_id}")]
    AlreadyInRoom {
        session_id: SessionId,
        room_id: RoomId,
    },

    #[error("Session {session_id} is not queued for mode {mode}")]
    NotQueued { session_id: SessionId, mode: GameMode },

    #[error("Room not found: {room_id}")]
    RoomNotFound { room_id: RoomId },

    #[error("Session {session_id} is not an occupant of room {room_id}")]
    NotInRoom {
        session_id: SessionId,
        room_id: RoomId,
    },

    #[error("Room {room_id} cannot accept this request in state {state:?}")]
    RoomNotActive { room_id: RoomId, state: RoomState },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: SessionId },

    #[error("Session {session_id} is disconnecting")]
    SessionClosed { session_id: SessionId },

    #[error("Invalid message: {reason}")]
    InvalidMessage { reason: String },

    #[error("Room id generation exhausted after {attempts} attempts")]
    IdGenerationExhausted { attempts: u32 },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl MatchmakingError {
    /// Wire code sent back to the originating client
    pub fn code(&self) -> ErrorCode {
        match self {
            MatchmakingError::InvalidMode { .. } => ErrorCode::InvalidMode,
            MatchmakingError::AlreadyQueued { .. } => ErrorCode::AlreadyQueued,
            MatchmakingError::AlreadyInRoom { .. } => ErrorCode::AlreadyInRoom,
            MatchmakingError::NotQueued { .. } => ErrorCode::NotQueued,
            MatchmakingError::RoomNotFound { .. } => ErrorCode::RoomNotFound,
            MatchmakingError::NotInRoom { .. } => ErrorCode::NotInRoom,
            MatchmakingError::RoomNotActive { .. } => ErrorCode::RoomNotActive,
            MatchmakingError::SessionNotFound { .. } | MatchmakingError::SessionClosed { .. } => {
                ErrorCode::SessionClosed
            }
            MatchmakingError::InvalidMessage { .. } => ErrorCode::InvalidMessage,
            MatchmakingError::IdGenerationExhausted { .. }
            | MatchmakingError::ConfigurationError { .. }
            | MatchmakingError::InternalError { .. } => ErrorCode::Internal,
        }
    }

    /// Local rejections that only concern the requesting client
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            MatchmakingError::IdGenerationExhausted { .. }
                | MatchmakingError::ConfigurationError { .. }
                | MatchmakingError::InternalError { .. }
        )
    }

    /// Shorthand for lock poisoning and other broken invariants
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        MatchmakingError::InternalError {
            message: message.into(),
        }
    }
}
