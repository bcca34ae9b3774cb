//! Duel Hall - Real-time matchmaking service for small multiplayer games
//!
//! This crate pairs connected clients into isolated game rooms through
//! per-mode FIFO queues, relays in-room messages between occupants and tears
//! rooms down when a match completes or a player leaves.

pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod queue;
pub mod room;
pub mod service;
pub mod session;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, MatchmakingResult, Result};
pub use types::*;

// Re-export key components
pub use queue::{Matchmaker, ModeProvider, StaticModeProvider};
pub use room::{CompletionHandle, RoomHook, RoomManager};
pub use session::{ConnectionManager, SessionHandle, SessionSender};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
