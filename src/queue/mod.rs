//! Mode queues and the matching algorithm
//!
//! This module keeps one FIFO waiting line per game mode and turns full
//! groups of waiting sessions into rooms in strict arrival order.

pub mod matchmaker;
pub mod mode_queue;
pub mod provider;

// Re-export commonly used types
pub use matchmaker::{JoinOutcome, Matchmaker, MatchmakerStats};
pub use mode_queue::{ModeQueue, QueueEntry};
pub use provider::{ModeProvider, StaticModeProvider};
