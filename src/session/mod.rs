//! Client sessions and connection bookkeeping
//!
//! This module tracks live client connections, issues player sessions and
//! routes every session's requests and disconnects into the queue or room it
//! currently occupies.

pub mod manager;
pub mod player;

// Re-export commonly used types
pub use manager::{ConnectionManager, ConnectionStats, DisconnectOutcome, SessionHandle};
pub use player::{ChannelSender, PlayerSession, SessionSender};
