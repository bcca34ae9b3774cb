//! Game rooms for the matchmaking service
//!
//! This module holds the per-match state machine, the shared registry of live
//! rooms and the manager that creates and retires them.

pub mod instance;
pub mod manager;
pub mod registry;

// Re-export commonly used types
pub use instance::{GameRoom, RoomSnapshot};
pub use manager::{
    CompletionHandle, CreatedRoom, NoopRoomHook, RoomHook, RoomIdSource, RoomManager, RoomStats,
    UuidRoomIds, DEFAULT_MAX_ID_ATTEMPTS,
};
pub use registry::{RoomRegistry, SharedRoom};
