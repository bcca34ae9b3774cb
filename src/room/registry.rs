//! Shared table of live rooms
//!
//! The registry lock is only ever held for the map operation itself; callers
//! lock a room after the registry guard has been released.

use crate::error::{MatchmakingError, MatchmakingResult};
use crate::room::instance::GameRoom;
use crate::types::RoomId;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// A registered room, locked for every transition
pub type SharedRoom = Arc<Mutex<GameRoom>>;

/// Mapping from room id to live room
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, SharedRoom>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a room under a vacant id; returns false if the id is taken
    pub fn register(&self, room_id: RoomId, room: SharedRoom) -> MatchmakingResult<bool> {
        let mut rooms = self
            .rooms
            .write()
            .map_err(|_| MatchmakingError::internal("Failed to acquire registry lock"))?;

        match rooms.entry(room_id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(room);
                Ok(true)
            }
        }
    }

    pub fn lookup(&self, room_id: RoomId) -> MatchmakingResult<SharedRoom> {
        let rooms = self
            .rooms
            .read()
            .map_err(|_| MatchmakingError::internal("Failed to acquire registry lock"))?;

        rooms
            .get(&room_id)
            .cloned()
            .ok_or(MatchmakingError::RoomNotFound { room_id })
    }

    pub fn remove(&self, room_id: RoomId) -> MatchmakingResult<Option<SharedRoom>> {
        let mut rooms = self
            .rooms
            .write()
            .map_err(|_| MatchmakingError::internal("Failed to acquire registry lock"))?;
        Ok(rooms.remove(&room_id))
    }

    pub fn contains(&self, room_id: RoomId) -> MatchmakingResult<bool> {
        let rooms = self
            .rooms
            .read()
            .map_err(|_| MatchmakingError::internal("Failed to acquire registry lock"))?;
        Ok(rooms.contains_key(&room_id))
    }

    pub fn len(&self) -> MatchmakingResult<usize> {
        let rooms = self
            .rooms
            .read()
            .map_err(|_| MatchmakingError::internal("Failed to acquire registry lock"))?;
        Ok(rooms.len())
    }

    pub fn is_empty(&self) -> MatchmakingResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn room_ids(&self) -> MatchmakingResult<Vec<RoomId>> {
        let rooms = self
            .rooms
            .read()
            .map_err(|_| MatchmakingError::internal("Failed to acquire registry lock"))?;
        Ok(rooms.keys().copied().collect())
    }
}
