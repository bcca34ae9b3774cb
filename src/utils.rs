//! Utility functions for the matchmaking service

use crate::types::{RoomId, SessionId};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique room ID
pub fn generate_room_id() -> RoomId {
    Uuid::new_v4()
}

/// Generate a new unique session ID
pub fn generate_session_id() -> SessionId {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Milliseconds elapsed since the given timestamp, clamped at zero
pub fn millis_since(timestamp: DateTime<Utc>) -> u64 {
    (current_timestamp() - timestamp).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_room_id();
        let id2 = generate_room_id();
        assert_ne!(id1, id2);

        let session1 = generate_session_id();
        let session2 = generate_session_id();
        assert_ne!(session1, session2);
    }

    #[test]
    fn test_millis_since() {
        let past = current_timestamp() - chrono::Duration::seconds(2);
        assert!(millis_since(past) >= 2000);

        let future = current_timestamp() + chrono::Duration::seconds(5);
        assert_eq!(millis_since(future), 0);
    }
}
