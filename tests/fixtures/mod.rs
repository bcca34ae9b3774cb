//! Test fixtures and mock implementations for integration testing

#![allow(dead_code)]

use duel_hall::config::ModeConfig;
use duel_hall::error::MatchmakingResult;
use duel_hall::metrics::MetricsCollector;
use duel_hall::queue::{Matchmaker, StaticModeProvider};
use duel_hall::room::{CompletionHandle, RoomHook, RoomManager, RoomSnapshot, UuidRoomIds};
use duel_hall::session::{ConnectionManager, SessionHandle, SessionSender};
use duel_hall::types::{RoomId, RoomOutcome, ServerEvent, SessionId};
use std::sync::{Arc, Mutex};

/// Sender that captures every event delivered to a session
#[derive(Debug, Default)]
pub struct RecordingSender {
    events: Mutex<Vec<ServerEvent>>,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get all delivered events
    pub fn events(&self) -> Vec<ServerEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Count events with the given wire name (`matched`, `abandoned`, ...)
    pub fn count_events_of_type(&self, event_name: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| {
                serde_json::to_value(event)
                    .map(|value| value["event"] == event_name)
                    .unwrap_or(false)
            })
            .count()
    }

    /// Room ids carried by `matched` events, in delivery order
    pub fn matched_rooms(&self) -> Vec<RoomId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::Matched { room_id, .. } => Some(room_id),
                _ => None,
            })
            .collect()
    }
}

impl SessionSender for RecordingSender {
    fn send(&self, event: ServerEvent) -> MatchmakingResult<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        Ok(())
    }
}

/// Gameplay hook that keeps completion handles and closed outcomes
#[derive(Default)]
pub struct CapturingHook {
    active: Mutex<Vec<(RoomSnapshot, CompletionHandle)>>,
    closed: Mutex<Vec<(RoomId, RoomOutcome)>>,
}

impl CapturingHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().map(|rooms| rooms.len()).unwrap_or(0)
    }

    /// Take the completion handle for a room that went active
    pub fn take_completion(&self, room_id: RoomId) -> Option<CompletionHandle> {
        let mut active = self.active.lock().ok()?;
        let index = active.iter().position(|(room, _)| room.room_id == room_id)?;
        Some(active.remove(index).1)
    }

    pub fn closed(&self) -> Vec<(RoomId, RoomOutcome)> {
        self.closed
            .lock()
            .map(|closed| closed.clone())
            .unwrap_or_default()
    }
}

impl RoomHook for CapturingHook {
    fn on_room_active(&self, room: RoomSnapshot, completion: CompletionHandle) {
        if let Ok(mut active) = self.active.lock() {
            active.push((room, completion));
        }
    }

    fn on_room_closed(&self, room_id: RoomId, outcome: RoomOutcome) {
        if let Ok(mut closed) = self.closed.lock() {
            closed.push((room_id, outcome));
        }
    }
}

/// A connected test client
pub struct TestClient {
    pub handle: SessionHandle,
    pub events: Arc<RecordingSender>,
}

impl TestClient {
    pub fn id(&self) -> SessionId {
        self.handle.session_id()
    }
}

/// Complete in-process matchmaking system
pub struct TestSystem {
    pub connections: ConnectionManager,
    pub hook: Arc<CapturingHook>,
    pub metrics: Arc<MetricsCollector>,
}

impl TestSystem {
    /// Build with the default mode table (three 1v1 modes)
    pub fn new() -> Self {
        Self::with_modes(duel_hall::config::default_modes())
    }

    pub fn with_modes(modes: Vec<ModeConfig>) -> Self {
        let metrics = Arc::new(MetricsCollector::new().expect("Failed to create metrics"));
        let hook = CapturingHook::new();
        let rooms = RoomManager::with_options(
            Arc::new(UuidRoomIds),
            hook.clone(),
            duel_hall::room::DEFAULT_MAX_ID_ATTEMPTS,
            metrics.clone(),
        );
        let provider = Arc::new(StaticModeProvider::with_modes(modes).expect("Invalid modes"));
        let matchmaker =
            Matchmaker::new(provider, rooms, metrics.clone()).expect("Failed to build matchmaker");

        Self {
            connections: ConnectionManager::new(matchmaker, metrics.clone()),
            hook,
            metrics,
        }
    }

    pub fn connect(&self) -> TestClient {
        let events = RecordingSender::new();
        let handle = self
            .connections
            .connect(None, events.clone())
            .expect("Failed to connect");
        TestClient { handle, events }
    }
}
