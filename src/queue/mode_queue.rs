//! FIFO waiting line for a single game mode

use crate::config::ModeConfig;
use crate::session::PlayerSession;
use crate::types::{GameMode, SessionId};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A session waiting in a mode queue
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub session: Arc<PlayerSession>,
    pub enqueued_at: Instant,
}

impl QueueEntry {
    pub fn new(session: Arc<PlayerSession>) -> Self {
        Self {
            session,
            enqueued_at: Instant::now(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    /// Time spent waiting so far
    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

/// Ordered sequence of sessions awaiting a match, oldest first
#[derive(Debug)]
pub struct ModeQueue {
    config: ModeConfig,
    entries: VecDeque<QueueEntry>,
}

impl ModeQueue {
    pub fn new(config: ModeConfig) -> Self {
        Self {
            config,
            entries: VecDeque::new(),
        }
    }

    pub fn mode(&self) -> GameMode {
        self.config.mode
    }

    pub fn config(&self) -> &ModeConfig {
        &self.config
    }

    pub fn group_size(&self) -> usize {
        self.config.group_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, session_id: SessionId) -> bool {
        self.position(session_id).is_some()
    }

    /// 1-based position of a session, if waiting
    pub fn position(&self, session_id: SessionId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.session_id() == session_id)
            .map(|index| index + 1)
    }

    /// Append an entry and return its 1-based position
    pub fn push_back(&mut self, entry: QueueEntry) -> usize {
        self.entries.push_back(entry);
        self.entries.len()
    }

    /// Remove a session by identity from any position
    pub fn remove(&mut self, session_id: SessionId) -> Option<QueueEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.session_id() == session_id)?;
        self.entries.remove(index)
    }

    /// Pop the earliest `group_size` entries, or nothing if the queue is short
    pub fn pop_group(&mut self) -> Option<Vec<QueueEntry>> {
        let group_size = self.group_size();
        if self.entries.len() < group_size {
            return None;
        }
        Some(self.entries.drain(..group_size).collect())
    }

    /// Put a popped group back at the head, keeping its original order
    pub fn restore_group(&mut self, group: Vec<QueueEntry>) {
        for entry in group.into_iter().rev() {
            self.entries.push_front(entry);
        }
    }

    /// Waiting sessions in arrival order
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.entries.iter().map(QueueEntry::session_id).collect()
    }
}
