//! Per-mode matchmaking configuration

use crate::types::GameMode;
use serde::{Deserialize, Serialize};

/// Smallest room a mode may require
pub const MIN_GROUP_SIZE: usize = 2;

/// Largest room a mode may require
pub const MAX_GROUP_SIZE: usize = 16;

/// Configuration for a single game mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeConfig {
    /// Mode key clients send with `joinQueue`
    pub mode: GameMode,
    /// Human-readable name used in logs and metrics
    pub name: String,
    /// Number of sessions grouped into one room
    pub group_size: usize,
    /// Whether every occupant must send `ready` before the room becomes active
    #[serde(default)]
    pub require_ready: bool,
}

impl ModeConfig {
    /// One-versus-one mode without ready-up
    pub fn duel(mode: i64) -> Self {
        Self {
            mode: GameMode::new(mode),
            name: format!("mode-{}", mode),
            group_size: 2,
            require_ready: false,
        }
    }

    /// Parse a `key:size[:ready]` entry as used by `MATCHMAKING_MODES`
    pub fn parse_entry(entry: &str) -> Option<Self> {
        let mut parts = entry.trim().split(':');
        let mode: i64 = parts.next()?.trim().parse().ok()?;
        let group_size: usize = parts.next()?.trim().parse().ok()?;
        let require_ready = match parts.next().map(str::trim) {
            None => false,
            Some("ready") => true,
            Some(_) => return None,
        };
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            mode: GameMode::new(mode),
            name: format!("mode-{}", mode),
            group_size,
            require_ready,
        })
    }
}

/// Default mode table: three 1v1 modes keyed 0, 1 and 2
pub fn default_modes() -> Vec<ModeConfig> {
    (0..3).map(ModeConfig::duel).collect()
}
