//! Mode provider traits and implementations
//!
//! This module defines the interface for looking up the configured game modes
//! along with the static implementation built from application config.

use crate::config::{default_modes, ModeConfig, MAX_GROUP_SIZE, MIN_GROUP_SIZE};
use crate::error::{MatchmakingError, MatchmakingResult};
use crate::types::GameMode;
use std::collections::BTreeMap;

/// Trait for providing mode configurations
pub trait ModeProvider: Send + Sync {
    /// Get configuration for a specific mode
    fn mode_config(&self, mode: GameMode) -> MatchmakingResult<ModeConfig>;

    /// Get all configured modes
    fn available_modes(&self) -> Vec<GameMode>;

    /// Validate a mode configuration
    fn validate_config(&self, config: &ModeConfig) -> MatchmakingResult<()>;
}

/// Mode provider backed by a fixed table set at startup
#[derive(Debug, Clone)]
pub struct StaticModeProvider {
    modes: BTreeMap<GameMode, ModeConfig>,
}

impl StaticModeProvider {
    /// Provider with the default three 1v1 modes
    pub fn new() -> Self {
        Self {
            modes: default_modes()
                .into_iter()
                .map(|config| (config.mode, config))
                .collect(),
        }
    }

    /// Provider with a custom mode table
    pub fn with_modes(modes: Vec<ModeConfig>) -> MatchmakingResult<Self> {
        if modes.is_empty() {
            return Err(MatchmakingError::ConfigurationError {
                message: "At least one game mode must be configured".to_string(),
            });
        }

        let mut provider = Self {
            modes: BTreeMap::new(),
        };
        for config in modes {
            provider.validate_config(&config)?;
            if provider.modes.insert(config.mode, config.clone()).is_some() {
                return Err(MatchmakingError::ConfigurationError {
                    message: format!("Duplicate game mode: {}", config.mode),
                });
            }
        }

        Ok(provider)
    }
}

impl Default for StaticModeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeProvider for StaticModeProvider {
    fn mode_config(&self, mode: GameMode) -> MatchmakingResult<ModeConfig> {
        self.modes
            .get(&mode)
            .cloned()
            .ok_or(MatchmakingError::InvalidMode { mode })
    }

    fn available_modes(&self) -> Vec<GameMode> {
        self.modes.keys().copied().collect()
    }

    fn validate_config(&self, config: &ModeConfig) -> MatchmakingResult<()> {
        if config.group_size < MIN_GROUP_SIZE {
            return Err(MatchmakingError::ConfigurationError {
                message: format!(
                    "Group size for mode {} must be at least {}",
                    config.mode, MIN_GROUP_SIZE
                ),
            });
        }

        if config.group_size > MAX_GROUP_SIZE {
            return Err(MatchmakingError::ConfigurationError {
                message: format!(
                    "Group size for mode {} cannot exceed {}",
                    config.mode, MAX_GROUP_SIZE
                ),
            });
        }

        if config.name.trim().is_empty() {
            return Err(MatchmakingError::ConfigurationError {
                message: format!("Mode {} needs a name", config.mode),
            });
        }

        Ok(())
    }
}
