//! Configuration management for the duel-hall service
//!
//! This module handles all configuration loading from environment variables
//! and TOML files, validation, and default values for the matchmaking service.

pub mod app;
pub mod mode;

// Re-export commonly used types
pub use app::{
    parse_mode_list, validate_config, AppConfig, GatewaySettings, MatchmakingSettings,
    ServiceSettings,
};
pub use mode::{default_modes, ModeConfig, MAX_GROUP_SIZE, MIN_GROUP_SIZE};
