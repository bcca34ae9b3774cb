//! Main application configuration
//!
//! This module defines the primary configuration structures for the duel-hall
//! matchmaking service, including environment variable and TOML loading and
//! validation.

use crate::config::mode::{default_modes, ModeConfig, MAX_GROUP_SIZE, MIN_GROUP_SIZE};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub matchmaking: MatchmakingSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check and metrics endpoints
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Interval of the metrics refresh task in seconds
    pub metrics_interval_seconds: u64,
}

/// Real-time gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Address the WebSocket gateway binds to
    pub host: String,
    /// Port the WebSocket gateway listens on
    pub port: u16,
    /// Maximum concurrently connected clients
    pub max_connections: usize,
    /// Largest client message accepted; larger ones get `invalidMessage`
    pub max_message_bytes: usize,
    /// Hard transport limit; a frame above it closes the socket
    pub max_frame_bytes: usize,
}

/// Matchmaking-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Configured game modes and their group sizes
    pub modes: Vec<ModeConfig>,
    /// Room id allocation attempts before room creation is aborted
    pub max_room_id_attempts: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "duel-hall".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
            metrics_interval_seconds: 15,
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_connections: 10_000,
            max_message_bytes: 64 * 1024,
            max_frame_bytes: 1024 * 1024,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            modes: default_modes(),
            max_room_id_attempts: 8,
        }
    }
}

/// Read an env var and parse it, naming the variable on failure
fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} value: {}", name, value)),
        Err(_) => Ok(None),
    }
}

/// Parse a comma separated `key:size[:ready]` mode list
pub fn parse_mode_list(value: &str) -> Result<Vec<ModeConfig>> {
    value
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            ModeConfig::parse_entry(entry).ok_or_else(|| anyhow!("Invalid mode entry: {}", entry))
        })
        .collect()
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Some(port) = parse_env("HEALTH_PORT")? {
            self.service.health_port = port;
        }
        if let Some(timeout) = parse_env("SHUTDOWN_TIMEOUT_SECONDS")? {
            self.service.shutdown_timeout_seconds = timeout;
        }
        if let Some(interval) = parse_env("METRICS_INTERVAL_SECONDS")? {
            self.service.metrics_interval_seconds = interval;
        }

        // Gateway settings
        if let Ok(host) = env::var("GATEWAY_HOST") {
            self.gateway.host = host;
        }
        if let Some(port) = parse_env("GATEWAY_PORT")? {
            self.gateway.port = port;
        }
        if let Some(max_connections) = parse_env("MAX_CONNECTIONS")? {
            self.gateway.max_connections = max_connections;
        }
        if let Some(max_bytes) = parse_env("MAX_MESSAGE_BYTES")? {
            self.gateway.max_message_bytes = max_bytes;
        }
        if let Some(max_bytes) = parse_env("MAX_FRAME_BYTES")? {
            self.gateway.max_frame_bytes = max_bytes;
        }

        // Matchmaking settings
        if let Ok(modes) = env::var("MATCHMAKING_MODES") {
            self.matchmaking.modes = parse_mode_list(&modes)?;
        }
        if let Some(attempts) = parse_env("MAX_ROOM_ID_ATTEMPTS")? {
            self.matchmaking.max_room_id_attempts = attempts;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get metrics refresh interval as Duration
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.service.metrics_interval_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.gateway.port == 0 {
        return Err(anyhow!("Gateway port cannot be 0"));
    }
    if config.gateway.port == config.service.health_port {
        return Err(anyhow!("Gateway and health ports must differ"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.service.metrics_interval_seconds == 0 {
        return Err(anyhow!("Metrics interval must be greater than 0"));
    }

    // Validate gateway limits
    if config.gateway.max_connections == 0 {
        return Err(anyhow!("Max connections must be greater than 0"));
    }
    if config.gateway.max_message_bytes == 0 {
        return Err(anyhow!("Max message size must be greater than 0"));
    }
    if config.gateway.max_frame_bytes < config.gateway.max_message_bytes {
        return Err(anyhow!(
            "Max frame size ({}) must be at least the max message size ({})",
            config.gateway.max_frame_bytes,
            config.gateway.max_message_bytes
        ));
    }

    // Validate matchmaking settings
    if config.matchmaking.modes.is_empty() {
        return Err(anyhow!("At least one game mode must be configured"));
    }
    let mut seen = HashSet::new();
    for mode in &config.matchmaking.modes {
        if !seen.insert(mode.mode) {
            return Err(anyhow!("Duplicate game mode: {}", mode.mode));
        }
        if mode.group_size < MIN_GROUP_SIZE || mode.group_size > MAX_GROUP_SIZE {
            return Err(anyhow!(
                "Group size for mode {} must be between {} and {}",
                mode.mode,
                MIN_GROUP_SIZE,
                MAX_GROUP_SIZE
            ));
        }
    }
    if config.matchmaking.max_room_id_attempts == 0 {
        return Err(anyhow!("Room id attempts must be greater than 0"));
    }

    Ok(())
}
