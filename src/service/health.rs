//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for the duel-hall
//! matchmaking service, including readiness and liveness probes.

use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Share of the connection limit above which the gateway reports degraded
const CONNECTION_PRESSURE_RATIO: f64 = 0.9;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported as `duel_hall_health_status`
    pub fn gauge_value(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn worst(self, other: &HealthStatus) -> HealthStatus {
        match (&self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Sessions currently connected
    pub connected_sessions: usize,
    /// Sessions waiting in any mode queue
    pub players_waiting: usize,
    /// Rooms currently registered
    pub active_rooms: usize,
    /// Rooms created since service start
    pub rooms_created: u64,
    /// Rooms completed since service start
    pub rooms_completed: u64,
    /// Rooms abandoned since service start
    pub rooms_abandoned: u64,
    /// Groups matched since service start
    pub matches_made: u64,
    /// Service uptime in seconds
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(&app_state).await,
            Self::check_matchmaker(&app_state),
            Self::check_rooms(&app_state),
            Self::check_connections(&app_state),
        ];

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |status, check| status.worst(&check.status));
        let stats = Self::gather_service_stats(&app_state);

        Ok(HealthCheck {
            status,
            service: app_state.config().service.name.clone(),
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can accept sessions
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        let status = Self::check_matchmaker(&app_state)
            .status
            .worst(&Self::check_connections(&app_state).status);
        Ok(status)
    }

    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        component("service_running", status, message, start)
    }

    fn check_matchmaker(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match app_state.connections().matchmaker().stats() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Matchmaker stats check failed: {}", e);
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Stats check failed: {}", e)),
                )
            }
        };

        component("matchmaker", status, message, start)
    }

    fn check_rooms(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match app_state.connections().rooms().registry().len() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Room registry check failed: {}", e);
                (
                    HealthStatus::Degraded,
                    Some(format!("Registry check failed: {}", e)),
                )
            }
        };

        component("rooms", status, message, start)
    }

    fn check_connections(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();
        let limit = app_state.config().gateway.max_connections;

        let (status, message) = match app_state.connections().connected_count() {
            Ok(connected) if connected as f64 >= limit as f64 * CONNECTION_PRESSURE_RATIO => (
                HealthStatus::Degraded,
                Some(format!("{} of {} connections in use", connected, limit)),
            ),
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => (
                HealthStatus::Unhealthy,
                Some(format!("Cannot access session table: {}", e)),
            ),
        };

        component("connections", status, message, start)
    }

    fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let connections = app_state.connections();
        let mut stats = ServiceStats {
            uptime_seconds: app_state.uptime().as_secs(),
            ..ServiceStats::default()
        };

        match connections.connected_count() {
            Ok(connected) => stats.connected_sessions = connected,
            Err(e) => debug!("Failed to count sessions for health check: {}", e),
        }
        match connections.matchmaker().stats() {
            Ok(matchmaker) => {
                stats.players_waiting = matchmaker.players_waiting;
                stats.matches_made = matchmaker.matches_made;
            }
            Err(e) => debug!("Failed to get matchmaker stats for health check: {}", e),
        }
        match connections.rooms().stats() {
            Ok(rooms) => {
                stats.active_rooms = rooms.active_rooms;
                stats.rooms_created = rooms.rooms_created;
                stats.rooms_completed = rooms.rooms_completed;
                stats.rooms_abandoned = rooms.rooms_abandoned;
            }
            Err(e) => debug!("Failed to get room stats for health check: {}", e),
        }

        stats
    }
}

fn component(
    name: &str,
    status: HealthStatus,
    message: Option<String>,
    start: std::time::Instant,
) -> ComponentCheck {
    ComponentCheck {
        name: name.to_string(),
        status,
        message,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

/// Convert health check to JSON string
impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[tokio::test]
    async fn test_health_follows_running_flag() {
        let app_state = Arc::new(AppState::new(AppConfig::default()).unwrap());

        assert_eq!(
            HealthCheck::liveness_check(app_state.clone()).await.unwrap(),
            HealthStatus::Unhealthy
        );

        app_state.set_running(true).await;
        let health = HealthCheck::check(app_state.clone()).await.unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.service, "duel-hall");
        assert_eq!(health.checks.len(), 4);
        assert_eq!(
            HealthCheck::readiness_check(app_state).await.unwrap(),
            HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_stats_reflect_core() {
        let app_state = Arc::new(AppState::new(AppConfig::default()).unwrap());
        app_state.set_running(true).await;

        let connections = app_state.connections();
        let sender = crate::session::testing::RecordingSender::new();
        let handle = connections.connect(None, sender).unwrap();
        connections
            .join_queue(handle.session_id(), crate::types::GameMode::new(1))
            .unwrap();

        let health = HealthCheck::check(app_state).await.unwrap();
        assert_eq!(health.stats.connected_sessions, 1);
        assert_eq!(health.stats.players_waiting, 1);
        assert_eq!(health.stats.active_rooms, 0);
        assert!(health.to_json().unwrap().contains("\"players_waiting\": 1"));
    }

    #[tokio::test]
    async fn test_connection_pressure_degrades() {
        let mut config = AppConfig::default();
        config.gateway.max_connections = 1;
        let app_state = Arc::new(AppState::new(config).unwrap());
        app_state.set_running(true).await;

        let _handle = app_state
            .connections()
            .connect(None, crate::session::testing::RecordingSender::new())
            .unwrap();

        assert_eq!(
            HealthCheck::check(app_state).await.unwrap().status,
            HealthStatus::Degraded
        );
    }

    #[test]
    fn test_status_ordering() {
        assert_eq!(
            HealthStatus::Healthy.worst(&HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Degraded.worst(&HealthStatus::Unhealthy),
            HealthStatus::Unhealthy
        );
        assert_eq!(HealthStatus::Healthy.gauge_value(), 2);
    }
}
