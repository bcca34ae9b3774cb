//! Main application state and service coordination
//!
//! `AppState` holds the shared matchmaking core. `Service` owns the network
//! servers and background tasks and drives startup and graceful shutdown.

use crate::config::AppConfig;
use crate::gateway::{CoreMessageHandler, GatewayServer, GatewayServerConfig};
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::queue::{Matchmaker, StaticModeProvider};
use crate::room::{NoopRoomHook, RoomHook, RoomManager, UuidRoomIds};
use crate::service::health::HealthCheck;
use crate::session::ConnectionManager;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },

    #[error("Shutdown error: {message}")]
    Shutdown { message: String },
}

/// Shared application state containing the matchmaking core
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Session table routing into matchmaker and rooms
    connections: ConnectionManager,

    /// Metrics collector shared by every component
    metrics: Arc<MetricsCollector>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    started_at: Instant,
}

impl AppState {
    /// Build the matchmaking core with no gameplay hook
    pub fn new(config: AppConfig) -> Result<Self, ServiceError> {
        Self::with_hook(config, Arc::new(NoopRoomHook))
    }

    /// Build the matchmaking core notifying `hook` about room lifecycle
    pub fn with_hook(config: AppConfig, hook: Arc<dyn RoomHook>) -> Result<Self, ServiceError> {
        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics = Arc::new(MetricsCollector::new().map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            }
        })?);

        let mode_provider = Arc::new(
            StaticModeProvider::with_modes(config.matchmaking.modes.clone()).map_err(|e| {
                ServiceError::Configuration {
                    message: format!("Invalid mode table: {}", e),
                }
            })?,
        );
        let rooms = RoomManager::with_options(
            Arc::new(UuidRoomIds),
            hook,
            config.matchmaking.max_room_id_attempts,
            metrics.clone(),
        );
        let matchmaker =
            Matchmaker::new(mode_provider, rooms, metrics.clone()).map_err(|e| {
                ServiceError::Initialization {
                    message: format!("Failed to initialize matchmaker: {}", e),
                }
            })?;
        let connections = ConnectionManager::new(matchmaker, metrics.clone());

        info!(
            "Matchmaking core initialized - modes: {:?}",
            config
                .matchmaking
                .modes
                .iter()
                .map(|mode| mode.mode.key())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            config,
            connections,
            metrics,
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn set_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

/// Running service: gateway, health endpoints and background tasks
pub struct Service {
    app_state: Arc<AppState>,

    /// WebSocket gateway for client sessions
    gateway: Arc<GatewayServer>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,
}

impl Service {
    /// Initialize the service with all dependencies
    pub fn new(config: AppConfig) -> Result<Self, ServiceError> {
        Self::from_state(Arc::new(AppState::new(config)?))
    }

    /// Wrap an already built core
    pub fn from_state(app_state: Arc<AppState>) -> Result<Self, ServiceError> {
        let config = app_state.config();
        info!("Initializing {} matchmaking service", config.service.name);

        let handler = Arc::new(CoreMessageHandler::new(
            app_state.connections().clone(),
            app_state.metrics(),
        ));
        let gateway = Arc::new(GatewayServer::new(
            GatewayServerConfig::from(&config.gateway),
            app_state.connections().clone(),
            handler,
        ));

        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: config.gateway.host.clone(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, app_state.metrics()).with_app_state(app_state.clone()),
        );
        let metrics_service = Arc::new(MetricsService::new(app_state.metrics(), health_server));

        Ok(Self {
            app_state,
            gateway,
            metrics_service,
            background_tasks: Vec::new(),
        })
    }

    pub fn app_state(&self) -> Arc<AppState> {
        self.app_state.clone()
    }

    /// Start the servers and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting duel-hall matchmaking service");

        let health_listener = self
            .metrics_service
            .health_server()
            .bind()
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Health server: {:#}", e),
            })?;
        let gateway_listener = self
            .gateway
            .bind()
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Gateway: {:#}", e),
            })?;

        self.app_state.set_running(true).await;

        self.start_metrics_service(health_listener);
        self.start_gateway(gateway_listener);
        self.start_background_tasks();

        info!("✅ Duel-hall matchmaking service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    ///
    /// Stops accepting sockets, disconnects every session so queues drain and
    /// rooms are abandoned, then stops background tasks and metrics.
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of duel-hall service");

        self.app_state.set_running(false).await;

        if let Err(e) = self.gateway.stop().await {
            warn!("Failed to stop gateway: {}", e);
        }

        let closed = self
            .app_state
            .connections()
            .shutdown()
            .map_err(|e| ServiceError::Shutdown {
                message: format!("Failed to close sessions: {}", e),
            })?;
        info!("✅ Closed {} sessions", closed);

        self.stop_background_tasks().await;

        info!("Stopping metrics service...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("✅ Metrics service stopped");
        }

        let connections = self.app_state.connections();
        match (connections.matchmaker().stats(), connections.rooms().stats()) {
            (Ok(matchmaker), Ok(rooms)) => info!(
                "Final service statistics: {}",
                MetricsCollector::summary(&matchmaker, &rooms)
            ),
            _ => warn!("Final service statistics unavailable"),
        }
        info!("✅ Duel-hall service shutdown completed");

        Ok(())
    }

    fn start_metrics_service(&mut self, listener: TcpListener) {
        info!(
            "Starting metrics and health endpoints on port {}",
            self.app_state.config().service.health_port
        );

        let health_server = self.metrics_service.health_server();
        let handle = tokio::spawn(async move {
            if let Err(e) = health_server.serve(listener).await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });
        self.background_tasks.push(handle);
    }

    fn start_gateway(&mut self, listener: TcpListener) {
        let gateway = self.gateway.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = gateway.serve(listener).await {
                error!("Gateway failed: {}", e);
            } else {
                info!("Gateway task completed");
            }
        });
        self.background_tasks.push(handle);
    }

    /// Start background maintenance tasks
    fn start_background_tasks(&mut self) {
        let interval = self.app_state.config().metrics_interval();
        info!(
            "Starting metrics refresh task ({}s interval)...",
            interval.as_secs()
        );

        let app_state = self.app_state.clone();
        let refresh_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            info!("Metrics refresh task started");

            while app_state.is_running().await {
                ticker.tick().await;
                refresh_metrics(app_state.clone()).await;
            }

            info!("Metrics refresh task stopped");
        });

        self.background_tasks.push(refresh_task);
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        // Let the servers observe their shutdown signal before aborting
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("Stopping {} background tasks...", task_count);
        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}

/// Push gauges that are sampled rather than event driven
async fn refresh_metrics(app_state: Arc<AppState>) {
    let metrics = app_state.metrics();
    metrics.update_uptime(app_state.uptime());

    let matchmaker = app_state.connections().matchmaker();
    for mode in matchmaker.modes() {
        match matchmaker.queue_len(mode) {
            Ok(depth) => metrics.set_queue_depth(mode, depth),
            Err(e) => warn!("Failed to sample queue {}: {}", mode, e),
        }
    }

    match HealthCheck::check(app_state).await {
        Ok(health) => {
            metrics.update_health_status(health.status.gauge_value());
            for check in &health.checks {
                metrics.update_component_health(
                    &check.name,
                    check.status != crate::service::HealthStatus::Unhealthy,
                );
            }
            debug!(
                "Updated service metrics - status: {}, sessions: {}, waiting: {}, rooms: {}",
                health.status,
                health.stats.connected_sessions,
                health.stats.players_waiting,
                health.stats.active_rooms
            );
        }
        Err(e) => warn!("Health check for metrics refresh failed: {}", e),
    }
}
