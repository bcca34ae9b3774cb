//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the duel-hall matchmaking
//! service using Prometheus metrics.

use crate::queue::MatchmakerStats;
use crate::room::RoomStats;
use crate::types::{GameMode, RoomOutcome};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the matchmaking service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue-related metrics
    queue_metrics: QueueMetrics,

    /// Room-related metrics
    room_metrics: RoomMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,

    /// Clients currently connected
    pub active_connections: IntGauge,

    /// Total client connections accepted
    pub connections_total: IntCounter,

    /// Client messages processed by event and status
    pub messages_total: IntCounterVec,
}

/// Queue-related metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Sessions currently waiting per mode
    pub players_waiting: IntGaugeVec,

    /// Total queue joins per mode
    pub queue_joins_total: IntCounterVec,

    /// Total explicit queue leaves per mode
    pub queue_leaves_total: IntCounterVec,

    /// Time spent queued before being matched
    pub queue_wait_time_seconds: HistogramVec,
}

/// Room-related metrics
#[derive(Clone)]
pub struct RoomMetrics {
    /// Rooms currently registered per mode
    pub active_rooms: IntGaugeVec,

    /// Total rooms created per mode
    pub rooms_created_total: IntCounterVec,

    /// Total rooms closed per mode and outcome
    pub rooms_closed_total: IntCounterVec,

    /// Room lifetime from creation to terminal state
    pub room_lifetime_seconds: HistogramVec,

    /// Match attempts aborted by room creation failures
    pub match_failures_total: IntCounterVec,

    /// In-room payloads relayed per mode
    pub messages_relayed_total: IntCounterVec,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Time to create one room from a popped group
    pub match_duration: Histogram,

    /// Client message processing time by event
    pub message_processing_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let room_metrics = RoomMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            room_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get queue metrics
    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    /// Get room metrics
    pub fn room(&self) -> &RoomMetrics {
        &self.room_metrics
    }

    /// Get performance metrics
    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Log-friendly snapshot of matchmaker and room totals
    pub fn summary(matchmaker: &MatchmakerStats, rooms: &RoomStats) -> String {
        format!(
            "queued_total={} waiting={} matches={} match_failures={} active_rooms={} completed={} abandoned={}",
            matchmaker.players_queued_total,
            matchmaker.players_waiting,
            matchmaker.matches_made,
            matchmaker.match_failures,
            rooms.active_rooms,
            rooms.rooms_completed,
            rooms.rooms_abandoned
        )
    }

    /// Record a session joining a mode queue
    pub fn record_queue_join(&self, mode: GameMode) {
        self.queue_metrics
            .queue_joins_total
            .with_label_values(&[&mode.to_string()])
            .inc();
    }

    /// Record a session leaving a mode queue before being matched
    pub fn record_queue_leave(&self, mode: GameMode) {
        self.queue_metrics
            .queue_leaves_total
            .with_label_values(&[&mode.to_string()])
            .inc();
    }

    /// Set the current depth of a mode queue
    pub fn set_queue_depth(&self, mode: GameMode, depth: usize) {
        self.queue_metrics
            .players_waiting
            .with_label_values(&[&mode.to_string()])
            .set(depth as i64);
    }

    /// Record a group matched into a room
    pub fn record_match(&self, mode: GameMode, waits: &[Duration], duration: Duration) {
        let mode_str = mode.to_string();
        for wait in waits {
            self.queue_metrics
                .queue_wait_time_seconds
                .with_label_values(&[&mode_str])
                .observe(wait.as_secs_f64());
        }

        self.performance_metrics
            .match_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a match aborted by room creation failure
    pub fn record_match_failure(&self, mode: GameMode) {
        self.room_metrics
            .match_failures_total
            .with_label_values(&[&mode.to_string()])
            .inc();
    }

    /// Record a room being created
    pub fn record_room_created(&self, mode: GameMode) {
        let mode_str = mode.to_string();

        self.room_metrics
            .rooms_created_total
            .with_label_values(&[&mode_str])
            .inc();

        self.room_metrics
            .active_rooms
            .with_label_values(&[&mode_str])
            .inc();
    }

    /// Record a room reaching a terminal state
    pub fn record_room_closed(&self, mode: GameMode, outcome: RoomOutcome, lifetime: Duration) {
        let mode_str = mode.to_string();

        self.room_metrics
            .rooms_closed_total
            .with_label_values(&[&mode_str, outcome.label()])
            .inc();

        self.room_metrics
            .active_rooms
            .with_label_values(&[&mode_str])
            .dec();

        self.room_metrics
            .room_lifetime_seconds
            .with_label_values(&[outcome.label()])
            .observe(lifetime.as_secs_f64());
    }

    /// Record an in-room payload relayed
    pub fn record_room_message(&self, mode: GameMode) {
        self.room_metrics
            .messages_relayed_total
            .with_label_values(&[&mode.to_string()])
            .inc();
    }

    /// Record a client connection being accepted
    pub fn record_connection_opened(&self) {
        self.service_metrics.connections_total.inc();
        self.service_metrics.active_connections.inc();
    }

    /// Record a client session being cleaned up
    pub fn record_connection_closed(&self) {
        self.service_metrics.active_connections.dec();
    }

    /// Record a client message being processed
    pub fn record_client_message(&self, event: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .messages_total
            .with_label_values(&[event, status])
            .inc();

        self.performance_metrics
            .message_processing_duration
            .with_label_values(&[event])
            .observe(duration.as_secs_f64());
    }

    /// Update service uptime
    pub fn update_uptime(&self, uptime: Duration) {
        self.service_metrics
            .uptime_seconds
            .set(uptime.as_secs() as i64);
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("duel_hall_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "duel_hall_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("duel_hall_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        let active_connections = IntGauge::new(
            "duel_hall_active_connections",
            "Clients currently connected",
        )?;
        registry.register(Box::new(active_connections.clone()))?;

        let connections_total = IntCounter::new(
            "duel_hall_connections_total",
            "Total client connections accepted",
        )?;
        registry.register(Box::new(connections_total.clone()))?;

        let messages_total = IntCounterVec::new(
            Opts::new(
                "duel_hall_client_messages_total",
                "Client messages processed",
            ),
            &["event", "status"],
        )?;
        registry.register(Box::new(messages_total.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
            active_connections,
            connections_total,
            messages_total,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let players_waiting = IntGaugeVec::new(
            Opts::new(
                "duel_hall_players_waiting",
                "Players currently waiting in queue",
            ),
            &["mode"],
        )?;
        registry.register(Box::new(players_waiting.clone()))?;

        let queue_joins_total = IntCounterVec::new(
            Opts::new("duel_hall_queue_joins_total", "Total queue joins"),
            &["mode"],
        )?;
        registry.register(Box::new(queue_joins_total.clone()))?;

        let queue_leaves_total = IntCounterVec::new(
            Opts::new("duel_hall_queue_leaves_total", "Total queue leaves"),
            &["mode"],
        )?;
        registry.register(Box::new(queue_leaves_total.clone()))?;

        let queue_wait_time_seconds = HistogramVec::new(
            HistogramOpts::new(
                "duel_hall_queue_wait_time_seconds",
                "Player queue wait time",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
            &["mode"],
        )?;
        registry.register(Box::new(queue_wait_time_seconds.clone()))?;

        Ok(Self {
            players_waiting,
            queue_joins_total,
            queue_leaves_total,
            queue_wait_time_seconds,
        })
    }
}

impl RoomMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_rooms = IntGaugeVec::new(
            Opts::new("duel_hall_active_rooms", "Number of active rooms"),
            &["mode"],
        )?;
        registry.register(Box::new(active_rooms.clone()))?;

        let rooms_created_total = IntCounterVec::new(
            Opts::new("duel_hall_rooms_created_total", "Total rooms created"),
            &["mode"],
        )?;
        registry.register(Box::new(rooms_created_total.clone()))?;

        let rooms_closed_total = IntCounterVec::new(
            Opts::new("duel_hall_rooms_closed_total", "Total rooms closed"),
            &["mode", "outcome"],
        )?;
        registry.register(Box::new(rooms_closed_total.clone()))?;

        let room_lifetime_seconds = HistogramVec::new(
            HistogramOpts::new("duel_hall_room_lifetime_seconds", "Room lifetime")
                .buckets(vec![1.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(room_lifetime_seconds.clone()))?;

        let match_failures_total = IntCounterVec::new(
            Opts::new(
                "duel_hall_match_failures_total",
                "Match attempts aborted by room creation failures",
            ),
            &["mode"],
        )?;
        registry.register(Box::new(match_failures_total.clone()))?;

        let messages_relayed_total = IntCounterVec::new(
            Opts::new(
                "duel_hall_room_messages_relayed_total",
                "In-room payloads relayed",
            ),
            &["mode"],
        )?;
        registry.register(Box::new(messages_relayed_total.clone()))?;

        Ok(Self {
            active_rooms,
            rooms_created_total,
            rooms_closed_total,
            room_lifetime_seconds,
            match_failures_total,
            messages_relayed_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let match_duration = Histogram::with_opts(
            HistogramOpts::new(
                "duel_hall_match_duration_seconds",
                "Room creation time per matched group",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        registry.register(Box::new(match_duration.clone()))?;

        let message_processing_duration = HistogramVec::new(
            HistogramOpts::new(
                "duel_hall_message_processing_duration_seconds",
                "Client message processing time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
            &["event"],
        )?;
        registry.register(Box::new(message_processing_duration.clone()))?;

        Ok(Self {
            match_duration,
            message_processing_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        // Test that we can access all metric groups
        let _service = collector.service();
        let _queue = collector.queue();
        let _room = collector.room();
        let _performance = collector.performance();
    }

    #[test]
    fn test_queue_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        let mode = GameMode::new(0);

        collector.record_queue_join(mode);
        collector.record_queue_join(mode);
        collector.record_queue_leave(mode);
        collector.set_queue_depth(mode, 1);

        let queue = collector.queue();
        assert_eq!(queue.queue_joins_total.with_label_values(&["0"]).get(), 2);
        assert_eq!(queue.queue_leaves_total.with_label_values(&["0"]).get(), 1);
        assert_eq!(queue.players_waiting.with_label_values(&["0"]).get(), 1);
    }

    #[test]
    fn test_room_lifecycle_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        let mode = GameMode::new(2);

        collector.record_match(
            mode,
            &[Duration::from_millis(250), Duration::from_millis(10)],
            Duration::from_micros(40),
        );
        collector.record_room_created(mode);
        collector.record_room_created(mode);
        collector.record_room_closed(mode, RoomOutcome::Completed, Duration::from_secs(90));

        let room = collector.room();
        assert_eq!(room.rooms_created_total.with_label_values(&["2"]).get(), 2);
        assert_eq!(room.active_rooms.with_label_values(&["2"]).get(), 1);
        assert_eq!(
            room.rooms_closed_total
                .with_label_values(&["2", "completed"])
                .get(),
            1
        );
        assert_eq!(
            collector
                .queue()
                .queue_wait_time_seconds
                .with_label_values(&["2"])
                .get_sample_count(),
            2
        );
    }

    #[test]
    fn test_connection_and_message_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_connection_opened();
        collector.record_connection_opened();
        collector.record_connection_closed();
        collector.record_client_message("joinQueue", true, Duration::from_micros(80));
        collector.record_client_message("joinQueue", false, Duration::from_micros(20));

        let service = collector.service();
        assert_eq!(service.active_connections.get(), 1);
        assert_eq!(service.connections_total.get(), 2);
        assert_eq!(
            service
                .messages_total
                .with_label_values(&["joinQueue", "error"])
                .get(),
            1
        );
    }

    #[test]
    fn test_health_status_updates() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.update_health_status(2); // Healthy
        collector.update_component_health("matchmaker", true);
        collector.update_component_health("gateway", false);
        collector.update_uptime(Duration::from_secs(42));

        assert_eq!(collector.service().uptime_seconds.get(), 42);
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.elapsed();

        assert!(duration >= Duration::from_millis(10));

        let final_duration = timer.stop();
        assert!(final_duration >= Duration::from_millis(10));
    }
}
