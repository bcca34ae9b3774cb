//! Service layer for the duel-hall matchmaking service
//!
//! This module wires the matchmaking core to the gateway and health servers
//! and manages background tasks for the running service.

pub mod app;
pub mod health;

pub use app::{AppState, Service, ServiceError};
pub use health::{ComponentCheck, HealthCheck, HealthStatus, ServiceStats};
