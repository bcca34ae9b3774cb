//! WebSocket gateway for client sessions
//!
//! This module exposes the matchmaking core to clients over WebSocket, one
//! session per socket, with JSON frames tagged by event name.

pub mod handlers;
pub mod messages;
pub mod server;

pub use handlers::{CoreMessageHandler, MessageHandler};
pub use messages::{MessageUtils, GATEWAY_PATH};
pub use server::{ConnectParams, GatewayServer, GatewayServerConfig};
