//! Venue-independent pieces of the streaming connection: lifecycle states,
//! configuration, errors and the handle other components talk through.

mod handle;
mod state;

use common::BackoffConfig;
use std::time::Duration;
use thiserror::Error;

pub use handle::{
    connection_channels, ConnectionHandle, ManagerCommand, ManagerEndpoints, OutboundRequest,
    StreamNotification,
};
pub use state::{ConnectionState, StateMachine, StateTransition};

#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("No heartbeat for {0:?}")]
    HeartbeatTimeout(Duration),

    #[error("Not connected")]
    NotConnected,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Connection closed")]
    ConnectionClosed,
}

impl ConnectorError {
    /// Errors that end the manager instead of triggering a reconnect.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::ChannelClosed)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum silence on a connected session before it is considered dead.
    pub heartbeat_interval: Duration,
    /// Timeout for opening the transport.
    pub connect_timeout: Duration,
    /// Timeout for the authentication reply.
    pub auth_timeout: Duration,
    /// Reconnect backoff.
    pub backoff: BackoffConfig,
    /// A session lasting this long resets the backoff.
    pub stable_connection_threshold: Duration,
    /// Buffer capacity for commands and notification broadcasts.
    pub channel_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
            stable_connection_threshold: Duration::from_secs(300),
            channel_capacity: 1024,
        }
    }
}
