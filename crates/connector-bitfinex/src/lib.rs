//! Bitfinex v2 authenticated WebSocket connector.
//!
//! [`ConnectionManager`] runs as a single task that owns the socket. It
//! authenticates with the account credentials, decodes account and ticker
//! frames into `VenueEvent`s and reconnects with exponential backoff.
//! Other components use the returned `ConnectionHandle`.
//!
//! # Example
//!
//! ```rust,ignore
//! let (manager, handle) = ConnectionManager::for_environment(
//!     BitfinexEnvironment::Production,
//!     ApiCredentials::from_env()?,
//!     ConnectionConfig::default(),
//!     create_metrics(),
//! );
//! tokio::spawn(manager.run());
//! let mut events = handle.subscribe();
//! ```

mod manager;
mod protocol;
mod transport;

pub use manager::ConnectionManager;
pub use protocol::{encode_auth, encode_subscribe_ticker, encode_update, Frame, FrameDecoder, INFO_RECONNECT};
pub use transport::{StreamTransport, TransportMessage, WsTransport};
