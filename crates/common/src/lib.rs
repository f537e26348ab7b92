//! Shared utilities: reconnect backoff, venue environment, logging setup and clocks.

mod backoff;
mod environment;
mod logging;
mod time;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use environment::{BitfinexEnvironment, ParseEnvironmentError};
pub use logging::init_logging;
pub use time::{now_ms, NonceGenerator};
