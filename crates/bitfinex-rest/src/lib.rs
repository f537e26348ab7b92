//! Bitfinex v2 REST API client.
//!
//! - **Order management**: post-only submit, cancel, in-place update and the
//!   open-order snapshot, all HMAC-SHA384 signed
//! - **Market data**: best bid/ask from the public ticker
//! - **Decoders**: positional order and notification arrays, shared with the
//!   WebSocket connector
//!
//! `BitfinexRestClient` implements `execution_core::VenueClient`; business
//! refusals become `Rejected` results, transport failures become errors.
//!
//! # Example
//!
//! ```rust,ignore
//! use auth::ApiCredentials;
//! use bitfinex_rest::BitfinexRestClient;
//!
//! let client = BitfinexRestClient::new(ApiCredentials::from_env()?)?;
//! let top = client.ticker("tBTCUSD").await?;
//! let open = client.open_orders().await?;
//! ```

mod client;
mod error;
mod responses;

pub use client::{BitfinexRestClient, POST_ONLY_FLAG};
pub use error::BitfinexRestError;
pub use responses::{decimal_at, decode_order, decode_orders, decode_ticker, map_order_status, Notification};
