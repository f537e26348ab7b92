//! JSON REST plumbing shared by the venue clients.
//!
//! - `RestError` with retry classification
//! - GET with query strings and POST with a pre-serialized JSON body, so
//!   callers can sign the exact bytes sent
//! - header injection for authentication
//! - 429 detection honouring `Retry-After`
//!
//! # Example
//!
//! ```rust,ignore
//! use rest_client::RestClient;
//!
//! let client = RestClient::with_default_timeout("https://api-pub.bitfinex.com")?;
//! let status: Vec<i64> = client.get("/v2/platform/status", None, &[]).await?;
//! ```

mod client;
mod error;

pub use client::RestClient;
pub use error::RestError;
