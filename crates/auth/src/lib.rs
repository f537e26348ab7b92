//! Credentials and request signing for the Bitfinex v2 API.
//!
//! API secrets are wrapped in `SecretString` so they never show up in logs.
//! `RequestSigner` produces the hex HMAC-SHA384 signatures used both by the
//! REST `bfx-signature` header and by the WebSocket `auth` event.
//!
//! # Example
//!
//! ```rust,ignore
//! use auth::{ApiCredentials, RequestSigner};
//!
//! let credentials = ApiCredentials::from_env()?;
//! let signer = RequestSigner::new(&credentials);
//! let headers = signer.sign_rest("v2/auth/r/orders", nonce, "{}");
//! ```

mod credentials;
mod error;
mod signer;

pub use credentials::{ApiCredentials, API_KEY_VAR, API_SECRET_VAR};
pub use error::AuthError;
pub use signer::{RequestSigner, SignedHeaders, WsAuthPayload};
