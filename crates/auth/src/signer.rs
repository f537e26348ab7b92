//! HMAC-SHA384 request signing for the Bitfinex v2 API.

use crate::credentials::ApiCredentials;
use hmac::{Hmac, Mac};
use sha2::Sha384;

type HmacSha384 = Hmac<Sha384>;

/// Headers attached to an authenticated REST call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub nonce: String,
    pub api_key: String,
    pub signature: String,
}

impl SignedHeaders {
    pub fn as_pairs(&self) -> [(&'static str, &str); 3] {
        [
            ("bfx-nonce", self.nonce.as_str()),
            ("bfx-apikey", self.api_key.as_str()),
            ("bfx-signature", self.signature.as_str()),
        ]
    }
}

/// Fields of the WebSocket `auth` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsAuthPayload {
    pub api_key: String,
    pub nonce: String,
    pub payload: String,
    pub signature: String,
}

/// Request signer for authenticated Bitfinex calls.
pub struct RequestSigner<'a> {
    credentials: &'a ApiCredentials,
}

impl<'a> RequestSigner<'a> {
    pub fn new(credentials: &'a ApiCredentials) -> Self {
        Self { credentials }
    }

    /// Hex-encoded HMAC-SHA384 of `message` keyed with the API secret.
    pub fn sign(&self, message: &str) -> String {
        let mut mac = HmacSha384::new_from_slice(self.credentials.expose_secret().as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Sign a REST call.
    ///
    /// The signed message is `/api/{path}{nonce}{body}` where `path` has no
    /// leading slash, e.g. `v2/auth/w/order/submit`.
    pub fn sign_rest(&self, path: &str, nonce: u64, body: &str) -> SignedHeaders {
        let path = path.trim_start_matches('/');
        let nonce = nonce.to_string();
        let message = format!("/api/{}{}{}", path, nonce, body);
        SignedHeaders {
            signature: self.sign(&message),
            nonce,
            api_key: self.credentials.api_key().to_string(),
        }
    }

    /// Build the payload for the WebSocket `auth` event (`AUTH{nonce}`).
    pub fn sign_ws_auth(&self, nonce: u64) -> WsAuthPayload {
        let nonce = nonce.to_string();
        let payload = format!("AUTH{}", nonce);
        WsAuthPayload {
            signature: self.sign(&payload),
            api_key: self.credentials.api_key().to_string(),
            nonce,
            payload,
        }
    }
}
