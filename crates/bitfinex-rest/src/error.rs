//! Bitfinex REST API error types.

use execution_core::VenueError;
use rest_client::RestError;
use thiserror::Error;

/// Errors that can occur when interacting with the Bitfinex REST API.
#[derive(Debug, Error)]
pub enum BitfinexRestError {
    /// REST client error (network, timeout, etc.).
    #[error("REST client error: {0}")]
    Rest(#[from] RestError),

    /// Bitfinex API error (returned by the exchange).
    #[error("Bitfinex API error {code}: {message}")]
    ApiError { code: i64, message: String },

    /// API key, signature or nonce refused.
    #[error("Authentication error {code}: {message}")]
    Authentication { code: i64, message: String },

    /// Order not found.
    #[error("Order not found")]
    OrderNotFound,

    /// Unexpected response shape.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl BitfinexRestError {
    /// Parse a Bitfinex error body.
    ///
    /// Bitfinex returns errors as `["error", 10020, "price: invalid"]`, usually
    /// with HTTP 500.
    pub fn from_api_response(body: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        let fields = value.as_array()?;
        if fields.first().and_then(|v| v.as_str()) != Some("error") {
            return None;
        }
        let code = fields.get(1).and_then(|v| v.as_i64()).unwrap_or_default();
        let message = fields
            .get(2)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Some(Self::classify_api_error(code, message))
    }

    fn classify_api_error(code: i64, message: String) -> Self {
        let lower = message.to_ascii_lowercase();
        if code == 10100 || code == 10114 || lower.starts_with("apikey") || lower.starts_with("nonce") {
            Self::Authentication { code, message }
        } else if lower.contains("not found") {
            Self::OrderNotFound
        } else {
            Self::ApiError { code, message }
        }
    }

    /// Check if this error indicates the operation should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rest(rest_err) => rest_err.is_retryable(),
            // Ratelimit and maintenance
            Self::ApiError { code, .. } => matches!(code, 11010 | 20060),
            _ => false,
        }
    }

    /// Lift venue error payloads out of plain HTTP errors.
    pub(crate) fn from_rest(err: RestError) -> Self {
        if let RestError::Status { body, .. } = &err {
            if let Some(api) = Self::from_api_response(body) {
                return api;
            }
        }
        Self::Rest(err)
    }
}

impl From<BitfinexRestError> for VenueError {
    fn from(err: BitfinexRestError) -> Self {
        match err {
            BitfinexRestError::Rest(RestError::Timeout) => VenueError::Timeout,
            BitfinexRestError::Rest(RestError::Parse(msg)) => VenueError::Decode(msg),
            BitfinexRestError::Rest(other) => VenueError::Transport(other.to_string()),
            BitfinexRestError::Authentication { message, .. } => VenueError::Authentication(message),
            BitfinexRestError::ApiError { code, message } if matches!(code, 11010 | 20060) => {
                VenueError::Transport(message)
            }
            BitfinexRestError::ApiError { message, .. } => VenueError::Rejected { reason: message },
            BitfinexRestError::OrderNotFound => VenueError::Rejected {
                reason: "order not found".to_string(),
            },
            BitfinexRestError::Decode(msg) => VenueError::Decode(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_body() {
        let err = BitfinexRestError::from_api_response(r#"["error",10001,"Invalid price"]"#).unwrap();
        assert!(matches!(err, BitfinexRestError::ApiError { code: 10001, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_auth_errors_classified() {
        let err = BitfinexRestError::from_api_response(r#"["error",10100,"apikey: digest invalid"]"#).unwrap();
        assert!(matches!(err, BitfinexRestError::Authentication { .. }));
        assert!(matches!(VenueError::from(err), VenueError::Authentication(_)));

        let err = BitfinexRestError::from_api_response(r#"["error",10114,"nonce: small"]"#).unwrap();
        assert!(matches!(err, BitfinexRestError::Authentication { .. }));
    }

    #[test]
    fn test_not_found_classified() {
        let err = BitfinexRestError::from_api_response(r#"["error",10001,"Order not found."]"#).unwrap();
        assert!(matches!(err, BitfinexRestError::OrderNotFound));
    }

    #[test]
    fn test_non_error_body_ignored() {
        assert!(BitfinexRestError::from_api_response("<html>bad gateway</html>").is_none());
        assert!(BitfinexRestError::from_api_response(r#"[1,2,3]"#).is_none());
    }

    #[test]
    fn test_http_error_lifted() {
        let err = BitfinexRestError::from_rest(RestError::Status {
            status: 500,
            body: r#"["error",10001,"Invalid amount"]"#.into(),
        });
        assert!(matches!(err, BitfinexRestError::ApiError { .. }));

        let err = BitfinexRestError::from_rest(RestError::Status {
            status: 502,
            body: "bad gateway".into(),
        });
        assert!(matches!(err, BitfinexRestError::Rest(_)));
    }

    #[test]
    fn test_venue_error_mapping() {
        assert!(matches!(
            VenueError::from(BitfinexRestError::Rest(RestError::Timeout)),
            VenueError::Timeout
        ));
        assert!(VenueError::from(BitfinexRestError::ApiError {
            code: 20060,
            message: "maintenance".into()
        })
        .is_retryable());
    }
}
