use crate::error::AuthError;
use secrecy::{ExposeSecret, SecretString};

/// Environment variable holding the Bitfinex API key.
pub const API_KEY_VAR: &str = "BFX_API_KEY";
/// Environment variable holding the Bitfinex API secret.
pub const API_SECRET_VAR: &str = "BFX_API_SECRET";

/// A Bitfinex API key pair.
///
/// The secret only leaves this type through [`expose_secret`](Self::expose_secret),
/// which the signer calls when computing an HMAC.
#[derive(Clone)]
pub struct ApiCredentials {
    api_key: String,
    api_secret: SecretString,
}

impl ApiCredentials {
    /// Read `BFX_API_KEY` and `BFX_API_SECRET`, after loading `.env` if present.
    pub fn from_env() -> Result<Self, AuthError> {
        dotenvy::dotenv().ok();
        Self::from_vars(API_KEY_VAR, API_SECRET_VAR)
    }

    /// Read the key pair from the named variables.
    pub fn from_vars(key_var: &str, secret_var: &str) -> Result<Self, AuthError> {
        let api_key = required(key_var)?;
        let api_secret = required(secret_var)?;
        Self::checked(api_key, api_secret)
    }

    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret: SecretString::from(api_secret),
        }
    }

    fn checked(api_key: String, api_secret: String) -> Result<Self, AuthError> {
        if api_key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(AuthError::InvalidKeyFormat);
        }
        Ok(Self::new(api_key, api_secret))
    }

    /// The public key, sent as `bfx-apikey` and in the WebSocket `auth` event.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// First characters of the key, for log lines.
    pub fn key_hint(&self) -> String {
        let prefix: String = self.api_key.chars().take(4).collect();
        format!("{}…", prefix)
    }

    /// Raw secret for HMAC computation only.
    pub fn expose_secret(&self) -> &str {
        self.api_secret.expose_secret()
    }
}

fn required(name: &str) -> Result<String, AuthError> {
    let value = std::env::var(name).map_err(|_| AuthError::MissingEnvVar(name.to_string()))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(AuthError::EmptyEnvVar(name.to_string()));
    }
    Ok(value.to_string())
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.key_hint())
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_var_reported_by_name() {
        let err = ApiCredentials::from_vars("BFX_TEST_KEY_NEVER_SET", "BFX_TEST_SECRET_NEVER_SET").unwrap_err();
        assert!(matches!(err, AuthError::MissingEnvVar(ref name) if name == "BFX_TEST_KEY_NEVER_SET"));
    }

    #[test]
    fn test_key_with_whitespace_rejected() {
        assert!(matches!(
            ApiCredentials::checked("abc def".into(), "secret".into()),
            Err(AuthError::InvalidKeyFormat)
        ));
        assert!(ApiCredentials::checked("abcdef".into(), "secret".into()).is_ok());
    }

    #[test]
    fn test_debug_hides_secret_and_most_of_key() {
        let creds = ApiCredentials::new("keyABCDEFGH".into(), "super_secret_key".into());
        let debug = format!("{:?}", creds);

        assert!(debug.contains("keyA…"));
        assert!(!debug.contains("keyABCDEFGH"));
        assert!(!debug.contains("super_secret_key"));
        assert_eq!(creds.expose_secret(), "super_secret_key");
    }
}
