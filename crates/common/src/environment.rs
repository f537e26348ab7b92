//! Bitfinex environment configuration.
//!
//! Paper trading runs against the same endpoints as production but only
//! accepts the `TEST` pairs, so the environment also decides which symbols
//! are tradable.

use std::fmt;
use std::str::FromStr;

/// Bitfinex account environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitfinexEnvironment {
    /// Real account.
    #[default]
    Production,
    /// Paper trading sub-account.
    Paper,
}

impl BitfinexEnvironment {
    /// Base URL for authenticated REST endpoints.
    pub fn rest_auth_url(&self) -> &'static str {
        "https://api.bitfinex.com"
    }

    /// Base URL for public REST endpoints.
    pub fn rest_public_url(&self) -> &'static str {
        "https://api-pub.bitfinex.com"
    }

    /// WebSocket URL for the authenticated v2 stream.
    pub fn ws_url(&self) -> &'static str {
        "wss://api.bitfinex.com/ws/2"
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_paper(&self) -> bool {
        matches!(self, Self::Paper)
    }

    /// Whether a trading pair can be traded in this environment.
    pub fn allows_symbol(&self, symbol: &str) -> bool {
        let is_test_pair = symbol.starts_with("tTEST");
        match self {
            Self::Production => !is_test_pair,
            Self::Paper => is_test_pair,
        }
    }

    /// Load environment from `BFX_ENVIRONMENT` env var.
    ///
    /// Returns `Production` if not set or invalid.
    pub fn from_env() -> Self {
        std::env::var("BFX_ENVIRONMENT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for BitfinexEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Paper => write!(f, "paper"),
        }
    }
}

impl FromStr for BitfinexEnvironment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" | "live" => Ok(Self::Production),
            "paper" | "test" | "sandbox" => Ok(Self::Paper),
            _ => Err(ParseEnvironmentError(s.to_string())),
        }
    }
}

/// Error parsing environment string.
#[derive(Debug, Clone)]
pub struct ParseEnvironmentError(String);

impl fmt::Display for ParseEnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid environment '{}', expected 'production' or 'paper'",
            self.0
        )
    }
}

impl std::error::Error for ParseEnvironmentError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_shared_between_environments() {
        for env in [BitfinexEnvironment::Production, BitfinexEnvironment::Paper] {
            assert_eq!(env.rest_auth_url(), "https://api.bitfinex.com");
            assert_eq!(env.rest_public_url(), "https://api-pub.bitfinex.com");
            assert_eq!(env.ws_url(), "wss://api.bitfinex.com/ws/2");
        }
    }

    #[test]
    fn test_symbol_gating() {
        assert!(BitfinexEnvironment::Production.allows_symbol("tBTCUSD"));
        assert!(!BitfinexEnvironment::Production.allows_symbol("tTESTBTC:TESTUSD"));
        assert!(BitfinexEnvironment::Paper.allows_symbol("tTESTBTC:TESTUSD"));
        assert!(!BitfinexEnvironment::Paper.allows_symbol("tBTCUSD"));
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "PROD".parse::<BitfinexEnvironment>().unwrap(),
            BitfinexEnvironment::Production
        );
        assert_eq!(
            "paper".parse::<BitfinexEnvironment>().unwrap(),
            BitfinexEnvironment::Paper
        );
        assert_eq!(
            "Sandbox".parse::<BitfinexEnvironment>().unwrap(),
            BitfinexEnvironment::Paper
        );
        assert!("testnet2".parse::<BitfinexEnvironment>().is_err());
    }

    #[test]
    fn test_default_and_display() {
        assert_eq!(
            BitfinexEnvironment::default(),
            BitfinexEnvironment::Production
        );
        assert_eq!(BitfinexEnvironment::Paper.to_string(), "paper");
        assert!(BitfinexEnvironment::Paper.is_paper());
        assert!(!BitfinexEnvironment::Paper.is_production());
    }
}
