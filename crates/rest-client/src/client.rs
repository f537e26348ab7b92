//! Thin JSON-over-HTTP wrapper around reqwest.

use crate::error::RestError;
use reqwest::{header::RETRY_AFTER, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fallback wait when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_MS: u64 = 60_000;

/// REST client bound to one base URL.
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    /// Create a new REST client with the given base URL and request timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RestError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RestError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a new REST client with default timeout.
    pub fn with_default_timeout(base_url: &str) -> Result<Self, RestError> {
        Self::new(base_url, DEFAULT_TIMEOUT)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` and decode the JSON body.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<T, RestError> {
        let url = self.build_url(path, query);
        tracing::debug!(url = %url, "GET request");

        let request = with_headers(self.client.get(&url), headers);
        let response = request.send().await?;
        handle_response(response).await
    }

    /// POST a pre-serialized JSON body.
    ///
    /// The body is passed as a string because authenticated venues sign the
    /// exact bytes that go on the wire.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &str,
        headers: &[(&str, &str)],
    ) -> Result<T, RestError> {
        let url = self.build_url(path, None);
        tracing::debug!(url = %url, body_len = body.len(), "POST request");

        let request = with_headers(self.client.post(&url), headers)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string());
        let response = request.send().await?;
        handle_response(response).await
    }

    fn build_url(&self, path: &str, query: Option<&str>) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, path, q),
            _ => format!("{}{}", self.base_url, path),
        }
    }
}

fn with_headers(mut request: RequestBuilder, headers: &[(&str, &str)]) -> RequestBuilder {
    for (key, value) in headers {
        request = request.header(*key, *value);
    }
    request
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, RestError> {
    let status = response.status();

    if status.as_u16() == 429 {
        let retry_after_ms = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after_ms)
            .unwrap_or(DEFAULT_RETRY_AFTER_MS);
        return Err(RestError::RateLimited { retry_after_ms });
    }

    let body = response.text().await?;

    if status.is_success() {
        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(body = %body, error = %e, "Failed to parse response");
            RestError::Parse(e.to_string())
        })
    } else {
        Err(RestError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// `Retry-After` in delta-seconds form; HTTP-date values are ignored.
fn parse_retry_after_ms(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok().map(|secs| secs * 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_no_query() {
        let client = RestClient::with_default_timeout("https://api.example.com").unwrap();
        assert_eq!(
            client.build_url("/v2/platform/status", None),
            "https://api.example.com/v2/platform/status"
        );
    }

    #[test]
    fn test_build_url_adds_leading_slash() {
        let client = RestClient::with_default_timeout("https://api.example.com/").unwrap();
        assert_eq!(
            client.build_url("v2/auth/r/orders", None),
            "https://api.example.com/v2/auth/r/orders"
        );
    }

    #[test]
    fn test_build_url_with_query() {
        let client = RestClient::with_default_timeout("https://api.example.com").unwrap();
        assert_eq!(
            client.build_url("/v2/tickers", Some("symbols=tBTCUSD")),
            "https://api.example.com/v2/tickers?symbols=tBTCUSD"
        );
        assert_eq!(
            client.build_url("/v2/tickers", Some("")),
            "https://api.example.com/v2/tickers"
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after_ms("5"), Some(5000));
        assert_eq!(parse_retry_after_ms(" 12 "), Some(12_000));
        assert_eq!(parse_retry_after_ms("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
