//! Bitfinex REST API client.

use crate::error::BitfinexRestError;
use crate::responses::{decode_orders, decode_ticker, Notification};
use async_trait::async_trait;
use auth::{ApiCredentials, RequestSigner};
use common::{now_ms, BitfinexEnvironment, NonceGenerator};
use execution_core::{
    AtomicCapabilities, CancellationResult, OrderChanges, OrderRequest, OrderSide, OrderSnapshot,
    SubmissionResult, UpdateResult, VenueClient, VenueError,
};
use model::BookTop;
use rest_client::RestClient;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::time::Duration;

/// Request timeout for Bitfinex API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Order flag that makes the venue cancel instead of taking liquidity.
pub const POST_ONLY_FLAG: u32 = 4096;

/// The only order type ever submitted.
const ORDER_TYPE: &str = "EXCHANGE LIMIT";

const SUBMIT_PATH: &str = "v2/auth/w/order/submit";
const CANCEL_PATH: &str = "v2/auth/w/order/cancel";
const UPDATE_PATH: &str = "v2/auth/w/order/update";
const ORDERS_PATH: &str = "v2/auth/r/orders";

/// Bitfinex REST API client with authentication support.
pub struct BitfinexRestClient {
    auth_client: RestClient,
    public_client: RestClient,
    credentials: ApiCredentials,
    environment: BitfinexEnvironment,
    nonces: NonceGenerator,
    capabilities: AtomicCapabilities,
}

impl BitfinexRestClient {
    /// Create a new Bitfinex REST client for production.
    pub fn new(credentials: ApiCredentials) -> Result<Self, BitfinexRestError> {
        Self::with_environment(credentials, BitfinexEnvironment::Production)
    }

    /// Create a new Bitfinex REST client for a specific environment.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_environment(
        credentials: ApiCredentials,
        environment: BitfinexEnvironment,
    ) -> Result<Self, BitfinexRestError> {
        Ok(Self {
            auth_client: RestClient::new(environment.rest_auth_url(), REQUEST_TIMEOUT)?,
            public_client: RestClient::new(environment.rest_public_url(), REQUEST_TIMEOUT)?,
            credentials,
            environment,
            nonces: NonceGenerator::new(),
            capabilities: AtomicCapabilities::default(),
        })
    }

    /// Override which in-place modifications the account is allowed to use.
    pub fn with_capabilities(mut self, capabilities: AtomicCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn environment(&self) -> BitfinexEnvironment {
        self.environment
    }

    /// Get the API key (for logging/debugging).
    pub fn api_key(&self) -> &str {
        self.credentials.api_key()
    }

    /// Signed POST to an authenticated endpoint.
    async fn post_auth<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, BitfinexRestError> {
        let body = body.to_string();
        let signer = RequestSigner::new(&self.credentials);
        let signed = signer.sign_rest(path, self.nonces.next(), &body);

        self.auth_client
            .post_json(path, &body, &signed.as_pairs())
            .await
            .map_err(BitfinexRestError::from_rest)
    }

    // ========================================================================
    // Market Data
    // ========================================================================

    /// Best bid and ask.
    ///
    /// GET v2/ticker/{symbol}
    pub async fn ticker(&self, symbol: &str) -> Result<BookTop, BitfinexRestError> {
        let path = format!("v2/ticker/{}", symbol);
        let raw: Value = self
            .public_client
            .get(&path, None, &[])
            .await
            .map_err(BitfinexRestError::from_rest)?;
        decode_ticker(symbol, &raw, now_ms())
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// Place a post-only limit order.
    ///
    /// POST v2/auth/w/order/submit
    pub async fn submit_order(&self, request: &OrderRequest) -> Result<Notification, BitfinexRestError> {
        let body = submit_body(request);

        tracing::info!(
            symbol = %request.symbol,
            side = request.side.as_str(),
            amount = %request.amount,
            price = %request.price,
            cid = %request.token,
            "Submitting order"
        );

        let raw: Value = self.post_auth(SUBMIT_PATH, &body).await?;
        let notification = Notification::decode(&raw)?;

        tracing::info!(
            cid = %request.token,
            status = %notification.status,
            text = %notification.text,
            "Order submission answered"
        );
        Ok(notification)
    }

    /// Cancel an order by exchange id.
    ///
    /// POST v2/auth/w/order/cancel
    pub async fn cancel_order(&self, exchange_id: u64) -> Result<Notification, BitfinexRestError> {
        tracing::info!(order_id = exchange_id, "Cancelling order");

        let raw: Value = self.post_auth(CANCEL_PATH, &json!({ "id": exchange_id })).await?;
        let notification = Notification::decode(&raw)?;

        tracing::info!(
            order_id = exchange_id,
            status = %notification.status,
            text = %notification.text,
            "Order cancel answered"
        );
        Ok(notification)
    }

    /// Modify an order in place.
    ///
    /// POST v2/auth/w/order/update
    pub async fn update_order(
        &self,
        exchange_id: u64,
        side: OrderSide,
        changes: &OrderChanges,
    ) -> Result<Notification, BitfinexRestError> {
        let body = update_body(exchange_id, side, changes);

        tracing::info!(
            order_id = exchange_id,
            price = ?changes.price,
            amount = ?changes.amount,
            "Updating order"
        );

        let raw: Value = self.post_auth(UPDATE_PATH, &body).await?;
        Notification::decode(&raw)
    }

    /// All open orders.
    ///
    /// POST v2/auth/r/orders
    pub async fn open_orders(&self) -> Result<Vec<OrderSnapshot>, BitfinexRestError> {
        let raw: Value = self.post_auth(ORDERS_PATH, &json!({})).await?;
        let orders = decode_orders(&raw)?;
        tracing::debug!(count = orders.len(), "Open orders fetched");
        Ok(orders)
    }
}

fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

pub(crate) fn submit_body(request: &OrderRequest) -> Value {
    json!({
        "type": ORDER_TYPE,
        "symbol": request.symbol,
        "amount": format_decimal(request.signed_amount()),
        "price": format_decimal(request.price),
        "flags": POST_ONLY_FLAG,
        "cid": request.token.value(),
    })
}

pub(crate) fn update_body(exchange_id: u64, side: OrderSide, changes: &OrderChanges) -> Value {
    let mut body = json!({
        "id": exchange_id,
        "flags": POST_ONLY_FLAG,
    });
    if let Some(amount) = changes.amount {
        body["amount"] = Value::String(format_decimal(amount.abs() * side.sign()));
    }
    if let Some(price) = changes.price {
        body["price"] = Value::String(format_decimal(price));
    }
    body
}

#[async_trait]
impl VenueClient for BitfinexRestClient {
    async fn submit(&self, request: &OrderRequest) -> Result<SubmissionResult, VenueError> {
        match self.submit_order(request).await {
            Ok(n) if n.is_success() => match n.order()? {
                Some(order) => Ok(SubmissionResult::Accepted(order)),
                None => Err(VenueError::Decode(format!("submission acknowledged without order: {}", n.text))),
            },
            Ok(n) => Ok(SubmissionResult::Rejected { reason: n.text }),
            Err(BitfinexRestError::ApiError { message, .. }) => Ok(SubmissionResult::Rejected { reason: message }),
            Err(e) => Err(e.into()),
        }
    }

    async fn cancel(&self, exchange_id: u64) -> Result<CancellationResult, VenueError> {
        match self.cancel_order(exchange_id).await {
            Ok(n) if n.is_success() => Ok(CancellationResult::Accepted(n.order().ok().flatten())),
            Ok(n) if n.text.to_ascii_lowercase().contains("not found") => Ok(CancellationResult::NotFound),
            Ok(n) => Ok(CancellationResult::Rejected { reason: n.text }),
            Err(BitfinexRestError::OrderNotFound) => Ok(CancellationResult::NotFound),
            Err(BitfinexRestError::ApiError { message, .. }) => Ok(CancellationResult::Rejected { reason: message }),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_atomic(
        &self,
        exchange_id: u64,
        side: OrderSide,
        changes: &OrderChanges,
    ) -> Result<UpdateResult, VenueError> {
        if !self.capabilities.covers(changes) {
            return Err(VenueError::Unsupported(format!("in-place change {:?}", changes)));
        }
        match self.update_order(exchange_id, side, changes).await {
            Ok(n) if n.is_success() => match n.order()? {
                Some(order) => Ok(UpdateResult::Applied(order)),
                None => Err(VenueError::Decode(format!("update acknowledged without order: {}", n.text))),
            },
            Ok(n) => Ok(UpdateResult::Rejected {
                reason: n.text,
                retryable: false,
            }),
            Err(e @ BitfinexRestError::ApiError { .. }) => Ok(UpdateResult::Rejected {
                retryable: e.is_retryable(),
                reason: e.to_string(),
            }),
            Err(BitfinexRestError::OrderNotFound) => Ok(UpdateResult::Rejected {
                reason: "order not found".to_string(),
                retryable: false,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn snapshot_open_orders(&self) -> Result<Vec<OrderSnapshot>, VenueError> {
        self.open_orders().await.map_err(VenueError::from)
    }

    fn capabilities(&self) -> AtomicCapabilities {
        self.capabilities
    }
}

impl std::fmt::Debug for BitfinexRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitfinexRestClient")
            .field("environment", &self.environment)
            .field("base_url", &self.auth_client.base_url())
            .field("api_key", &self.credentials.key_hint())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_submit_body_is_post_only_limit() {
        let request = OrderRequest::new("tBTCUSD", OrderSide::Sell, dec!(0.50), dec!(7500.10));
        let body = submit_body(&request);

        assert_eq!(body["type"], "EXCHANGE LIMIT");
        assert_eq!(body["flags"], 4096);
        assert_eq!(body["amount"], "-0.5");
        assert_eq!(body["price"], "7500.1");
        assert_eq!(body["cid"], request.token.value());
    }

    #[test]
    fn test_update_body_signs_amount_and_keeps_flags() {
        let body = update_body(42, OrderSide::Sell, &OrderChanges::amount(dec!(2)));
        assert_eq!(body["id"], 42);
        assert_eq!(body["amount"], "-2");
        assert_eq!(body["flags"], 4096);
        assert!(body.get("price").is_none());

        let body = update_body(42, OrderSide::Buy, &OrderChanges::price(dec!(101.50)));
        assert_eq!(body["price"], "101.5");
        assert!(body.get("amount").is_none());
    }

    #[tokio::test]
    async fn test_price_update_unsupported_by_default() {
        let client = BitfinexRestClient::new(ApiCredentials::new("key".into(), "secret".into())).unwrap();
        let result = client
            .update_atomic(1, OrderSide::Buy, &OrderChanges::price(dec!(101)))
            .await;
        assert!(matches!(result, Err(VenueError::Unsupported(_))));
    }
}
