//! Decoders for Bitfinex v2 array payloads.
//!
//! Bitfinex encodes orders and notifications as positional JSON arrays.
//! These helpers are shared by the REST client and the WebSocket decoder.

use execution_core::{CorrelationToken, OrderSnapshot, OrderStatus};
use model::BookTop;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use crate::error::BitfinexRestError;

// Order array positions
const ORDER_ID: usize = 0;
const ORDER_CID: usize = 2;
const ORDER_SYMBOL: usize = 3;
const ORDER_MTS_CREATE: usize = 4;
const ORDER_MTS_UPDATE: usize = 5;
const ORDER_AMOUNT: usize = 6;
const ORDER_AMOUNT_ORIG: usize = 7;
const ORDER_STATUS: usize = 13;
const ORDER_PRICE: usize = 16;

/// Map a Bitfinex order status string to the canonical status.
///
/// Statuses carry detail after the keyword, e.g. `EXECUTED @ 107.6(-0.2)` or
/// `CANCELED was: PARTIALLY FILLED @ 107.6(-0.1)`.
pub fn map_order_status(raw: &str) -> OrderStatus {
    let raw = raw.trim();
    if raw.starts_with("ACTIVE") {
        OrderStatus::Live
    } else if raw.starts_with("EXECUTED") {
        OrderStatus::Filled
    } else if raw.starts_with("PARTIALLY FILLED") {
        OrderStatus::PartiallyFilled
    } else if raw.starts_with("POSTONLY CANCELED") || raw.starts_with("INSUFFICIENT") {
        OrderStatus::Rejected
    } else if raw.starts_with("CANCELED") || raw.starts_with("RSN_") {
        OrderStatus::Cancelled
    } else {
        OrderStatus::Unknown
    }
}

/// Decimal from a JSON number or numeric string.
pub fn decimal_at(fields: &[Value], index: usize) -> Result<Decimal, BitfinexRestError> {
    let value = fields
        .get(index)
        .ok_or_else(|| BitfinexRestError::Decode(format!("missing field {}", index)))?;
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => {
            return Err(BitfinexRestError::Decode(format!(
                "field {} is not numeric: {}",
                index, other
            )))
        }
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| BitfinexRestError::Decode(format!("field {} '{}': {}", index, text, e)))
}

fn u64_at(fields: &[Value], index: usize) -> Option<u64> {
    fields.get(index).and_then(Value::as_u64)
}

fn i64_at(fields: &[Value], index: usize) -> i64 {
    fields.get(index).and_then(Value::as_i64).unwrap_or(0)
}

/// Decode one order array.
pub fn decode_order(value: &Value) -> Result<OrderSnapshot, BitfinexRestError> {
    let fields = value
        .as_array()
        .ok_or_else(|| BitfinexRestError::Decode(format!("order is not an array: {}", value)))?;

    let exchange_id = u64_at(fields, ORDER_ID)
        .ok_or_else(|| BitfinexRestError::Decode("order without id".to_string()))?;
    let symbol = fields
        .get(ORDER_SYMBOL)
        .and_then(Value::as_str)
        .ok_or_else(|| BitfinexRestError::Decode(format!("order {} without symbol", exchange_id)))?;
    let status = fields
        .get(ORDER_STATUS)
        .and_then(Value::as_str)
        .map(map_order_status)
        .unwrap_or(OrderStatus::Unknown);
    let token = u64_at(fields, ORDER_CID)
        .filter(|cid| *cid > 0)
        .map(CorrelationToken::from_raw);

    Ok(OrderSnapshot {
        exchange_id,
        token,
        symbol: symbol.to_string(),
        amount: decimal_at(fields, ORDER_AMOUNT)?,
        original_amount: decimal_at(fields, ORDER_AMOUNT_ORIG)?,
        price: decimal_at(fields, ORDER_PRICE)?,
        status,
        created_at_ms: i64_at(fields, ORDER_MTS_CREATE),
        updated_at_ms: i64_at(fields, ORDER_MTS_UPDATE),
    })
}

/// Decode an array of order arrays.
pub fn decode_orders(value: &Value) -> Result<Vec<OrderSnapshot>, BitfinexRestError> {
    value
        .as_array()
        .ok_or_else(|| BitfinexRestError::Decode(format!("order list is not an array: {}", value)))?
        .iter()
        .map(decode_order)
        .collect()
}

/// Reply to a write request: `[MTS, TYPE, MSG_ID, null, DATA, CODE, STATUS, TEXT]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub mts: i64,
    /// Request kind, e.g. `on-req`, `oc-req`, `ou-req`.
    pub kind: String,
    pub data: Value,
    pub code: Option<i64>,
    /// `SUCCESS`, `ERROR`, `FAILURE` or `INFO`.
    pub status: String,
    pub text: String,
}

impl Notification {
    pub fn decode(value: &Value) -> Result<Self, BitfinexRestError> {
        let fields = value.as_array().ok_or_else(|| {
            BitfinexRestError::Decode(format!("notification is not an array: {}", value))
        })?;
        let text_at = |index: usize| {
            fields
                .get(index)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(Self {
            mts: i64_at(fields, 0),
            kind: text_at(1),
            data: fields.get(4).cloned().unwrap_or(Value::Null),
            code: fields.get(5).and_then(Value::as_i64),
            status: text_at(6),
            text: text_at(7),
        })
    }

    pub fn is_success(&self) -> bool {
        self.status == "SUCCESS"
    }

    /// First order in the payload. Submissions wrap their orders in an
    /// outer array, cancels and updates do not.
    pub fn order(&self) -> Result<Option<OrderSnapshot>, BitfinexRestError> {
        let Some(fields) = self.data.as_array() else {
            return Ok(None);
        };
        match fields.first() {
            None => Ok(None),
            Some(Value::Array(_)) => fields.first().map(decode_order).transpose(),
            Some(_) => decode_order(&self.data).map(Some),
        }
    }
}

/// Decode `[BID, BID_SIZE, ASK, ASK_SIZE, ...]` into a book top.
pub fn decode_ticker(symbol: &str, value: &Value, timestamp_ms: i64) -> Result<BookTop, BitfinexRestError> {
    let fields = value
        .as_array()
        .ok_or_else(|| BitfinexRestError::Decode(format!("ticker is not an array: {}", value)))?;
    Ok(BookTop::new(
        symbol,
        decimal_at(fields, 0)?,
        decimal_at(fields, 2)?,
        timestamp_ms,
    ))
}
