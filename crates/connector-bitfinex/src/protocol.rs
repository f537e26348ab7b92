//! Bitfinex v2 WebSocket frames.
//!
//! Control messages are JSON objects tagged by `event`; data messages are
//! arrays headed by a channel id. Channel 0 is the authenticated account
//! channel, other ids are public subscriptions announced by `subscribed`.

use std::collections::HashMap;

use auth::WsAuthPayload;
use bitfinex_rest::{decode_order, decode_orders, decode_ticker, Notification};
use common::now_ms;
use connector_core::ConnectorError;
use execution_core::{
    CorrelationToken, OperationKind, OrderChanges, OrderEventKind, OrderSide, VenueEvent,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};

/// Info code asking clients to reconnect.
pub const INFO_RECONNECT: i64 = 20051;

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Info { version: Option<u64>, code: Option<i64> },
    AuthOk,
    AuthFailed { code: Option<i64>, message: String },
    Subscribed { chan_id: u64, symbol: String },
    Error { code: Option<i64>, message: String },
    Heartbeat,
    Event(VenueEvent),
    /// Valid but irrelevant (wallet updates, trades, pong, ...).
    Ignored,
}

fn parse_error(msg: impl Into<String>) -> ConnectorError {
    ConnectorError::Parse(msg.into())
}

/// Stateful decoder; remembers which channel id belongs to which ticker.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    tickers: HashMap<u64, String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget channel ids. Ids are per connection.
    pub fn reset(&mut self) {
        self.tickers.clear();
    }

    pub fn decode(&mut self, text: &str) -> Result<Frame, ConnectorError> {
        let value: Value = serde_json::from_str(text).map_err(|e| parse_error(e.to_string()))?;
        match &value {
            Value::Object(_) => self.decode_event(&value),
            Value::Array(fields) => self.decode_channel(fields),
            other => Err(parse_error(format!("unexpected frame: {}", other))),
        }
    }

    fn decode_event(&mut self, value: &Value) -> Result<Frame, ConnectorError> {
        let event = value
            .get("event")
            .and_then(Value::as_str)
            .ok_or_else(|| parse_error(format!("object without event: {}", value)))?;
        let code = value.get("code").and_then(Value::as_i64);
        let message = || {
            value
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let frame = match event {
            "info" => Frame::Info {
                version: value.get("version").and_then(Value::as_u64),
                code,
            },
            "auth" => match value.get("status").and_then(Value::as_str) {
                Some("OK") => Frame::AuthOk,
                _ => Frame::AuthFailed {
                    code,
                    message: message(),
                },
            },
            "subscribed" => {
                let chan_id = value
                    .get("chanId")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| parse_error("subscribed without chanId"))?;
                let symbol = value
                    .get("symbol")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if value.get("channel").and_then(Value::as_str) == Some("ticker") {
                    self.tickers.insert(chan_id, symbol.clone());
                }
                Frame::Subscribed { chan_id, symbol }
            }
            "unsubscribed" => {
                if let Some(chan_id) = value.get("chanId").and_then(Value::as_u64) {
                    self.tickers.remove(&chan_id);
                }
                Frame::Ignored
            }
            "error" => Frame::Error {
                code,
                message: message(),
            },
            _ => Frame::Ignored,
        };
        Ok(frame)
    }

    fn decode_channel(&mut self, fields: &[Value]) -> Result<Frame, ConnectorError> {
        let chan_id = fields
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| parse_error("channel frame without id"))?;

        if fields.get(1).and_then(Value::as_str) == Some("hb") {
            return Ok(Frame::Heartbeat);
        }
        if chan_id == 0 {
            return decode_account(fields);
        }

        let Some(symbol) = self.tickers.get(&chan_id) else {
            return Ok(Frame::Ignored);
        };
        let payload = fields
            .get(1)
            .ok_or_else(|| parse_error(format!("ticker frame without payload on {}", chan_id)))?;
        let top = decode_ticker(symbol, payload, now_ms()).map_err(|e| parse_error(e.to_string()))?;
        Ok(Frame::Event(VenueEvent::Ticker(top)))
    }
}

fn decode_account(fields: &[Value]) -> Result<Frame, ConnectorError> {
    let kind = fields.get(1).and_then(Value::as_str).unwrap_or_default();
    let payload = fields.get(2).unwrap_or(&Value::Null);
    let to_parse = |e: bitfinex_rest::BitfinexRestError| parse_error(e.to_string());

    let order_kind = match kind {
        "os" => {
            let orders = decode_orders(payload).map_err(to_parse)?;
            return Ok(Frame::Event(VenueEvent::OrderSnapshot(orders)));
        }
        "on" => OrderEventKind::New,
        "ou" => OrderEventKind::Update,
        "oc" => OrderEventKind::Closed,
        "n" => return decode_notification(payload),
        _ => return Ok(Frame::Ignored),
    };

    let order = decode_order(payload).map_err(to_parse)?;
    Ok(Frame::Event(VenueEvent::Order {
        kind: order_kind,
        order,
    }))
}

/// Failed write requests become `RequestFailed`; everything else is noise.
fn decode_notification(payload: &Value) -> Result<Frame, ConnectorError> {
    let notification = Notification::decode(payload).map_err(|e| parse_error(e.to_string()))?;
    if notification.is_success() || notification.status == "INFO" {
        return Ok(Frame::Ignored);
    }

    let kind = match notification.kind.as_str() {
        "on-req" => OperationKind::Submit,
        "oc-req" => OperationKind::Cancel,
        "ou-req" => OperationKind::Update,
        _ => return Ok(Frame::Ignored),
    };

    // Refused orders often lack an id, so read the fields directly
    let fields: Option<&[Value]> = notification.data.as_array().map(|outer| match outer.first() {
        Some(Value::Array(inner)) => inner.as_slice(),
        _ => outer.as_slice(),
    });
    let exchange_id = fields.and_then(|f| f.first()).and_then(Value::as_u64);
    let token = fields
        .and_then(|f| f.get(2))
        .and_then(Value::as_u64)
        .filter(|cid| *cid > 0)
        .map(CorrelationToken::from_raw);

    Ok(Frame::Event(VenueEvent::RequestFailed {
        kind,
        token,
        exchange_id,
        reason: notification.text,
    }))
}

fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

pub fn encode_auth(payload: &WsAuthPayload) -> String {
    json!({
        "event": "auth",
        "apiKey": payload.api_key,
        "authSig": payload.signature,
        "authNonce": payload.nonce,
        "authPayload": payload.payload,
    })
    .to_string()
}

pub fn encode_subscribe_ticker(symbol: &str) -> String {
    json!({
        "event": "subscribe",
        "channel": "ticker",
        "symbol": symbol,
    })
    .to_string()
}

/// `[0, "ou", null, {...}]`. Keeps the post-only flag.
pub fn encode_update(exchange_id: u64, side: OrderSide, changes: &OrderChanges) -> String {
    let mut body = json!({
        "id": exchange_id,
        "flags": bitfinex_rest::POST_ONLY_FLAG,
    });
    if let Some(amount) = changes.amount {
        body["amount"] = Value::String(format_decimal(amount.abs() * side.sign()));
    }
    if let Some(price) = changes.price {
        body["price"] = Value::String(format_decimal(price));
    }
    json!([0, "ou", null, body]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use execution_core::OrderStatus;
    use rust_decimal_macros::dec;

    const ORDER: &str = r#"[1187,null,4567,"tBTCUSD",1573482478000,1573482478500,0.5,0.5,"EXCHANGE LIMIT",null,null,null,4096,"ACTIVE",null,null,7500.5,0]"#;

    #[test]
    fn test_heartbeat() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.decode(r#"[0,"hb"]"#).unwrap(), Frame::Heartbeat);
        assert_eq!(decoder.decode(r#"[17,"hb"]"#).unwrap(), Frame::Heartbeat);
    }

    #[test]
    fn test_auth_replies() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(
            decoder
                .decode(r#"{"event":"auth","status":"OK","chanId":0,"userId":1}"#)
                .unwrap(),
            Frame::AuthOk
        );
        assert_eq!(
            decoder
                .decode(r#"{"event":"auth","status":"FAILED","chanId":0,"code":10100,"msg":"apikey: invalid"}"#)
                .unwrap(),
            Frame::AuthFailed {
                code: Some(10100),
                message: "apikey: invalid".into()
            }
        );
    }

    #[test]
    fn test_info_with_reconnect_code() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(
            decoder.decode(r#"{"event":"info","code":20051,"msg":"Stop/Restart"}"#).unwrap(),
            Frame::Info {
                version: None,
                code: Some(INFO_RECONNECT)
            }
        );
    }

    #[test]
    fn test_order_events() {
        let mut decoder = FrameDecoder::new();
        let frame = decoder.decode(&format!(r#"[0,"on",{}]"#, ORDER)).unwrap();
        let Frame::Event(VenueEvent::Order { kind, order }) = frame else {
            panic!("expected order event, got {:?}", frame);
        };
        assert_eq!(kind, OrderEventKind::New);
        assert_eq!(order.exchange_id, 1187);
        assert_eq!(order.status, OrderStatus::Live);
        assert_eq!(order.token, Some(CorrelationToken::from_raw(4567)));

        let frame = decoder.decode(&format!(r#"[0,"oc",{}]"#, ORDER)).unwrap();
        assert!(matches!(
            frame,
            Frame::Event(VenueEvent::Order {
                kind: OrderEventKind::Closed,
                ..
            })
        ));
    }

    #[test]
    fn test_order_snapshot() {
        let mut decoder = FrameDecoder::new();
        let frame = decoder.decode(&format!(r#"[0,"os",[{}]]"#, ORDER)).unwrap();
        let Frame::Event(VenueEvent::OrderSnapshot(orders)) = frame else {
            panic!("expected snapshot");
        };
        assert_eq!(orders.len(), 1);

        let empty = decoder.decode(r#"[0,"os",[]]"#).unwrap();
        assert_eq!(empty, Frame::Event(VenueEvent::OrderSnapshot(vec![])));
    }

    #[test]
    fn test_failed_submission_notification() {
        let mut decoder = FrameDecoder::new();
        let text = r#"[0,"n",[1575289447641,"on-req",null,null,[null,null,1575289447371,"tBTCUSD",null,null,0.001,0.001,"EXCHANGE LIMIT",null,null,null,4096,null,null,null,7500,0],null,"ERROR","Invalid order: minimum size for BTC/USD is 0.0006"]]"#;

        let frame = decoder.decode(text).unwrap();
        assert_eq!(
            frame,
            Frame::Event(VenueEvent::RequestFailed {
                kind: OperationKind::Submit,
                token: Some(CorrelationToken::from_raw(1575289447371)),
                exchange_id: None,
                reason: "Invalid order: minimum size for BTC/USD is 0.0006".into(),
            })
        );
    }

    #[test]
    fn test_successful_notification_ignored() {
        let mut decoder = FrameDecoder::new();
        let text = format!(r#"[0,"n",[1,"oc-req",null,null,{},null,"SUCCESS","Submitted for cancellation"]]"#, ORDER);
        assert_eq!(decoder.decode(&text).unwrap(), Frame::Ignored);
    }

    #[test]
    fn test_ticker_needs_subscription() {
        let mut decoder = FrameDecoder::new();
        let tick = r#"[42,[7500.1,1.5,7500.9,2.5,10,0.01,7500.5,100,7600,7400]]"#;
        assert_eq!(decoder.decode(tick).unwrap(), Frame::Ignored);

        decoder
            .decode(r#"{"event":"subscribed","channel":"ticker","chanId":42,"symbol":"tBTCUSD","pair":"BTCUSD"}"#)
            .unwrap();
        let Frame::Event(VenueEvent::Ticker(top)) = decoder.decode(tick).unwrap() else {
            panic!("expected ticker");
        };
        assert_eq!(top.symbol, "tBTCUSD");
        assert_eq!(top.best_bid, dec!(7500.1));
        assert_eq!(top.best_ask, dec!(7500.9));

        decoder.reset();
        assert_eq!(decoder.decode(tick).unwrap(), Frame::Ignored);
    }

    #[test]
    fn test_malformed_frames() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.decode("not json").is_err());
        assert!(decoder.decode(r#"{"no":"event"}"#).is_err());
        assert!(decoder.decode(r#"[0,"on",[1,2]]"#).is_err());
        assert_eq!(decoder.decode(r#"[0,"wu",["exchange","USD",1]]"#).unwrap(), Frame::Ignored);
    }

    #[test]
    fn test_encode_update() {
        let frame = encode_update(99, OrderSide::Sell, &OrderChanges::amount(dec!(1.50)));
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value[0], 0);
        assert_eq!(value[1], "ou");
        assert!(value[2].is_null());
        assert_eq!(value[3]["id"], 99);
        assert_eq!(value[3]["amount"], "-1.5");
        assert_eq!(value[3]["flags"], 4096);
    }

    #[test]
    fn test_encode_auth_and_subscribe() {
        let auth = encode_auth(&WsAuthPayload {
            api_key: "key".into(),
            nonce: "1".into(),
            payload: "AUTH1".into(),
            signature: "sig".into(),
        });
        let value: Value = serde_json::from_str(&auth).unwrap();
        assert_eq!(value["event"], "auth");
        assert_eq!(value["authPayload"], "AUTH1");

        let value: Value = serde_json::from_str(&encode_subscribe_ticker("tBTCUSD")).unwrap();
        assert_eq!(value["channel"], "ticker");
        assert_eq!(value["symbol"], "tBTCUSD");
    }
}
