//! Message transport under the connection manager.

use async_trait::async_trait;
use connector_core::ConnectorError;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

/// Transport-level message, stripped of WebSocket framing details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMessage {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// A reconnectable bidirectional message stream.
///
/// `connect` may be called again after `recv` returned `None` or an error.
#[async_trait]
pub trait StreamTransport: Send {
    async fn connect(&mut self, url: &str) -> Result<(), ConnectorError>;

    async fn send(&mut self, message: TransportMessage) -> Result<(), ConnectorError>;

    /// Next inbound message. `None` means the stream ended.
    async fn recv(&mut self) -> Option<Result<TransportMessage, ConnectorError>>;

    async fn close(&mut self);
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// tokio-tungstenite WebSocket transport.
#[derive(Default)]
pub struct WsTransport {
    stream: Option<WsStream>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("open", &self.is_open())
            .finish()
    }
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn connect(&mut self, url: &str) -> Result<(), ConnectorError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| ConnectorError::WebSocket(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, message: TransportMessage) -> Result<(), ConnectorError> {
        let stream = self.stream.as_mut().ok_or(ConnectorError::NotConnected)?;
        let message = match message {
            TransportMessage::Text(text) => Message::Text(text),
            TransportMessage::Ping(data) => Message::Ping(data),
            TransportMessage::Pong(data) => Message::Pong(data),
            TransportMessage::Close => Message::Close(None),
        };
        stream
            .send(message)
            .await
            .map_err(|e| ConnectorError::WebSocket(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<TransportMessage, ConnectorError>> {
        loop {
            let stream = self.stream.as_mut()?;
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    self.stream = None;
                    return Some(Err(ConnectorError::WebSocket(e.to_string())));
                }
                None => {
                    self.stream = None;
                    return None;
                }
            };

            return Some(Ok(match message {
                Message::Text(text) => TransportMessage::Text(text),
                Message::Ping(data) => TransportMessage::Ping(data),
                Message::Pong(data) => TransportMessage::Pong(data),
                Message::Close(_) => TransportMessage::Close,
                // Bitfinex only sends text
                Message::Binary(_) | Message::Frame(_) => continue,
            }));
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}
