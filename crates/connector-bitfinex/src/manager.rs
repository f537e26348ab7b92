use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::time::Duration;

use auth::{ApiCredentials, RequestSigner};
use common::{BitfinexEnvironment, ExponentialBackoff, NonceGenerator};
use connector_core::{
    connection_channels, ConnectionConfig, ConnectionHandle, ConnectionState, ConnectorError,
    ManagerCommand, ManagerEndpoints, OutboundRequest, StreamNotification,
};
use metrics::SharedMetrics;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::protocol::{
    encode_auth, encode_subscribe_ticker, encode_update, Frame, FrameDecoder, INFO_RECONNECT,
};
use crate::transport::{StreamTransport, TransportMessage, WsTransport};

/// How a session ended.
enum SessionResult {
    Shutdown,
    /// Never reached `Connected`.
    ConnectFailed(ConnectorError),
    /// Was connected for `duration`, then lost.
    Lost {
        duration: Duration,
        error: ConnectorError,
    },
    /// Not worth retrying.
    Fatal(ConnectorError),
}

/// Timing of the current session.
struct Session {
    opened_at: Instant,
    connected_at: Option<Instant>,
    last_traffic: Instant,
}

impl Session {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            opened_at: now,
            connected_at: None,
            last_traffic: now,
        }
    }

    fn end(&self, error: ConnectorError) -> SessionResult {
        match self.connected_at {
            Some(at) => SessionResult::Lost {
                duration: at.elapsed(),
                error,
            },
            None => SessionResult::ConnectFailed(error),
        }
    }
}

/// One loop iteration's input.
enum Step {
    Shutdown,
    Silence,
    Command(ManagerCommand),
    Inbound(Option<Result<TransportMessage, ConnectorError>>),
}

/// Resolves once shutdown was requested or every handle is gone.
async fn shutdown_signal(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Owns the streaming session: connects, authenticates, watches liveness and
/// reconnects with backoff. Everything else talks to it through a
/// [`ConnectionHandle`].
pub struct ConnectionManager<T: StreamTransport> {
    transport: T,
    url: String,
    config: ConnectionConfig,
    credentials: ApiCredentials,
    nonces: NonceGenerator,
    endpoints: ManagerEndpoints,
    metrics: SharedMetrics,
    decoder: FrameDecoder,
    tickers: BTreeSet<String>,
    session: u64,
    backoff: ExponentialBackoff,
}

impl ConnectionManager<WsTransport> {
    /// WebSocket manager for the given environment.
    pub fn for_environment(
        environment: BitfinexEnvironment,
        credentials: ApiCredentials,
        config: ConnectionConfig,
        metrics: SharedMetrics,
    ) -> (Self, ConnectionHandle) {
        Self::new(WsTransport::new(), environment.ws_url(), credentials, config, metrics)
    }
}

impl<T: StreamTransport> ConnectionManager<T> {
    pub fn new(
        transport: T,
        url: impl Into<String>,
        credentials: ApiCredentials,
        config: ConnectionConfig,
        metrics: SharedMetrics,
    ) -> (Self, ConnectionHandle) {
        let (handle, endpoints) = connection_channels(&config);
        let manager = Self {
            transport,
            url: url.into(),
            backoff: ExponentialBackoff::from_config(config.backoff),
            config,
            credentials,
            nonces: NonceGenerator::new(),
            endpoints,
            metrics,
            decoder: FrameDecoder::new(),
            tickers: BTreeSet::new(),
            session: 0,
        };
        (manager, handle)
    }

    /// Run until shutdown or a fatal error.
    ///
    /// Transient failures are retried forever with exponential backoff.
    /// Returns `Err(ConnectorError::Authentication)` when the venue refuses
    /// the credentials; the state is `Closed` either way.
    pub async fn run(mut self) -> Result<(), ConnectorError> {
        self.endpoints.state.transition(ConnectionState::Connecting, None);

        loop {
            let error = match self.run_session().await {
                SessionResult::Shutdown => {
                    self.close("shutdown requested").await;
                    info!("Connection manager shutdown complete");
                    return Ok(());
                }
                SessionResult::Fatal(error) => {
                    self.transport.close().await;
                    self.endpoints
                        .state
                        .transition(ConnectionState::Closed, Some(error.to_string()));
                    error!(error = %error, "Connection manager stopped");
                    return Err(error);
                }
                SessionResult::Lost { duration, error } => {
                    if duration >= self.config.stable_connection_threshold {
                        info!(
                            duration_secs = duration.as_secs(),
                            "Connection was stable, resetting backoff"
                        );
                        self.backoff.reset();
                    }
                    error
                }
                SessionResult::ConnectFailed(error) => error,
            };

            self.endpoints
                .state
                .transition(ConnectionState::Reconnecting, Some(error.to_string()));
            self.metrics.inc_reconnect_attempts();

            let delay = self.backoff.next_delay();
            warn!(
                error = %error,
                attempt = self.backoff.attempt(),
                delay_secs = delay.as_secs_f64(),
                "Connection lost, reconnecting"
            );

            if !self.wait_backoff(delay).await {
                self.close("shutdown requested during backoff").await;
                info!("Shutdown requested during backoff");
                return Ok(());
            }
            self.endpoints.state.transition(ConnectionState::Connecting, None);
        }
    }

    async fn close(&mut self, reason: &str) {
        self.transport.close().await;
        self.endpoints
            .state
            .transition(ConnectionState::Closed, Some(reason.to_string()));
    }

    async fn run_session(&mut self) -> SessionResult {
        info!(url = %self.url, "Connecting to Bitfinex WebSocket");

        let connect = tokio::time::timeout(self.config.connect_timeout, self.transport.connect(&self.url));
        let connected = tokio::select! {
            biased;
            _ = shutdown_signal(&mut self.endpoints.shutdown) => return SessionResult::Shutdown,
            result = connect => result,
        };
        match connected {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.metrics.inc_websocket_errors();
                return SessionResult::ConnectFailed(e);
            }
            Err(_) => {
                return SessionResult::ConnectFailed(ConnectorError::WebSocket(
                    "connection timeout".to_string(),
                ))
            }
        }

        self.decoder.reset();
        self.endpoints
            .state
            .transition(ConnectionState::Authenticating, Some("transport open".to_string()));

        let mut session = Session::new();
        let auth = RequestSigner::new(&self.credentials).sign_ws_auth(self.nonces.next());
        if let Err(e) = self.transport.send(TransportMessage::Text(encode_auth(&auth))).await {
            self.transport.close().await;
            return session.end(e);
        }

        loop {
            let deadline = match session.connected_at {
                Some(_) => session.last_traffic + self.config.heartbeat_interval,
                None => session.opened_at + self.config.auth_timeout,
            };

            let step = tokio::select! {
                biased;
                _ = shutdown_signal(&mut self.endpoints.shutdown) => Step::Shutdown,
                _ = tokio::time::sleep_until(deadline) => Step::Silence,
                command = self.endpoints.commands.recv() => match command {
                    Some(command) => Step::Command(command),
                    None => Step::Shutdown,
                },
                message = self.transport.recv() => Step::Inbound(message),
            };

            let flow = match step {
                Step::Shutdown => {
                    info!("Shutdown signal received, closing connection");
                    let _ = self.transport.send(TransportMessage::Close).await;
                    return SessionResult::Shutdown;
                }
                Step::Silence => self.on_silence(&session),
                Step::Command(command) => self.on_command(command, &session).await,
                Step::Inbound(message) => self.on_inbound(message, &mut session).await,
            };

            if let ControlFlow::Break(result) = flow {
                self.transport.close().await;
                return result;
            }
        }
    }

    fn on_silence(&self, session: &Session) -> ControlFlow<SessionResult> {
        if session.connected_at.is_some() {
            self.metrics.inc_heartbeat_timeouts();
            warn!(
                timeout_secs = self.config.heartbeat_interval.as_secs_f64(),
                "No traffic within heartbeat interval"
            );
            ControlFlow::Break(session.end(ConnectorError::HeartbeatTimeout(self.config.heartbeat_interval)))
        } else {
            warn!(
                timeout_secs = self.config.auth_timeout.as_secs_f64(),
                "No authentication reply"
            );
            ControlFlow::Break(session.end(ConnectorError::WebSocket(
                "authentication reply timeout".to_string(),
            )))
        }
    }

    async fn on_command(&mut self, command: ManagerCommand, session: &Session) -> ControlFlow<SessionResult> {
        let ManagerCommand::Send { request, reply } = command;

        if session.connected_at.is_none() {
            let _ = reply.send(self.queue_offline(request));
            return ControlFlow::Continue(());
        }

        let frame = match &request {
            OutboundRequest::SubscribeTicker { symbol } => {
                self.tickers.insert(symbol.clone());
                encode_subscribe_ticker(symbol)
            }
            OutboundRequest::AtomicUpdate {
                exchange_id,
                side,
                changes,
            } => {
                debug!(order_id = exchange_id, ?changes, "Sending in-place update");
                encode_update(*exchange_id, *side, changes)
            }
        };

        match self.transport.send(TransportMessage::Text(frame)).await {
            Ok(()) => {
                let _ = reply.send(Ok(()));
                ControlFlow::Continue(())
            }
            Err(e) => {
                self.metrics.inc_websocket_errors();
                let _ = reply.send(Err(e.clone()));
                ControlFlow::Break(session.end(e))
            }
        }
    }

    /// Requests arriving without an authenticated session.
    fn queue_offline(&mut self, request: OutboundRequest) -> Result<(), ConnectorError> {
        match request {
            OutboundRequest::SubscribeTicker { symbol } => {
                debug!(symbol = %symbol, "Ticker subscription queued until connected");
                self.tickers.insert(symbol);
                Ok(())
            }
            OutboundRequest::AtomicUpdate { .. } => Err(ConnectorError::NotConnected),
        }
    }

    async fn on_inbound(
        &mut self,
        message: Option<Result<TransportMessage, ConnectorError>>,
        session: &mut Session,
    ) -> ControlFlow<SessionResult> {
        let message = match message {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                self.metrics.inc_websocket_errors();
                return ControlFlow::Break(session.end(e));
            }
            None => {
                info!("WebSocket stream ended");
                return ControlFlow::Break(session.end(ConnectorError::ConnectionClosed));
            }
        };
        session.last_traffic = Instant::now();

        match message {
            TransportMessage::Text(text) => {
                self.metrics.inc_messages_received();
                match self.decoder.decode(&text) {
                    Ok(frame) => self.on_frame(frame, session).await,
                    Err(e) => {
                        self.metrics.inc_decode_errors();
                        warn!(error = %e, "Failed to decode message");
                        ControlFlow::Continue(())
                    }
                }
            }
            TransportMessage::Ping(data) => {
                debug!("Received Ping, sending Pong");
                match self.transport.send(TransportMessage::Pong(data)).await {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(e) => {
                        warn!(error = %e, "Failed to send Pong");
                        self.metrics.inc_websocket_errors();
                        ControlFlow::Break(session.end(e))
                    }
                }
            }
            TransportMessage::Pong(_) => ControlFlow::Continue(()),
            TransportMessage::Close => {
                info!("WebSocket closed by server");
                ControlFlow::Break(session.end(ConnectorError::ConnectionClosed))
            }
        }
    }

    async fn on_frame(&mut self, frame: Frame, session: &mut Session) -> ControlFlow<SessionResult> {
        match frame {
            Frame::Heartbeat | Frame::Ignored => {}
            Frame::Event(event) => {
                self.endpoints.publish(StreamNotification::Event(event));
            }
            Frame::AuthOk => {
                if session.connected_at.is_some() {
                    return ControlFlow::Continue(());
                }
                return self.on_authenticated(session).await;
            }
            Frame::AuthFailed { code, message } => {
                self.metrics.inc_auth_failures();
                error!(code = ?code, message = %message, "Authentication refused");
                return ControlFlow::Break(SessionResult::Fatal(ConnectorError::Authentication(message)));
            }
            Frame::Info { code: Some(INFO_RECONNECT), .. } => {
                info!("Server requested reconnect");
                return ControlFlow::Break(session.end(ConnectorError::ConnectionClosed));
            }
            Frame::Info { version, code } => {
                debug!(version = ?version, code = ?code, "Info message");
            }
            Frame::Subscribed { chan_id, symbol } => {
                debug!(chan_id, symbol = %symbol, "Subscribed");
            }
            Frame::Error { code, message } => {
                warn!(code = ?code, message = %message, "Venue error event");
            }
        }
        ControlFlow::Continue(())
    }

    async fn on_authenticated(&mut self, session: &mut Session) -> ControlFlow<SessionResult> {
        let now = Instant::now();
        session.connected_at = Some(now);
        session.last_traffic = now;
        self.session += 1;

        self.endpoints
            .state
            .transition(ConnectionState::Connected, Some(format!("session {}", self.session)));
        if self.session > 1 {
            self.metrics.inc_reconnect_successes();
        }
        info!(session = self.session, "Authenticated");
        self.endpoints
            .publish(StreamNotification::Live { session: self.session });

        for symbol in &self.tickers {
            let frame = encode_subscribe_ticker(symbol);
            if let Err(e) = self.transport.send(TransportMessage::Text(frame)).await {
                self.metrics.inc_websocket_errors();
                return ControlFlow::Break(session.end(e));
            }
        }
        ControlFlow::Continue(())
    }

    /// Sleep through the backoff delay while answering commands.
    /// Returns false when shutdown was requested.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            let command = tokio::select! {
                biased;
                _ = shutdown_signal(&mut self.endpoints.shutdown) => return false,
                _ = &mut sleep => return true,
                command = self.endpoints.commands.recv() => command,
            };
            match command {
                Some(ManagerCommand::Send { request, reply }) => {
                    let _ = reply.send(self.queue_offline(request));
                }
                None => return false,
            }
        }
    }
}
