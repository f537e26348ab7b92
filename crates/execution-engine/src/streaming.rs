//! Venue client that sends in-place updates over the live stream.

use std::time::Duration;

use async_trait::async_trait;
use connector_core::{ConnectionHandle, ConnectorError, OutboundRequest, StreamNotification};
use execution_core::{
    AtomicCapabilities, CancellationResult, OperationKind, OrderChanges, OrderRequest, OrderSide, OrderSnapshot,
    SubmissionResult, UpdateResult, VenueClient, VenueError, VenueEvent,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::gateway::SharedVenue;

/// Submits, cancels and snapshots go to the request/response client.
/// Atomic updates use the stream while it is connected, since the venue
/// confirms them there, and fall back to the request/response client
/// otherwise.
pub struct StreamingVenue {
    rest: SharedVenue,
    connection: ConnectionHandle,
    confirm_timeout: Duration,
}

impl StreamingVenue {
    pub fn new(rest: SharedVenue, connection: ConnectionHandle) -> Self {
        Self {
            rest,
            connection,
            confirm_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    async fn update_over_stream(
        &self,
        exchange_id: u64,
        side: OrderSide,
        changes: &OrderChanges,
    ) -> Option<Result<UpdateResult, VenueError>> {
        let mut events = self.connection.subscribe();
        let request = OutboundRequest::AtomicUpdate {
            exchange_id,
            side,
            changes: *changes,
        };
        match self.connection.send(request).await {
            Ok(()) => {}
            Err(ConnectorError::NotConnected) | Err(ConnectorError::ConnectionClosed) => return None,
            Err(e) => return Some(Err(VenueError::Transport(e.to_string()))),
        }
        debug!(order_id = exchange_id, changes = ?changes, "Update sent over stream");

        let confirmation = async {
            loop {
                match events.recv().await {
                    Ok(StreamNotification::Event(VenueEvent::Order { order, .. })) if order.exchange_id == exchange_id => {
                        if order.status.is_terminal() {
                            return Ok(UpdateResult::Rejected {
                                reason: format!("order closed as {}", order.status),
                                retryable: false,
                            });
                        }
                        if reflects(&order, changes) {
                            return Ok(UpdateResult::Applied(order));
                        }
                    }
                    Ok(StreamNotification::Event(VenueEvent::RequestFailed {
                        kind: OperationKind::Update,
                        exchange_id: target,
                        reason,
                        ..
                    })) if target.map_or(true, |x| x == exchange_id) => {
                        return Ok(UpdateResult::Rejected {
                            reason,
                            retryable: false,
                        });
                    }
                    Ok(StreamNotification::Live { session }) => {
                        return Err(VenueError::Transport(format!(
                            "session {} started before the update was confirmed",
                            session
                        )));
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Update confirmation listener lagged");
                    }
                    Err(RecvError::Closed) => {
                        return Err(VenueError::Transport("event stream closed".to_string()));
                    }
                }
            }
        };

        Some(match tokio::time::timeout(self.confirm_timeout, confirmation).await {
            Ok(result) => result,
            Err(_) => Err(VenueError::Timeout),
        })
    }
}

fn reflects(order: &OrderSnapshot, changes: &OrderChanges) -> bool {
    changes.price.map_or(true, |p| p == order.price) && changes.amount.map_or(true, |a| a == order.amount.abs())
}

#[async_trait]
impl VenueClient for StreamingVenue {
    async fn submit(&self, request: &OrderRequest) -> Result<SubmissionResult, VenueError> {
        self.rest.submit(request).await
    }

    async fn cancel(&self, exchange_id: u64) -> Result<CancellationResult, VenueError> {
        self.rest.cancel(exchange_id).await
    }

    async fn update_atomic(
        &self,
        exchange_id: u64,
        side: OrderSide,
        changes: &OrderChanges,
    ) -> Result<UpdateResult, VenueError> {
        if !self.capabilities().covers(changes) {
            return Err(VenueError::Unsupported(format!("in-place change {:?}", changes)));
        }
        if self.connection.state().is_connected() {
            if let Some(result) = self.update_over_stream(exchange_id, side, changes).await {
                return result;
            }
        }
        debug!(order_id = exchange_id, "Stream unavailable, updating over REST");
        self.rest.update_atomic(exchange_id, side, changes).await
    }

    async fn snapshot_open_orders(&self) -> Result<Vec<OrderSnapshot>, VenueError> {
        self.rest.snapshot_open_orders().await
    }

    fn capabilities(&self) -> AtomicCapabilities {
        self.rest.capabilities()
    }
}

impl std::fmt::Debug for StreamingVenue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingVenue")
            .field("state", &self.connection.state())
            .field("confirm_timeout", &self.confirm_timeout)
            .finish()
    }
}
