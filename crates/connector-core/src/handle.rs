use std::sync::Arc;

use execution_core::{OrderChanges, OrderSide, VenueEvent};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::state::{ConnectionState, StateMachine, StateTransition};
use crate::{ConnectionConfig, ConnectorError};

/// Published by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamNotification {
    /// A new session authenticated. Dependents must resync; events from
    /// before the gap may be missing.
    Live { session: u64 },
    Event(VenueEvent),
}

/// A request sent over the streaming session.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundRequest {
    /// Subscribe to best bid/ask. Remembered while disconnected and replayed
    /// on every new session.
    SubscribeTicker { symbol: String },
    /// In-place modification of a resting order.
    AtomicUpdate {
        exchange_id: u64,
        side: OrderSide,
        changes: OrderChanges,
    },
}

/// Commands accepted by the manager task.
#[derive(Debug)]
pub enum ManagerCommand {
    Send {
        request: OutboundRequest,
        reply: oneshot::Sender<Result<(), ConnectorError>>,
    },
}

/// Cloneable handle to a running connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    commands: mpsc::Sender<ManagerCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    transitions_tx: broadcast::Sender<StateTransition>,
    notifications_tx: broadcast::Sender<StreamNotification>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Current state, updated in place.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Every accepted state transition from now on.
    pub fn subscribe_state(&self) -> broadcast::Receiver<StateTransition> {
        self.transitions_tx.subscribe()
    }

    /// Decoded events and session notifications from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamNotification> {
        self.notifications_tx.subscribe()
    }

    /// Send a request over the session. Only ticker subscriptions are
    /// accepted while disconnected.
    pub async fn send(&self, request: OutboundRequest) -> Result<(), ConnectorError> {
        if self.state().is_closed() {
            return Err(ConnectorError::ConnectionClosed);
        }
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(ManagerCommand::Send { request, reply })
            .await
            .map_err(|_| ConnectorError::ChannelClosed)?;
        rx.await.map_err(|_| ConnectorError::ChannelClosed)?
    }

    /// Ask the manager to close the session and stop.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

/// Manager side of the channels.
#[derive(Debug)]
pub struct ManagerEndpoints {
    pub commands: mpsc::Receiver<ManagerCommand>,
    pub shutdown: watch::Receiver<bool>,
    pub state: StateMachine,
    pub notifications: broadcast::Sender<StreamNotification>,
}

impl ManagerEndpoints {
    /// Broadcast a notification. Returns false when nobody is listening.
    pub fn publish(&self, notification: StreamNotification) -> bool {
        self.notifications.send(notification).is_ok()
    }
}

/// Create the handle and the manager endpoints it talks to.
pub fn connection_channels(config: &ConnectionConfig) -> (ConnectionHandle, ManagerEndpoints) {
    let capacity = config.channel_capacity.max(1);
    let (commands_tx, commands_rx) = mpsc::channel(capacity);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let (transitions_tx, _) = broadcast::channel(capacity);
    let (notifications_tx, _) = broadcast::channel(capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = ConnectionHandle {
        commands: commands_tx,
        state_rx,
        transitions_tx: transitions_tx.clone(),
        notifications_tx: notifications_tx.clone(),
        shutdown_tx: Arc::new(shutdown_tx),
    };
    let endpoints = ManagerEndpoints {
        commands: commands_rx,
        shutdown: shutdown_rx,
        state: StateMachine::new(state_tx, transitions_tx),
        notifications: notifications_tx,
    };
    (handle, endpoints)
}
