use std::fmt;

use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Lifecycle of the streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Reconnecting,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Authenticating)
                | (Connecting, Reconnecting)
                | (Authenticating, Connected)
                | (Authenticating, Reconnecting)
                | (Connected, Reconnecting)
                | (Reconnecting, Connecting)
                | (Disconnected | Connecting | Authenticating | Connected | Reconnecting, Closed)
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accepted state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub reason: Option<String>,
}

/// Sole writer of the connection state.
///
/// Publishes the current value on a `watch` channel and every accepted
/// transition on a `broadcast` channel.
#[derive(Debug)]
pub struct StateMachine {
    current: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    transitions_tx: broadcast::Sender<StateTransition>,
}

impl StateMachine {
    pub(crate) fn new(
        state_tx: watch::Sender<ConnectionState>,
        transitions_tx: broadcast::Sender<StateTransition>,
    ) -> Self {
        let current = *state_tx.borrow();
        Self {
            current,
            state_tx,
            transitions_tx,
        }
    }

    pub fn current(&self) -> ConnectionState {
        self.current
    }

    /// Move to `next`. Transitions outside the table are refused and logged.
    pub fn transition(&mut self, next: ConnectionState, reason: Option<String>) -> bool {
        if !self.current.can_transition_to(next) {
            warn!(from = %self.current, to = %next, "Refused connection state transition");
            return false;
        }

        let from = self.current;
        self.current = next;
        info!(from = %from, to = %next, reason = reason.as_deref().unwrap_or(""), "Connection state changed");

        self.state_tx.send_replace(next);
        // No subscribers is fine
        let _ = self.transitions_tx.send(StateTransition {
            from,
            to: next,
            reason,
        });
        true
    }
}
