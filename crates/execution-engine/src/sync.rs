//! Feeds stream events into the reconciler and keeps it tidy.

use std::time::Duration;

use common::now_ms;
use connector_core::{ConnectionHandle, ConnectionState, StreamNotification};
use execution_core::{Reconciled, VenueEvent};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::gateway::SharedGateway;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How often overdue operations are expired and terminal orders collected.
    pub maintenance_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            maintenance_interval: Duration::from_secs(1),
        }
    }
}

/// Applies decoded events to the order set, resyncs on every new session or
/// lagged receive, and runs periodic expiry. Stops once the connection is
/// closed.
pub struct OrderSync {
    gateway: SharedGateway,
    config: SyncConfig,
}

impl OrderSync {
    pub fn new(gateway: SharedGateway, config: SyncConfig) -> Self {
        Self { gateway, config }
    }

    /// Subscribe to `connection` and run on a new task.
    pub fn spawn(self, connection: &ConnectionHandle) -> JoinHandle<()> {
        let events = connection.subscribe();
        let state = connection.watch_state();
        tokio::spawn(self.run(events, state))
    }

    async fn run(
        self,
        mut events: broadcast::Receiver<StreamNotification>,
        mut state: watch::Receiver<ConnectionState>,
    ) {
        let mut maintenance = tokio::time::interval(self.config.maintenance_interval);
        maintenance.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            if state.borrow().is_closed() {
                break;
            }
            tokio::select! {
                biased;

                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                notification = events.recv() => match notification {
                    Ok(StreamNotification::Live { session }) => {
                        info!(session, "Session live, resyncing open orders");
                        self.resync().await;
                    }
                    Ok(StreamNotification::Event(event)) => self.apply(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event listener lagged, resyncing open orders");
                        self.resync().await;
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = maintenance.tick() => self.maintain(),
            }
        }
        info!("Order sync stopped");
    }

    fn apply(&self, event: &VenueEvent) {
        if let VenueEvent::Ticker(top) = event {
            self.gateway.validator().quotes().update(top.clone());
            return;
        }
        let changed = self
            .gateway
            .reconciler()
            .apply_stream_event(event)
            .into_iter()
            .filter(|outcome| {
                matches!(
                    outcome,
                    Reconciled::Created | Reconciled::Confirmed | Reconciled::Merged | Reconciled::Updated
                )
            })
            .count();
        if changed > 0 {
            self.gateway.metrics().add_orders_reconciled(changed as u64);
        }
    }

    async fn resync(&self) {
        match self.gateway.refresh_snapshot().await {
            Ok(summary) => debug!(?summary, "Resync complete"),
            Err(e) => warn!(error = %e, "Resync failed; waiting for the next session or lag"),
        }
    }

    fn maintain(&self) {
        let now = now_ms();
        let reconciler = self.gateway.reconciler();
        let expired = reconciler.expire_pending(now);
        if !expired.is_empty() {
            self.gateway.metrics().add_pending_expired(expired.len() as u64);
        }
        reconciler.collect_garbage(now);
    }
}
