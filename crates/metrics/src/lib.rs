use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Thread-safe counters for the connection manager and the order core.
#[derive(Debug)]
pub struct CoreMetrics {
    // Stream
    messages_received: AtomicU64,
    decode_errors: AtomicU64,
    websocket_errors: AtomicU64,
    heartbeat_timeouts: AtomicU64,
    reconnect_attempts: AtomicU64,
    reconnect_successes: AtomicU64,
    auth_failures: AtomicU64,

    // Orders
    resyncs: AtomicU64,
    orders_reconciled: AtomicU64,
    pending_expired: AtomicU64,
    naked_cancels: AtomicU64,

    inner: RwLock<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    start_time: Instant,
    last_message_time: Option<Instant>,
    last_error_time: Option<Instant>,
    last_reconnect_time: Option<Instant>,
}

impl Default for CoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            websocket_errors: AtomicU64::new(0),
            heartbeat_timeouts: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            reconnect_successes: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            resyncs: AtomicU64::new(0),
            orders_reconciled: AtomicU64::new(0),
            pending_expired: AtomicU64::new(0),
            naked_cancels: AtomicU64::new(0),
            inner: RwLock::new(MetricsInner {
                start_time: Instant::now(),
                last_message_time: None,
                last_error_time: None,
                last_reconnect_time: None,
            }),
        }
    }

    // --- Increment methods ---

    /// Any inbound frame, heartbeats included.
    pub fn inc_messages_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_message_time = Some(Instant::now());
    }

    pub fn inc_decode_errors(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn inc_websocket_errors(&self) {
        self.websocket_errors.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn inc_heartbeat_timeouts(&self) {
        self.heartbeat_timeouts.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn inc_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_reconnect_time = Some(Instant::now());
    }

    pub fn inc_reconnect_successes(&self) {
        self.reconnect_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_auth_failures(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn inc_resyncs(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_orders_reconciled(&self, count: u64) {
        self.orders_reconciled.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_pending_expired(&self, count: u64) {
        self.pending_expired.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_naked_cancels(&self) {
        self.naked_cancels.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    // --- Getter methods ---

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    pub fn websocket_errors(&self) -> u64 {
        self.websocket_errors.load(Ordering::Relaxed)
    }

    pub fn heartbeat_timeouts(&self) -> u64 {
        self.heartbeat_timeouts.load(Ordering::Relaxed)
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    pub fn reconnect_successes(&self) -> u64 {
        self.reconnect_successes.load(Ordering::Relaxed)
    }

    pub fn auth_failures(&self) -> u64 {
        self.auth_failures.load(Ordering::Relaxed)
    }

    pub fn resyncs(&self) -> u64 {
        self.resyncs.load(Ordering::Relaxed)
    }

    pub fn orders_reconciled(&self) -> u64 {
        self.orders_reconciled.load(Ordering::Relaxed)
    }

    pub fn pending_expired(&self) -> u64 {
        self.pending_expired.load(Ordering::Relaxed)
    }

    pub fn naked_cancels(&self) -> u64 {
        self.naked_cancels.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> f64 {
        self.inner.read().start_time.elapsed().as_secs_f64()
    }

    pub fn secs_since_last_message(&self) -> Option<f64> {
        self.inner
            .read()
            .last_message_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn secs_since_last_error(&self) -> Option<f64> {
        self.inner
            .read()
            .last_error_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn secs_since_last_reconnect(&self) -> Option<f64> {
        self.inner
            .read()
            .last_reconnect_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    /// Generate a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received(),
            decode_errors: self.decode_errors(),
            websocket_errors: self.websocket_errors(),
            heartbeat_timeouts: self.heartbeat_timeouts(),
            reconnect_attempts: self.reconnect_attempts(),
            reconnect_successes: self.reconnect_successes(),
            auth_failures: self.auth_failures(),
            resyncs: self.resyncs(),
            orders_reconciled: self.orders_reconciled(),
            pending_expired: self.pending_expired(),
            naked_cancels: self.naked_cancels(),
            uptime_secs: self.uptime_secs(),
            secs_since_last_message: self.secs_since_last_message(),
            secs_since_last_error: self.secs_since_last_error(),
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub decode_errors: u64,
    pub websocket_errors: u64,
    pub heartbeat_timeouts: u64,
    pub reconnect_attempts: u64,
    pub reconnect_successes: u64,
    pub auth_failures: u64,
    pub resyncs: u64,
    pub orders_reconciled: u64,
    pub pending_expired: u64,
    pub naked_cancels: u64,
    pub uptime_secs: f64,
    pub secs_since_last_message: Option<f64>,
    pub secs_since_last_error: Option<f64>,
}

/// Health of the streaming session and order core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Receiving traffic, nothing needs attention.
    Healthy,
    /// Traffic is stale, or an order needs manual attention.
    Degraded,
    /// No traffic for an extended period, or authentication failed.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

impl MetricsSnapshot {
    /// Silence after which the session counts as degraded. Two heartbeat periods.
    const STALE_THRESHOLD_SECS: f64 = 30.0;
    const UNHEALTHY_THRESHOLD_SECS: f64 = 60.0;

    pub fn health_status(&self) -> HealthStatus {
        if self.auth_failures > 0 {
            return HealthStatus::Unhealthy;
        }

        let silence = self.secs_since_last_message.unwrap_or(self.uptime_secs);
        let traffic = if silence > Self::UNHEALTHY_THRESHOLD_SECS {
            HealthStatus::Unhealthy
        } else if silence > Self::STALE_THRESHOLD_SECS {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        if traffic == HealthStatus::Healthy && self.naked_cancels > 0 {
            HealthStatus::Degraded
        } else {
            traffic
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Core Metrics ===")?;
        writeln!(f, "Uptime:              {:.1}s", self.uptime_secs)?;
        writeln!(f, "Messages received:   {}", self.messages_received)?;
        writeln!(f, "Decode errors:       {}", self.decode_errors)?;
        writeln!(f, "WebSocket errors:    {}", self.websocket_errors)?;
        writeln!(f, "Heartbeat timeouts:  {}", self.heartbeat_timeouts)?;
        writeln!(f, "Reconnect attempts:  {}", self.reconnect_attempts)?;
        writeln!(f, "Reconnect successes: {}", self.reconnect_successes)?;
        writeln!(f, "Auth failures:       {}", self.auth_failures)?;
        writeln!(f, "Resyncs:             {}", self.resyncs)?;
        writeln!(f, "Orders reconciled:   {}", self.orders_reconciled)?;
        writeln!(f, "Pending expired:     {}", self.pending_expired)?;
        writeln!(f, "Naked cancels:       {}", self.naked_cancels)?;
        if let Some(secs) = self.secs_since_last_message {
            writeln!(f, "Since last message:  {:.1}s", secs)?;
        }
        if let Some(secs) = self.secs_since_last_error {
            writeln!(f, "Since last error:    {:.1}s", secs)?;
        }
        Ok(())
    }
}

/// Shared handle to metrics.
pub type SharedMetrics = Arc<CoreMetrics>;

pub fn create_metrics() -> SharedMetrics {
    Arc::new(CoreMetrics::new())
}
