//! Metrics for the session and transaction layers.
//!
//! Counters are kept in atomics so a [`MetricsSnapshot`] can be taken at any
//! time, and every recording is also emitted through the [`metrics`] crate
//! facade. Install a recorder (for example a Prometheus exporter) in the
//! binary to export them.
//!
//! # Exported names
//!
//! - `keystone_sessions_opened_total`, `keystone_sessions_closed_total`,
//!   `keystone_sessions_expired_total`, `keystone_sessions_active`
//! - `keystone_transactions_begun_total`, `keystone_transactions_committed_total`,
//!   `keystone_transactions_rolled_back_total`, `keystone_transactions_failed_total`
//! - `keystone_transaction_commit_duration_seconds`

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// Re-export the metrics crate for integration
pub use ::metrics;

/// All counters kept by a [`Service`](crate::Service).
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    /// Session lifecycle counters.
    pub sessions: SessionMetrics,
    /// Transaction lifecycle counters.
    pub transactions: TransactionMetrics,
}

impl ServiceMetrics {
    /// Create a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session being opened.
    pub fn record_session_opened(&self) {
        self.sessions.opened.fetch_add(1, Ordering::Relaxed);
        let active = self.sessions.active.fetch_add(1, Ordering::Relaxed) + 1;

        ::metrics::counter!("keystone_sessions_opened_total").increment(1);
        ::metrics::gauge!("keystone_sessions_active").set(active as f64);
    }

    /// Record a session closed by its client or by connection teardown.
    pub fn record_session_closed(&self) {
        self.sessions.closed.fetch_add(1, Ordering::Relaxed);
        let active = self.sessions.decrement_active();

        ::metrics::counter!("keystone_sessions_closed_total").increment(1);
        ::metrics::gauge!("keystone_sessions_active").set(active as f64);
    }

    /// Record a session closed by the idle reaper.
    pub fn record_session_expired(&self) {
        self.sessions.expired.fetch_add(1, Ordering::Relaxed);
        let active = self.sessions.decrement_active();

        ::metrics::counter!("keystone_sessions_expired_total").increment(1);
        ::metrics::gauge!("keystone_sessions_active").set(active as f64);
    }

    /// Record a transaction being started.
    pub fn record_begin(&self) {
        self.transactions.begun.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("keystone_transactions_begun_total").increment(1);
    }

    /// Record a successful commit.
    pub fn record_commit(&self, duration: Duration) {
        self.transactions.committed.fetch_add(1, Ordering::Relaxed);

        ::metrics::counter!("keystone_transactions_committed_total").increment(1);
        ::metrics::histogram!("keystone_transaction_commit_duration_seconds")
            .record(duration.as_secs_f64());
    }

    /// Record a rollback, explicit or implied by a session closing.
    pub fn record_rollback(&self) {
        self.transactions.rolled_back.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("keystone_transactions_rolled_back_total").increment(1);
    }

    /// Record a commit the backend refused.
    pub fn record_failed_commit(&self) {
        self.transactions.failed.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("keystone_transactions_failed_total").increment(1);
    }

    /// Get a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_opened: self.sessions.opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions.closed.load(Ordering::Relaxed),
            sessions_expired: self.sessions.expired.load(Ordering::Relaxed),
            sessions_active: self.sessions.active.load(Ordering::Relaxed),
            transactions_begun: self.transactions.begun.load(Ordering::Relaxed),
            transactions_committed: self.transactions.committed.load(Ordering::Relaxed),
            transactions_rolled_back: self.transactions.rolled_back.load(Ordering::Relaxed),
            transactions_failed: self.transactions.failed.load(Ordering::Relaxed),
        }
    }
}

/// Session lifecycle counters.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    opened: AtomicU64,
    closed: AtomicU64,
    expired: AtomicU64,
    active: AtomicU64,
}

impl SessionMetrics {
    fn decrement_active(&self) -> u64 {
        // Saturate so a stray double close cannot wrap the gauge.
        let prev = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        prev.saturating_sub(1)
    }
}

/// Transaction lifecycle counters.
#[derive(Debug, Default)]
pub struct TransactionMetrics {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`ServiceMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Sessions opened since start.
    pub sessions_opened: u64,
    /// Sessions closed explicitly or by disconnect.
    pub sessions_closed: u64,
    /// Sessions closed by the idle reaper.
    pub sessions_expired: u64,
    /// Sessions currently open.
    pub sessions_active: u64,
    /// Transactions started.
    pub transactions_begun: u64,
    /// Transactions committed, including empty ones.
    pub transactions_committed: u64,
    /// Transactions rolled back.
    pub transactions_rolled_back: u64,
    /// Commits the backend refused.
    pub transactions_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_gauge() {
        let metrics = ServiceMetrics::new();
        metrics.record_session_opened();
        metrics.record_session_opened();
        metrics.record_session_closed();
        metrics.record_session_expired();
        metrics.record_session_closed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sessions_opened, 2);
        assert_eq!(snapshot.sessions_active, 0);
        assert_eq!(snapshot.sessions_expired, 1);
    }

    #[test]
    fn test_transaction_counters() {
        let metrics = ServiceMetrics::new();
        metrics.record_begin();
        metrics.record_commit(Duration::from_millis(3));
        metrics.record_begin();
        metrics.record_failed_commit();
        metrics.record_rollback();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.transactions_begun, 2);
        assert_eq!(snapshot.transactions_committed, 1);
        assert_eq!(snapshot.transactions_failed, 1);
        assert_eq!(snapshot.transactions_rolled_back, 1);
    }
}
