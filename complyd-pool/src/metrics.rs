use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of checkout-latency samples kept in the rolling window.
const LATENCY_WINDOW: usize = 1000;

/// A point-in-time snapshot of pool activity.
///
/// Produced by [`SharedPoolMetrics::snapshot`]; every mutation goes
/// through the recorder's single internal lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolMetrics {
    /// Connections currently open across the pool (active + idle).
    pub total_connections: u32,

    /// Connections currently executing on behalf of a caller.
    pub active_connections: u32,

    /// Connections sitting idle in the pool.
    pub idle_connections: u32,

    /// Sessions currently checked out through the manager.
    pub checked_out: u32,

    /// Connections in use beyond the configured regular maximum.
    pub overflow_in_use: u32,

    /// Failed acquisitions and failed statements, cumulative.
    pub failed_connections: u64,

    /// Cumulative successful checkouts.
    pub checkouts: u64,

    /// Cumulative check-ins.
    pub checkins: u64,

    /// Rolling mean checkout latency over the most recent 1,000 samples.
    pub avg_checkout_time_ms: f64,

    /// Cumulative mean of observed active-connection counts.
    pub avg_active: f64,

    /// Highest concurrent active count seen this process lifetime.
    pub peak_active: u32,

    pub collected_at: DateTime<Utc>,
}

impl PoolMetrics {
    fn new() -> Self {
        Self {
            total_connections: 0,
            active_connections: 0,
            idle_connections: 0,
            checked_out: 0,
            overflow_in_use: 0,
            failed_connections: 0,
            checkouts: 0,
            checkins: 0,
            avg_checkout_time_ms: 0.0,
            avg_active: 0.0,
            peak_active: 0,
            collected_at: Utc::now(),
        }
    }

    /// Pool utilization against the configured regular maximum.
    pub fn utilization_percent(&self, max_connections: u32) -> f64 {
        if max_connections == 0 {
            0.0
        } else {
            (self.active_connections as f64 / max_connections as f64) * 100.0
        }
    }
}

struct MetricsInner {
    snapshot: PoolMetrics,
    latency_samples: VecDeque<f64>,
    active_sample_sum: f64,
    active_sample_count: u64,
    base_max: u32,
}

impl MetricsInner {
    fn observe_active(&mut self, active: u32) {
        self.active_sample_sum += active as f64;
        self.active_sample_count += 1;
        self.snapshot.avg_active = self.active_sample_sum / self.active_sample_count as f64;
        if active > self.snapshot.peak_active {
            self.snapshot.peak_active = active;
        }
    }

    fn recompute_average(&mut self) {
        if self.latency_samples.is_empty() {
            self.snapshot.avg_checkout_time_ms = 0.0;
        } else {
            let sum: f64 = self.latency_samples.iter().sum();
            self.snapshot.avg_checkout_time_ms = sum / self.latency_samples.len() as f64;
        }
    }
}

/// Shared recorder for pool activity.
///
/// One instance is shared by both pools; all counter mutation and the
/// rolling-average recomputation happen under the same lock, and reads
/// go through [`snapshot`](Self::snapshot) on that lock as well.
#[derive(Clone)]
pub struct SharedPoolMetrics {
    inner: Arc<Mutex<MetricsInner>>,
}

impl SharedPoolMetrics {
    pub fn new(base_max: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsInner {
                snapshot: PoolMetrics::new(),
                latency_samples: VecDeque::with_capacity(LATENCY_WINDOW),
                active_sample_sum: 0.0,
                active_sample_count: 0,
                base_max,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records a successful checkout and folds its latency into the
    /// rolling window, discarding the oldest sample past 1,000.
    pub fn record_checkout(&self, latency_ms: f64) {
        let mut inner = self.lock();
        inner.snapshot.checkouts += 1;
        inner.snapshot.checked_out += 1;
        if inner.latency_samples.len() == LATENCY_WINDOW {
            inner.latency_samples.pop_front();
        }
        inner.latency_samples.push_back(latency_ms);
        inner.recompute_average();
        let held = inner.snapshot.checked_out;
        inner.observe_active(held);
        inner.snapshot.collected_at = Utc::now();
    }

    pub fn record_checkin(&self) {
        let mut inner = self.lock();
        inner.snapshot.checkins += 1;
        inner.snapshot.checked_out = inner.snapshot.checked_out.saturating_sub(1);
        inner.snapshot.collected_at = Utc::now();
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.snapshot.failed_connections += 1;
        inner.snapshot.collected_at = Utc::now();
    }

    /// Refreshes the gauge counters from a backing-pool status read.
    /// `active` is clamped to `total` so a snapshot can never report
    /// more active connections than open ones.
    pub fn update_gauges(&self, total: u32, idle: u32) {
        let mut inner = self.lock();
        let active = total.saturating_sub(idle);
        inner.snapshot.total_connections = total;
        inner.snapshot.idle_connections = idle;
        inner.snapshot.active_connections = active.min(total);
        inner.snapshot.overflow_in_use = active.saturating_sub(inner.base_max);
        inner.observe_active(active);
        inner.snapshot.collected_at = Utc::now();
    }

    pub fn snapshot(&self) -> PoolMetrics {
        self.lock().snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_average_under_window() {
        let metrics = SharedPoolMetrics::new(20);
        for ms in [10.0, 20.0, 30.0] {
            metrics.record_checkout(ms);
        }
        let snap = metrics.snapshot();
        assert!((snap.avg_checkout_time_ms - 20.0).abs() < f64::EPSILON);
        assert_eq!(snap.checkouts, 3);
    }

    #[test]
    fn rolling_average_discards_old_samples() {
        let metrics = SharedPoolMetrics::new(20);
        // 500 samples at 100ms that must fall out of the window...
        for _ in 0..500 {
            metrics.record_checkout(100.0);
        }
        // ...pushed out by exactly 1,000 samples at 10ms.
        for _ in 0..1000 {
            metrics.record_checkout(10.0);
        }
        let snap = metrics.snapshot();
        assert!((snap.avg_checkout_time_ms - 10.0).abs() < 1e-9);
        assert_eq!(snap.checkouts, 1500);
    }

    #[test]
    fn rolling_average_mixed_window_boundary() {
        let metrics = SharedPoolMetrics::new(20);
        // One sample that stays in the window plus 999 more.
        metrics.record_checkout(50.0);
        for _ in 0..999 {
            metrics.record_checkout(10.0);
        }
        let expected = (50.0 + 999.0 * 10.0) / 1000.0;
        let snap = metrics.snapshot();
        assert!((snap.avg_checkout_time_ms - expected).abs() < 1e-9);
    }

    #[test]
    fn checkin_never_underflows() {
        let metrics = SharedPoolMetrics::new(20);
        metrics.record_checkin();
        assert_eq!(metrics.snapshot().checked_out, 0);
    }

    #[test]
    fn peak_active_is_monotonic() {
        let metrics = SharedPoolMetrics::new(20);
        metrics.update_gauges(10, 2);
        assert_eq!(metrics.snapshot().peak_active, 8);
        metrics.update_gauges(10, 9);
        let snap = metrics.snapshot();
        assert_eq!(snap.active_connections, 1);
        assert_eq!(snap.peak_active, 8);
    }

    #[test]
    fn active_never_exceeds_total() {
        let metrics = SharedPoolMetrics::new(20);
        metrics.update_gauges(5, 0);
        let snap = metrics.snapshot();
        assert!(snap.active_connections <= snap.total_connections);
    }

    #[test]
    fn overflow_reported_past_base_max() {
        let metrics = SharedPoolMetrics::new(4);
        metrics.update_gauges(6, 0);
        assert_eq!(metrics.snapshot().overflow_in_use, 2);
    }
}
