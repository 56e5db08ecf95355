//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics so recording never contends with the engine's dispatch lock.
//!
//! NOTE: Counters use Relaxed ordering. They are statistics only and must not
//! drive control flow.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free metrics collector
pub struct Metrics {
    /// Events handed to dispatch (monotonic)
    events_total: AtomicU64,
    /// Events since last report (reset on report)
    events_since_report: AtomicU64,
    /// States published to subscribers (monotonic)
    states_published: AtomicU64,
    /// Fixes that produced a derived location (monotonic)
    fixes_accepted: AtomicU64,
    /// Fixes processed while tracking but too inaccurate to trust (monotonic)
    fixes_rejected: AtomicU64,
    /// Fixes ignored because the session was not tracking (monotonic)
    fixes_ignored: AtomicU64,
    /// Provider errors dispatched (monotonic)
    provider_errors: AtomicU64,
    /// Reductions that panicked and were contained (monotonic)
    reduce_faults: AtomicU64,
    /// Fixes dropped by the relay buffer on overflow (monotonic)
    relay_dropped: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_total: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            states_published: AtomicU64::new(0),
            fixes_accepted: AtomicU64::new(0),
            fixes_rejected: AtomicU64::new(0),
            fixes_ignored: AtomicU64::new(0),
            provider_errors: AtomicU64::new(0),
            reduce_faults: AtomicU64::new(0),
            relay_dropped: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_event(&self) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_state_published(&self) {
        self.states_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fix_accepted(&self) {
        self.fixes_accepted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fix_rejected(&self) {
        self.fixes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fix_ignored(&self) {
        self.fixes_ignored.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_provider_error(&self) {
        self.provider_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reduce_fault(&self) {
        self.reduce_faults.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_relay_dropped(&self) {
        self.relay_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_total(&self) -> u64 {
        self.events_total.load(Ordering::Relaxed)
    }

    pub fn states_published(&self) -> u64 {
        self.states_published.load(Ordering::Relaxed)
    }

    pub fn fixes_ignored(&self) -> u64 {
        self.fixes_ignored.load(Ordering::Relaxed)
    }

    pub fn reduce_faults(&self) -> u64 {
        self.reduce_faults.load(Ordering::Relaxed)
    }

    pub fn relay_dropped(&self) -> u64 {
        self.relay_dropped.load(Ordering::Relaxed)
    }

    /// Generate a summary, resetting the periodic counters
    pub fn report(&self) -> MetricsSummary {
        let events_count = self.events_since_report.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let events_per_sec = if elapsed.as_secs_f64() > 0.0 {
            events_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            events_total: self.events_total.load(Ordering::Relaxed),
            events_per_sec,
            states_published: self.states_published.load(Ordering::Relaxed),
            fixes_accepted: self.fixes_accepted.load(Ordering::Relaxed),
            fixes_rejected: self.fixes_rejected.load(Ordering::Relaxed),
            fixes_ignored: self.fixes_ignored.load(Ordering::Relaxed),
            provider_errors: self.provider_errors.load(Ordering::Relaxed),
            reduce_faults: self.reduce_faults.load(Ordering::Relaxed),
            relay_dropped: self.relay_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub events_total: u64,
    pub events_per_sec: f64,
    pub states_published: u64,
    pub fixes_accepted: u64,
    pub fixes_rejected: u64,
    pub fixes_ignored: u64,
    pub provider_errors: u64,
    pub reduce_faults: u64,
    pub relay_dropped: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            events_total = %self.events_total,
            events_per_sec = format!("{:.1}", self.events_per_sec),
            states_published = %self.states_published,
            fixes_accepted = %self.fixes_accepted,
            fixes_rejected = %self.fixes_rejected,
            fixes_ignored = %self.fixes_ignored,
            provider_errors = %self.provider_errors,
            reduce_faults = %self.reduce_faults,
            relay_dropped = %self.relay_dropped,
            "metrics"
        );
    }
}
