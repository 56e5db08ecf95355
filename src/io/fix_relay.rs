//! Burst buffer between a provider callback and the engine
//!
//! Providers may deliver fixes in bursts on their own thread. The relay keeps
//! at most `capacity` undelivered fixes and drops the oldest on overflow, so a
//! stalled consumer never makes the provider block or memory grow. A worker
//! task drains the buffer into the downstream sink in FIFO order.
//!
//! Provider errors are never buffered or dropped; they are forwarded at once.

use crate::domain::types::RawLocationFix;
use crate::infra::metrics::Metrics;
use crate::io::fix_source::FixSink;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

struct RelayQueue {
    fixes: VecDeque<RawLocationFix>,
    last_drop_warn: Option<Instant>,
}

struct RelayShared {
    queue: Mutex<RelayQueue>,
    capacity: usize,
    notify: Notify,
    downstream: Arc<dyn FixSink>,
    metrics: Arc<Metrics>,
}

/// Producer side of the relay; hand this to a fix source as its sink
#[derive(Clone)]
pub struct FixRelay {
    shared: Arc<RelayShared>,
}

impl FixRelay {
    /// Number of fixes waiting to be delivered
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().fixes.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl FixSink for FixRelay {
    fn on_fix(&self, fix: RawLocationFix) {
        {
            let mut queue = self.shared.queue.lock();
            if queue.fixes.len() >= self.shared.capacity {
                queue.fixes.pop_front();
                self.shared.metrics.record_relay_dropped();

                // Rate-limit drop warnings to 1 per second
                let warn_due = queue
                    .last_drop_warn
                    .map_or(true, |at| at.elapsed() > Duration::from_secs(1));
                if warn_due {
                    warn!(capacity = %self.shared.capacity, "fix_dropped: relay full");
                    queue.last_drop_warn = Some(Instant::now());
                }
            }
            queue.fixes.push_back(fix);
        }
        self.shared.notify.notify_one();
    }

    // Overtakes queued fixes: those reach the engine after the ERROR and are
    // ignored, so `last_raw_fix` may lag behind the error.
    fn on_provider_error(&self, reason: String) {
        self.shared.downstream.on_provider_error(reason);
    }
}

/// Consumer side of the relay; run it on the tokio runtime
pub struct FixRelayWorker {
    shared: Arc<RelayShared>,
}

impl FixRelayWorker {
    /// Deliver buffered fixes until shutdown, then flush what is left
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(capacity = %self.shared.capacity, "fix_relay_started");

        loop {
            self.drain();

            tokio::select! {
                _ = self.shared.notify.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.drain();
        info!("fix_relay_stopped");
    }

    fn drain(&self) {
        loop {
            let batch: Vec<RawLocationFix> = self.shared.queue.lock().fixes.drain(..).collect();
            if batch.is_empty() {
                return;
            }
            debug!(count = batch.len(), "fix_relay_delivering");
            for fix in batch {
                self.shared.downstream.on_fix(fix);
            }
        }
    }
}

/// Create a relay and its worker
///
/// Returns the sink (for the fix source) and the worker (to be spawned)
pub fn create_fix_relay(
    capacity: usize,
    downstream: Arc<dyn FixSink>,
    metrics: Arc<Metrics>,
) -> (FixRelay, FixRelayWorker) {
    let shared = Arc::new(RelayShared {
        queue: Mutex::new(RelayQueue {
            fixes: VecDeque::with_capacity(capacity.max(1)),
            last_drop_warn: None,
        }),
        capacity: capacity.max(1),
        notify: Notify::new(),
        downstream,
        metrics,
    });
    (FixRelay { shared: shared.clone() }, FixRelayWorker { shared })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fix_source::testing::{RecordingSink, SinkEvent};
    use tokio::time::{sleep, timeout};

    fn fix(seq: u64) -> RawLocationFix {
        RawLocationFix::new(1.0, 2.0, 5.0, seq)
    }

    #[tokio::test]
    async fn test_burst_drops_oldest() {
        let sink = Arc::new(RecordingSink::default());
        let metrics = Arc::new(Metrics::new());
        let (relay, worker) = create_fix_relay(6, sink.clone(), metrics.clone());

        for seq in 0..10 {
            relay.on_fix(fix(seq));
        }
        assert_eq!(relay.pending(), 6);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(shutdown_rx));
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let delivered: Vec<u64> = sink.fixes().iter().map(|f| f.device_time_ms).collect();
        assert_eq!(delivered, vec![4, 5, 6, 7, 8, 9]);
        assert_eq!(metrics.relay_dropped(), 4);
    }

    #[tokio::test]
    async fn test_delivers_in_order_while_running() {
        let sink = Arc::new(RecordingSink::default());
        let (relay, worker) = create_fix_relay(4, sink.clone(), Arc::new(Metrics::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(shutdown_rx));

        for seq in 0..3 {
            relay.on_fix(fix(seq));
            sleep(Duration::from_millis(5)).await;
        }

        timeout(Duration::from_secs(1), async {
            while sink.fixes().len() < 3 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let delivered: Vec<u64> = sink.fixes().iter().map(|f| f.device_time_ms).collect();
        assert_eq!(delivered, vec![0, 1, 2]);
        assert_eq!(relay.pending(), 0);
    }

    #[test]
    fn test_provider_error_bypasses_buffer() {
        let sink = Arc::new(RecordingSink::default());
        let (relay, _worker) = create_fix_relay(2, sink.clone(), Arc::new(Metrics::new()));

        relay.on_fix(fix(1));
        relay.on_provider_error("gps lost".to_string());

        assert_eq!(sink.events(), vec![SinkEvent::Error("gps lost".to_string())]);
        assert_eq!(relay.pending(), 1);
    }

    #[tokio::test]
    async fn test_fixes_queued_before_error_are_ignored() {
        use crate::domain::events::LocationEvent;
        use crate::domain::types::TrackingStatus;
        use crate::infra::clock::{ManualClock, UuidV7Generator};
        use crate::infra::config::Config;
        use crate::services::engine::TrackingEngine;

        let metrics = Arc::new(Metrics::new());
        let engine = Arc::new(TrackingEngine::from_config(
            &Config::default(),
            Arc::new(ManualClock::new(1_000)),
            Arc::new(UuidV7Generator),
            metrics.clone(),
        ));
        engine.dispatch(LocationEvent::StartTracking);
        let (relay, worker) = create_fix_relay(4, engine.clone(), metrics.clone());

        relay.on_fix(fix(1));
        relay.on_provider_error("gps lost".to_string());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();
        worker.run(shutdown_rx).await;

        let state = engine.current_state();
        assert_eq!(state.status, TrackingStatus::Error);
        assert!(state.last_raw_fix.is_none());
        assert_eq!(metrics.fixes_ignored(), 1);
    }

    #[test]
    fn test_zero_capacity_still_holds_latest() {
        let sink = Arc::new(RecordingSink::default());
        let (relay, _worker) = create_fix_relay(0, sink, Arc::new(Metrics::new()));

        relay.on_fix(fix(1));
        relay.on_fix(fix(2));

        assert_eq!(relay.capacity(), 1);
        assert_eq!(relay.pending(), 1);
    }
}
