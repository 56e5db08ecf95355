//! Tracking engine - serialized dispatch and latest-state publication
//!
//! The engine owns the one `LocationState` and is the only writer of it:
//! - `dispatch` applies one event at a time under a mutex, so concurrent
//!   producers are linearized and each producer keeps its own order
//! - every committed state is published on a `watch` channel, which never
//!   blocks the writer and lets slow subscribers skip to the newest value
//! - a panicking reducer is contained and turned into an ERROR state


use crate::domain::events::LocationEvent;
use crate::domain::state::LocationState;
use crate::domain::types::RawLocationFix;
use crate::infra::clock::{Clock, SessionIdGenerator};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::fix_source::FixSink;
use crate::services::reducer::{LocationStateReducer, Reducer};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, trace, warn};

/// Owns the current state and serializes every transition
pub struct TrackingEngine {
    /// Last committed state; the lock is the single serialization point
    state: Mutex<Arc<LocationState>>,
    /// Latest-value broadcast of committed states
    state_tx: watch::Sender<Arc<LocationState>>,
    reducer: Box<dyn Reducer>,
    /// Used to stamp states forced by a reduce fault
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl TrackingEngine {
    /// Create an engine with the default classification policy
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn SessionIdGenerator>) -> Self {
        let reducer = LocationStateReducer::new(clock.clone(), ids);
        Self::with_reducer(Box::new(reducer), clock, Arc::new(Metrics::new()))
    }

    /// Create an engine using the configured classification policy
    pub fn from_config(
        config: &Config,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn SessionIdGenerator>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let reducer =
            LocationStateReducer::with_policy(clock.clone(), ids, config.classification().clone());
        Self::with_reducer(Box::new(reducer), clock, metrics)
    }

    pub fn with_reducer(
        reducer: Box<dyn Reducer>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let initial = Arc::new(LocationState::initial());
        let (state_tx, _) = watch::channel(initial.clone());
        Self { state: Mutex::new(initial), state_tx, reducer, clock, metrics }
    }

    /// Apply an event. Blocks only while another dispatch holds the lock.
    pub fn dispatch(&self, event: LocationEvent) {
        self.metrics.record_event();

        let mut current = self.state.lock();
        let next = match panic::catch_unwind(AssertUnwindSafe(|| {
            self.reducer.reduce(&current, &event)
        })) {
            Ok(next) => {
                self.record_outcome(&current, &next, &event);
                // Decided by event and status: float fields holding NaN never compare equal
                let ignored =
                    matches!(event, LocationEvent::FixReceived(_)) && !current.is_tracking();
                if ignored || next == **current {
                    trace!(event = event.kind(), status = %current.status, "state_unchanged");
                    return;
                }
                next
            }
            Err(payload) => {
                let detail = panic_detail(payload.as_ref());
                self.metrics.record_reduce_fault();
                error!(event = event.kind(), error = %detail, "reduce_failed");
                // The clock may be what failed
                let now = panic::catch_unwind(AssertUnwindSafe(|| self.clock.now_ms())).ok();
                current.faulted(detail, now)
            }
        };

        let next = Arc::new(next);
        *current = next.clone();
        // Published while still holding the lock so publication order matches commit order
        self.state_tx.send_replace(next.clone());
        self.metrics.record_state_published();
        drop(current);

        debug!(
            event = event.kind(),
            status = %next.status,
            confidence = %next.confidence,
            motion = %next.motion,
            session_id = next.session_id.as_deref().unwrap_or("-"),
            "state_committed"
        );
    }

    /// Latest committed state; never waits for an in-flight dispatch
    pub fn current_state(&self) -> Arc<LocationState> {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to committed states, starting with the current one
    pub fn subscribe(&self) -> StateSubscription {
        StateSubscription { rx: self.state_tx.subscribe(), initial_pending: true }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    fn record_outcome(&self, before: &LocationState, after: &LocationState, event: &LocationEvent) {
        match event {
            LocationEvent::FixReceived(fix) => {
                if !before.is_tracking() {
                    self.metrics.record_fix_ignored();
                    trace!(status = %before.status, "fix_ignored_not_tracking");
                } else if after.derived_location.is_some() {
                    self.metrics.record_fix_accepted();
                } else {
                    self.metrics.record_fix_rejected();
                    debug!(accuracy_m = %fix.accuracy_meters, "fix_rejected_poor_accuracy");
                }
            }
            LocationEvent::ProviderError(reason) => {
                self.metrics.record_provider_error();
                warn!(reason = %reason, "provider_error");
            }
            LocationEvent::StartTracking | LocationEvent::StopTracking => {}
        }
    }
}

impl FixSink for TrackingEngine {
    fn on_fix(&self, fix: RawLocationFix) {
        self.dispatch(LocationEvent::FixReceived(fix));
    }

    fn on_provider_error(&self, reason: String) {
        self.dispatch(LocationEvent::ProviderError(reason));
    }
}

/// Extract a readable message from a panic payload
fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "reducer exception".to_string()
    }
}

/// Receiver side of the engine's state broadcast
///
/// Delivers the state current at subscription time first, then newer states
/// in commit order. A subscriber that falls behind sees only the newest one.
pub struct StateSubscription {
    rx: watch::Receiver<Arc<LocationState>>,
    initial_pending: bool,
}

impl StateSubscription {
    /// Wait for the next state; `None` once the engine is gone
    pub async fn next(&mut self) -> Option<Arc<LocationState>> {
        if self.initial_pending {
            self.initial_pending = false;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Whether `next` would return without waiting
    pub fn has_pending(&self) -> bool {
        self.initial_pending || self.rx.has_changed().unwrap_or(false)
    }

    /// Newest state without consuming it
    pub fn latest(&self) -> Arc<LocationState> {
        self.rx.borrow().clone()
    }
}

impl Clone for StateSubscription {
    fn clone(&self) -> Self {
        Self { rx: self.rx.clone(), initial_pending: true }
    }
}
