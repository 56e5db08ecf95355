//! Tracking control - the surface a host (UI, background service) talks to
//!
//! Control events go through the engine's serialized dispatch before the fix
//! source is touched, so the state machine is already TRACKING when the first
//! fix can arrive and already STOPPED when late fixes trickle in.

use crate::domain::events::LocationEvent;
use crate::domain::state::LocationState;
use crate::io::fix_source::FixSource;
use crate::services::engine::{StateSubscription, TrackingEngine};
use std::sync::Arc;
use tracing::info;

/// Host-facing tracking API
pub trait LocationPublisher {
    fn start_tracking(&self);

    fn stop_tracking(&self);

    fn current_state(&self) -> Arc<LocationState>;

    fn subscribe(&self) -> StateSubscription;
}

type PermissionProbe = Box<dyn Fn() -> bool + Send + Sync>;

/// Couples the engine with the fix source it controls
pub struct TrackingService {
    engine: Arc<TrackingEngine>,
    source: Arc<dyn FixSource>,
    has_permission: PermissionProbe,
}

impl TrackingService {
    pub fn new(
        engine: Arc<TrackingEngine>,
        source: Arc<dyn FixSource>,
        has_permission: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        Self { engine, source, has_permission: Box::new(has_permission) }
    }

    pub fn is_source_active(&self) -> bool {
        self.source.is_active()
    }
}

impl LocationPublisher for TrackingService {
    fn start_tracking(&self) {
        self.engine.dispatch(LocationEvent::StartTracking);

        let has_permission = (self.has_permission)();
        info!(
            session_id = self.engine.current_state().session_id.as_deref().unwrap_or("-"),
            has_permission = %has_permission,
            "tracking_started"
        );
        self.source.start(has_permission);
    }

    fn stop_tracking(&self) {
        self.engine.dispatch(LocationEvent::StopTracking);
        self.source.stop();
        info!("tracking_stopped");
    }

    fn current_state(&self) -> Arc<LocationState> {
        self.engine.current_state()
    }

    fn subscribe(&self) -> StateSubscription {
        self.engine.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{RawLocationFix, TrackingStatus};
    use crate::infra::clock::{ManualClock, UuidV7Generator};
    use crate::io::fix_source::{FixSink, PERMISSION_DENIED_REASON};
    use parking_lot::Mutex;

    /// Source that records calls and, when started with permission,
    /// immediately delivers one fix, like a provider with a cached location
    struct ScriptedSource {
        sink: Arc<dyn FixSink>,
        calls: Mutex<Vec<String>>,
        active: Mutex<bool>,
    }

    impl ScriptedSource {
        fn new(sink: Arc<dyn FixSink>) -> Self {
            Self { sink, calls: Mutex::new(Vec::new()), active: Mutex::new(false) }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl FixSource for ScriptedSource {
        fn start(&self, has_permission: bool) {
            self.calls.lock().push(format!("start({})", has_permission));
            if !has_permission {
                self.sink.on_provider_error(PERMISSION_DENIED_REASON.to_string());
                return;
            }
            *self.active.lock() = true;
            self.sink.on_fix(RawLocationFix::new(1.0, 2.0, 5.0, 123_456));
        }

        fn stop(&self) {
            self.calls.lock().push("stop".to_string());
            *self.active.lock() = false;
        }

        fn is_active(&self) -> bool {
            *self.active.lock()
        }
    }

    fn create_service(has_permission: bool) -> (TrackingService, Arc<ScriptedSource>) {
        let engine = Arc::new(TrackingEngine::new(
            Arc::new(ManualClock::new(123_456)),
            Arc::new(UuidV7Generator),
        ));
        let source = Arc::new(ScriptedSource::new(engine.clone()));
        let service = TrackingService::new(engine, source.clone(), move || has_permission);
        (service, source)
    }

    #[test]
    fn test_start_tracking_starts_source_after_dispatch() {
        let (service, source) = create_service(true);

        service.start_tracking();

        assert_eq!(source.calls(), vec!["start(true)"]);
        assert!(service.is_source_active());
        let state = service.current_state();
        assert_eq!(state.status, TrackingStatus::Tracking);
        // the fix delivered during start was classified against TRACKING
        assert!(state.derived_location.is_some());
        assert_eq!(state.last_raw_fix.as_ref().map(|f| f.device_time_ms), Some(123_456));
    }

    #[test]
    fn test_stop_tracking_without_start() {
        let (service, source) = create_service(true);

        service.stop_tracking();

        assert_eq!(source.calls(), vec!["stop"]);
        assert_eq!(service.current_state().status, TrackingStatus::Stopped);
    }

    #[test]
    fn test_start_then_stop_keeps_session() {
        let (service, source) = create_service(true);

        service.start_tracking();
        let session = service.current_state().session_id.clone();
        service.stop_tracking();

        assert_eq!(source.calls(), vec!["start(true)", "stop"]);
        assert!(!service.is_source_active());
        let state = service.current_state();
        assert_eq!(state.status, TrackingStatus::Stopped);
        assert!(state.derived_location.is_none());
        assert_eq!(state.session_id, session);
    }

    #[test]
    fn test_start_without_permission_surfaces_error() {
        let (service, source) = create_service(false);

        service.start_tracking();

        assert_eq!(source.calls(), vec!["start(false)"]);
        let state = service.current_state();
        assert_eq!(state.status, TrackingStatus::Error);
        assert_eq!(
            state.last_error.as_deref(),
            Some("location provider error: location permission not granted")
        );
        assert!(state.session_id.is_some());
    }

    #[tokio::test]
    async fn test_subscribe_through_service() {
        let (service, _source) = create_service(true);
        let mut sub = service.subscribe();

        assert_eq!(sub.next().await.unwrap().status, TrackingStatus::Idle);

        service.start_tracking();
        let latest = sub.next().await.unwrap();
        assert_eq!(latest.status, TrackingStatus::Tracking);
        assert!(latest.last_raw_fix.is_some());
    }
}
