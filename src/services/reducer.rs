//! State reduction and fix classification
//!
//! `reduce(state, event) -> state` is total and deterministic given the
//! injected clock and session-id generator. Every event is legal from every
//! status; only a fix's effect depends on the session tracking.

use crate::domain::events::LocationEvent;
use crate::domain::state::LocationState;
use crate::domain::types::{
    DerivedLocation, LocationConfidence, MotionState, RawLocationFix, TrackingStatus,
};
use crate::infra::clock::{Clock, SessionIdGenerator};
use std::sync::Arc;

/// Something that derives the next state from the current one
///
/// Implementations must not block and must not perform I/O; the engine calls
/// them while holding its dispatch lock.
pub trait Reducer: Send + Sync {
    fn reduce(&self, state: &LocationState, event: &LocationEvent) -> LocationState;
}

/// Accuracy and speed thresholds used to classify fixes
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationPolicy {
    /// Accuracy at or below this is HIGH confidence (meters)
    pub high_accuracy_m: f32,
    /// Accuracy at or below this is MEDIUM confidence (meters)
    pub medium_accuracy_m: f32,
    /// Accuracy at or below this is LOW confidence and still trusted (meters)
    pub max_acceptable_accuracy_m: f32,
    /// Speed strictly above this is MOVING (m/s)
    pub moving_speed_mps: f32,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self {
            high_accuracy_m: 10.0,
            medium_accuracy_m: 30.0,
            max_acceptable_accuracy_m: 50.0,
            moving_speed_mps: 0.5,
        }
    }
}

impl ClassificationPolicy {
    /// Reject threshold sets that would make tiers overlap or go negative
    pub fn validate(&self) -> anyhow::Result<()> {
        let tiers = [self.high_accuracy_m, self.medium_accuracy_m, self.max_acceptable_accuracy_m];
        if tiers.iter().any(|t| !t.is_finite() || *t < 0.0) {
            anyhow::bail!("accuracy thresholds must be finite and non-negative: {:?}", tiers);
        }
        if !(self.high_accuracy_m <= self.medium_accuracy_m
            && self.medium_accuracy_m <= self.max_acceptable_accuracy_m)
        {
            anyhow::bail!("accuracy thresholds must be ascending: {:?}", tiers);
        }
        if !self.moving_speed_mps.is_finite() || self.moving_speed_mps < 0.0 {
            anyhow::bail!("moving speed threshold must be finite and non-negative");
        }
        Ok(())
    }

    /// Whether a fix with this accuracy may become the derived location
    ///
    /// NaN and negative accuracies are never trusted.
    #[inline]
    pub fn is_acceptable(&self, accuracy_m: f32) -> bool {
        accuracy_m >= 0.0 && accuracy_m <= self.max_acceptable_accuracy_m
    }

    pub fn confidence(&self, accuracy_m: f32) -> LocationConfidence {
        if !self.is_acceptable(accuracy_m) {
            LocationConfidence::None
        } else if accuracy_m <= self.high_accuracy_m {
            LocationConfidence::High
        } else if accuracy_m <= self.medium_accuracy_m {
            LocationConfidence::Medium
        } else {
            LocationConfidence::Low
        }
    }

    /// Motion carries over when the fix has no usable speed
    pub fn motion(&self, speed_mps: Option<f32>, prior: MotionState) -> MotionState {
        match speed_mps {
            Some(speed) if speed.is_finite() => {
                if speed > self.moving_speed_mps {
                    MotionState::Moving
                } else {
                    MotionState::Stationary
                }
            }
            _ => prior,
        }
    }
}

/// The tracking state machine
pub struct LocationStateReducer {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn SessionIdGenerator>,
    policy: ClassificationPolicy,
}

impl LocationStateReducer {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn SessionIdGenerator>) -> Self {
        Self::with_policy(clock, ids, ClassificationPolicy::default())
    }

    pub fn with_policy(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn SessionIdGenerator>,
        policy: ClassificationPolicy,
    ) -> Self {
        Self { clock, ids, policy }
    }

    fn on_start(&self, old: &LocationState) -> LocationState {
        let now = self.clock.now_ms();
        LocationState {
            session_id: Some(self.ids.next_id()),
            status: TrackingStatus::Tracking,
            started_at: Some(now),
            updated_at: Some(now),
            confidence: LocationConfidence::None,
            motion: MotionState::Unknown,
            ..old.clone()
        }
    }

    // Motion survives a stop.
    fn on_stop(&self, old: &LocationState) -> LocationState {
        LocationState {
            status: TrackingStatus::Stopped,
            derived_location: None,
            confidence: LocationConfidence::None,
            updated_at: Some(self.clock.now_ms()),
            ..old.clone()
        }
    }

    fn on_fix(&self, old: &LocationState, fix: &RawLocationFix) -> LocationState {
        if !old.is_tracking() {
            return old.clone();
        }

        let derived_location = if self.policy.is_acceptable(fix.accuracy_meters) {
            Some(DerivedLocation::from_fix(fix))
        } else {
            None
        };

        LocationState {
            last_raw_fix: Some(fix.clone()),
            derived_location,
            confidence: self.policy.confidence(fix.accuracy_meters),
            motion: self.policy.motion(fix.speed_mps, old.motion),
            updated_at: Some(self.clock.now_ms()),
            ..old.clone()
        }
    }

    // The last known position is kept for display while erroring.
    fn on_error(&self, old: &LocationState, reason: &str) -> LocationState {
        LocationState {
            status: TrackingStatus::Error,
            confidence: LocationConfidence::None,
            last_error: Some(provider_error_message(reason)),
            updated_at: Some(self.clock.now_ms()),
            ..old.clone()
        }
    }
}

impl Reducer for LocationStateReducer {
    fn reduce(&self, state: &LocationState, event: &LocationEvent) -> LocationState {
        match event {
            LocationEvent::StartTracking => self.on_start(state),
            LocationEvent::StopTracking => self.on_stop(state),
            LocationEvent::FixReceived(fix) => self.on_fix(state, fix),
            LocationEvent::ProviderError(reason) => self.on_error(state, reason),
        }
    }
}

/// User-facing text stored in `last_error` for a provider failure
pub fn provider_error_message(reason: &str) -> String {
    if reason.trim().is_empty() {
        "location provider error".to_string()
    } else {
        format!("location provider error: {}", reason)
    }
}
