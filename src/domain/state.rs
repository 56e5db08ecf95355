//! The single record owned by the tracking engine

use crate::domain::types::{
    DerivedLocation, LocationConfidence, MotionState, RawLocationFix, TrackingStatus,
};
use serde::Serialize;

/// Snapshot of the tracking session as published to observers
///
/// Values are never mutated after construction; every transition builds a new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationState {
    /// Set on every start; survives stop and error
    pub session_id: Option<String>,
    pub status: TrackingStatus,
    /// Last fix processed while tracking, whether or not it was trusted
    pub last_raw_fix: Option<RawLocationFix>,
    /// Present only when the originating fix passed the accuracy gate
    pub derived_location: Option<DerivedLocation>,
    pub confidence: LocationConfidence,
    pub motion: MotionState,
    pub started_at: Option<u64>,
    pub updated_at: Option<u64>,
    pub last_error: Option<String>,
}

impl LocationState {
    pub fn initial() -> Self {
        Self {
            session_id: None,
            status: TrackingStatus::Idle,
            last_raw_fix: None,
            derived_location: None,
            confidence: LocationConfidence::None,
            motion: MotionState::Unknown,
            started_at: None,
            updated_at: None,
            last_error: None,
        }
    }

    #[inline]
    pub fn is_tracking(&self) -> bool {
        self.status == TrackingStatus::Tracking
    }

    /// State forced by the engine when a reduction fails
    /// ERROR state forced by a fault; keeps the previous stamp when `now_ms` is unknown
    pub fn faulted(&self, detail: String, now_ms: Option<u64>) -> Self {
        Self {
            status: TrackingStatus::Error,
            confidence: LocationConfidence::None,
            last_error: Some(detail),
            updated_at: now_ms.or(self.updated_at),
            ..self.clone()
        }
    }
}

impl Default for LocationState {
    fn default() -> Self {
        Self::initial()
    }
}
