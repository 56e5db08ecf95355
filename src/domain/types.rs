//! Shared types for location tracking

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// One raw sample delivered by a location provider
///
/// Created by fix sources only; the tracking core never modifies a fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters (lower is better)
    pub accuracy_meters: f32,
    /// Provider clock timestamp (ms)
    pub device_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing_deg: Option<f32>,
    /// When the fix entered this process (ms), if the source stamps it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_time_ms: Option<u64>,
}

impl RawLocationFix {
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f32, device_time_ms: u64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters,
            device_time_ms,
            speed_mps: None,
            bearing_deg: None,
            ingest_time_ms: None,
        }
    }

    pub fn with_speed(mut self, speed_mps: f32) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    pub fn with_bearing(mut self, bearing_deg: f32) -> Self {
        self.bearing_deg = Some(bearing_deg);
        self
    }

    pub fn with_ingest_time(mut self, ingest_time_ms: u64) -> Self {
        self.ingest_time_ms = Some(ingest_time_ms);
        self
    }
}

/// A fix that passed the accuracy gate and may be shown as the current position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f32,
    pub speed_mps: Option<f32>,
    pub bearing_deg: Option<f32>,
    /// Device timestamp of the raw fix this was derived from
    pub source_device_time_ms: u64,
}

impl DerivedLocation {
    pub fn from_fix(fix: &RawLocationFix) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy_meters: fix.accuracy_meters,
            speed_mps: fix.speed_mps,
            bearing_deg: fix.bearing_deg,
            source_device_time_ms: fix.device_time_ms,
        }
    }
}

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingStatus {
    #[default]
    Idle,
    Tracking,
    Stopped,
    Error,
}

impl TrackingStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::Idle => "idle",
            TrackingStatus::Tracking => "tracking",
            TrackingStatus::Stopped => "stopped",
            TrackingStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse quality tier computed from reported accuracy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationConfidence {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl LocationConfidence {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationConfidence::None => "none",
            LocationConfidence::Low => "low",
            LocationConfidence::Medium => "medium",
            LocationConfidence::High => "high",
        }
    }
}

impl std::fmt::Display for LocationConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse movement classification computed from reported speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MotionState {
    #[default]
    Unknown,
    Stationary,
    Moving,
}

impl MotionState {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionState::Unknown => "unknown",
            MotionState::Stationary => "stationary",
            MotionState::Moving => "moving",
        }
    }
}

impl std::fmt::Display for MotionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
