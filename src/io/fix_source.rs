//! Contracts between location providers and the tracking core
//!
//! A `FixSource` is started and stopped by tracking control; while active it
//! pushes samples and failures into a `FixSink`. Failures are reported as
//! values, never raised into the engine.

use crate::domain::types::RawLocationFix;

/// Reason reported when a source is asked to start without permission
pub const PERMISSION_DENIED_REASON: &str = "location permission not granted";

/// A provider of raw fixes
pub trait FixSource: Send + Sync {
    /// Begin delivering fixes. Idempotent: a no-op while already active.
    ///
    /// With `has_permission == false` no fix may be delivered; the source
    /// reports `PERMISSION_DENIED_REASON` to its sink instead.
    fn start(&self, has_permission: bool);

    /// Stop delivering fixes. Idempotent and best-effort: a fix already in
    /// flight may still arrive.
    fn stop(&self);

    fn is_active(&self) -> bool;
}

/// Receiver of provider output
pub trait FixSink: Send + Sync {
    fn on_fix(&self, fix: RawLocationFix);

    fn on_provider_error(&self, reason: String);
}
