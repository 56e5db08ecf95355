//! Inputs accepted by the tracking state machine

use crate::domain::types::RawLocationFix;

/// The closed set of events the engine dispatches through the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    /// Begin a new session (issued by tracking control)
    StartTracking,
    /// End the current session (issued by tracking control)
    StopTracking,
    /// A sample delivered by the fix source
    FixReceived(RawLocationFix),
    /// The provider failed to start or to deliver updates
    ProviderError(String),
}

impl LocationEvent {
    /// Short name for logging
    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            LocationEvent::StartTracking => "start_tracking",
            LocationEvent::StopTracking => "stop_tracking",
            LocationEvent::FixReceived(_) => "fix_received",
            LocationEvent::ProviderError(_) => "provider_error",
        }
    }
}
