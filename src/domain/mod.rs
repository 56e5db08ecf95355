//! Domain models - tracking events, state and value types
//!
//! This module contains the canonical data types used throughout the system:
//! - `RawLocationFix` - one provider sample
//! - `DerivedLocation` - a fix promoted to trustworthy
//! - `LocationEvent` - inputs to the state machine
//! - `LocationState` - the record the engine owns and publishes

pub mod events;
pub mod state;
pub mod types;

// Re-export commonly used types at module level
pub use events::LocationEvent;
pub use state::LocationState;
pub use types::{
    DerivedLocation, LocationConfidence, MotionState, RawLocationFix, TrackingStatus,
};
