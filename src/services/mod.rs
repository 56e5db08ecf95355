//! Services - state machine and tracking control
//!
//! This module contains the core business logic services:
//! - `reducer` - Pure state transitions and fix classification
//! - `engine` - Serialized dispatch and latest-state publication
//! - `tracking` - Start/stop facade coupling the engine with a fix source

pub mod engine;
pub mod reducer;
pub mod tracking;

// Re-export commonly used types
pub use engine::{StateSubscription, TrackingEngine};
pub use reducer::{ClassificationPolicy, LocationStateReducer, Reducer};
pub use tracking::{LocationPublisher, TrackingService};
