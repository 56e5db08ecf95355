//! IO modules - interfaces to location providers
//!
//! This module contains the boundary with fix providers:
//! - `fix_source` - FixSource/FixSink contracts
//! - `fix_relay` - Bounded drop-oldest buffer between a provider and the engine
//! - `replay` - Provider that replays recorded or synthetic fixes

pub mod fix_relay;
pub mod fix_source;
pub mod replay;

// Re-export commonly used types
pub use fix_relay::{create_fix_relay, FixRelay, FixRelayWorker};
pub use fix_source::{FixSink, FixSource, PERMISSION_DENIED_REASON};
pub use replay::{load_fixes, synthetic_route, ReplayFixSource};
