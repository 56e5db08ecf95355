//! Infrastructure - configuration, metrics, and injected time/id sources
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `metrics` - Lock-free metrics collection
//! - `clock` - Clock and session-id generator injection points

pub mod clock;
pub mod config;
pub mod metrics;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SessionIdGenerator, SystemClock, UuidV7Generator};
pub use config::Config;
pub use metrics::Metrics;
