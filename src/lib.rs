//! Location tracking core library
//!
//! Turns a stream of raw location fixes into a classified tracking state
//! (position, confidence, motion, session status) and publishes it to
//! observers. Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
