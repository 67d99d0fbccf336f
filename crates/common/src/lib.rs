//! Tarantino Common Utilities
//!
//! Shared infrastructure for all Tarantino crates:
//! - Error taxonomy and result alias
//! - Recording clock (pause accounting) and frame pacing
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
