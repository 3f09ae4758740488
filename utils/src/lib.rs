//! Shared utilities for the presence protocol.

pub mod logging;
pub mod time;

pub use logging::init_tracing;
pub use time::{format_duration, format_remaining_ms};
