//! Nullable infrastructure for deterministic testing.
//!
//! Inspired by the "A-frame architecture" pattern from RsNano.
//! All external dependencies (clock, randomness, storage, capture hardware)
//! are abstracted behind traits. This crate provides test-friendly
//! implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never touch the filesystem or network
//!
//! `NullStore` doubles as the in-process backend for nodes started without
//! a data directory.
//!
//! Usage: swap real implementations for nullables in tests.

pub mod capture;
pub mod clock;
pub mod random;
pub mod store;

pub use capture::ScriptedPhase;
pub use clock::NullClock;
pub use random::NullRandom;
pub use store::NullStore;
