//! Phase executor for presence handshakes.
//!
//! A handshake runs independent capture phases strictly in order against one
//! global deadline. The first failure stops the attempt; a phase boundary
//! reached after the deadline expires it. Only a granted attempt exposes
//! phase payloads, and only as a whole.

pub mod attempt;
pub mod error;
pub mod executor;
pub mod phase;

pub use attempt::{HandshakeAttempt, HandshakeFailure, PresenceProof};
pub use error::HandshakeError;
pub use executor::PhaseExecutor;
pub use phase::{CaptureError, CaptureFuture, Phase, PhasePayload, PhaseRecord};
