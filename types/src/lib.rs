//! Fundamental types for the presence verification protocol.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! identifiers, timestamps and clocks, the root hash, protocol parameters, and status enums.

pub mod error;
pub mod hash;
pub mod ids;
pub mod params;
pub mod state;
pub mod time;

pub use error::TypeError;
pub use hash::RootHash;
pub use ids::{
    DeviceId, GuardianId, HandshakeId, IdentityAnchor, KeyId, RequestId, SessionId,
    SourceAddress,
};
pub use params::PresenceParams;
pub use state::{HandshakeStatus, PhaseStatus, RecoveryStatus};
pub use time::{Clock, SystemClock, Timestamp};
