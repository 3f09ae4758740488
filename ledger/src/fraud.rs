//! Reasons a source gets blocked.

use std::fmt;

/// Anomaly that triggers a fraud alert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FraudReason {
    /// Proof arrived without a session binding.
    MissingSession,
    /// Proof could not be parsed or lacked a challenge.
    MalformedProof,
    /// No live outstanding challenge matched.
    ChallengeMismatch,
    /// Handshake id was already burned.
    NonceReplay,
    /// Raised by an outer layer for its own checks.
    Other(String),
}

impl fmt::Display for FraudReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSession => f.write_str("no session"),
            Self::MalformedProof => f.write_str("malformed proof"),
            Self::ChallengeMismatch => f.write_str("challenge mismatch or expired"),
            Self::NonceReplay => f.write_str("replay detected"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}
