//! Status enums for phases, handshakes and recovery requests.

use crate::error::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of a single capture phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    /// Not started, or abandoned when the deadline fired mid-capture.
    Pending,
    Success,
    Failure,
}

/// Client-visible status of a handshake attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeStatus {
    Pending,
    /// Every phase succeeded within the deadline.
    Granted,
    /// A phase failed (rejected sample or unavailable hardware).
    Denied,
    /// The deadline passed at a phase boundary, whatever the phase outcomes.
    Expired,
}

impl HandshakeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for HandshakeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a guardian recovery request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecoveryStatus {
    /// Collecting guardian approvals.
    Pending,
    /// Quorum reached; the requesting device is the new primary anchor.
    Approved,
    /// A guardian or administrator refused the request.
    Denied,
    /// The request passed `expires_at` before reaching quorum.
    Expired,
}

impl RecoveryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Denied => "DENIED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for RecoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecoveryStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "DENIED" => Ok(Self::Denied),
            "EXPIRED" => Ok(Self::Expired),
            _ => Err(TypeError::UnknownStatus(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_is_open() {
        assert!(!RecoveryStatus::Pending.is_terminal());
        assert!(RecoveryStatus::Approved.is_terminal());
        assert!(RecoveryStatus::Denied.is_terminal());
        assert!(RecoveryStatus::Expired.is_terminal());
        assert!(!HandshakeStatus::Pending.is_terminal());
        assert!(HandshakeStatus::Expired.is_terminal());
    }

    #[test]
    fn wire_names() {
        assert_eq!(serde_json::to_string(&RecoveryStatus::Approved).unwrap(), "\"APPROVED\"");
        assert_eq!(serde_json::to_string(&HandshakeStatus::Granted).unwrap(), "\"granted\"");
        assert_eq!("expired".parse::<RecoveryStatus>().unwrap(), RecoveryStatus::Expired);
        assert!("LOST".parse::<RecoveryStatus>().is_err());
    }
}
