//! Capture phases and their recorded results.

use futures_util::future::BoxFuture;
use presence_types::PhaseStatus;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Why a capture failed. Hardware problems are kept apart from rejections so
/// the caller can tell "use another device" from "try again".
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum CaptureError {
    /// The sample was captured but did not pass (no match, permission denied, bad sample).
    #[error("capture rejected: {0}")]
    Rejected(String),

    /// The sensor is missing, busy or failed.
    #[error("capture hardware unavailable: {0}")]
    HardwareUnavailable(String),
}

/// Opaque result of a successful capture, usually a factor hash.
///
/// Wiped from memory on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PhasePayload(String);

impl PhasePayload {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw payload.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for PhasePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PhasePayload(<redacted>)")
    }
}

pub type CaptureFuture<'a> = BoxFuture<'a, Result<PhasePayload, CaptureError>>;

/// One unit of proof capture.
///
/// Implementations wrap a sensor bridge or a remote verifier. The executor
/// owns timing; a capture only has to eventually resolve or be dropped.
pub trait Phase: Send + Sync {
    fn name(&self) -> &str;

    fn capture(&self) -> CaptureFuture<'_>;
}

/// The recorded state of one phase within an attempt.
#[derive(Clone, Debug)]
pub struct PhaseRecord {
    pub index: usize,
    pub name: String,
    pub status: PhaseStatus,
    pub duration_ms: u64,
    pub error: Option<CaptureError>,
    pub(crate) payload: Option<PhasePayload>,
}

impl PhaseRecord {
    pub(crate) fn pending(index: usize, name: &str) -> Self {
        Self {
            index,
            name: name.to_owned(),
            status: PhaseStatus::Pending,
            duration_ms: 0,
            error: None,
            payload: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_debug_is_redacted() {
        let p = PhasePayload::new("deadbeef");
        assert_eq!(format!("{p:?}"), "PhasePayload(<redacted>)");
        assert_eq!(p.expose(), "deadbeef");
    }

    #[test]
    fn blank_payload_detection() {
        assert!(PhasePayload::new("  ").is_blank());
        assert!(!PhasePayload::new("x").is_blank());
    }
}
