//! Protocol parameters: deadlines, TTLs and the recovery quorum.

use serde::{Deserialize, Serialize};

/// Tunable protocol parameters shared by every component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceParams {
    // ── Handshake ────────────────────────────────────────────────────────
    /// Total budget for all capture phases of one attempt, in milliseconds.
    #[serde(default = "default_handshake_deadline_ms")]
    pub handshake_deadline_ms: u64,

    // ── Anti-replay ──────────────────────────────────────────────────────
    /// How long an issued challenge remains consumable, in milliseconds.
    #[serde(default = "default_challenge_ttl_ms")]
    pub challenge_ttl_ms: u64,

    /// Number of random bytes in an issued challenge.
    #[serde(default = "default_challenge_len")]
    pub challenge_len: usize,

    // ── Recovery ─────────────────────────────────────────────────────────
    /// Lifetime of a guardian recovery request, in milliseconds.
    #[serde(default = "default_recovery_ttl_ms")]
    pub recovery_ttl_ms: u64,

    /// Distinct guardian approvals needed to approve a recovery request.
    #[serde(default = "default_required_approvals")]
    pub required_approvals: u32,
}

fn default_handshake_deadline_ms() -> u64 {
    1_500
}
fn default_challenge_ttl_ms() -> u64 {
    5 * 60 * 1_000
}
fn default_challenge_len() -> usize {
    32
}
fn default_recovery_ttl_ms() -> u64 {
    24 * 60 * 60 * 1_000
}
fn default_required_approvals() -> u32 {
    3
}

impl Default for PresenceParams {
    fn default() -> Self {
        Self {
            handshake_deadline_ms: default_handshake_deadline_ms(),
            challenge_ttl_ms: default_challenge_ttl_ms(),
            challenge_len: default_challenge_len(),
            recovery_ttl_ms: default_recovery_ttl_ms(),
            required_approvals: default_required_approvals(),
        }
    }
}

impl PresenceParams {
    /// Return a list of human-readable problems, empty when the values are usable.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.handshake_deadline_ms == 0 {
            problems.push("handshake_deadline_ms must be greater than zero".to_owned());
        }
        if self.challenge_ttl_ms == 0 {
            problems.push("challenge_ttl_ms must be greater than zero".to_owned());
        }
        if self.challenge_len < 16 {
            problems.push("challenge_len must be at least 16 bytes".to_owned());
        }
        if self.recovery_ttl_ms == 0 {
            problems.push("recovery_ttl_ms must be greater than zero".to_owned());
        }
        if self.required_approvals == 0 {
            problems.push("required_approvals must be at least 1".to_owned());
        }
        problems
    }
}
