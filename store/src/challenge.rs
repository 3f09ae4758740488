//! Per-session challenge storage.

use crate::StoreError;
use presence_crypto::constant_time_eq;
use presence_types::{SessionId, Timestamp};
use serde::{Deserialize, Serialize};

/// A challenge issued to a session, stored as decoded bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChallenge {
    pub bytes: Vec<u8>,
    pub issued_at: Timestamp,
}

impl StoredChallenge {
    pub fn new(bytes: Vec<u8>, issued_at: Timestamp) -> Self {
        Self { bytes, issued_at }
    }

    /// Still consumable at `now`: no more than `ttl_ms` has elapsed since issue.
    pub fn is_live(&self, now: Timestamp, ttl_ms: u64) -> bool {
        self.issued_at.elapsed_since(now) <= ttl_ms
    }
}

/// Trait for the anti-replay challenge table.
///
/// A session may hold several outstanding challenges at once.
pub trait ChallengeStore: Send + Sync {
    /// Append a challenge to the session's outstanding list.
    fn append_challenge(
        &self,
        session: &SessionId,
        challenge: &StoredChallenge,
    ) -> Result<(), StoreError>;

    /// Atomically remove and return the first live challenge whose bytes equal
    /// `candidate`. Expired entries of the session are dropped in the same step,
    /// and a session left with no entries is removed.
    fn consume_challenge(
        &self,
        session: &SessionId,
        candidate: &[u8],
        now: Timestamp,
        ttl_ms: u64,
    ) -> Result<Option<StoredChallenge>, StoreError>;

    /// Drop every expired challenge across all sessions. Returns how many were removed.
    fn prune_challenges(&self, now: Timestamp, ttl_ms: u64) -> Result<usize, StoreError>;

    /// Number of challenges (live or not yet pruned) held for a session.
    fn outstanding_challenges(&self, session: &SessionId) -> Result<usize, StoreError>;
}

/// Shared consume rule for backends that hold a session's list in memory.
///
/// Retains only live entries, then removes the first one matching `candidate`.
pub fn take_first_match(
    entries: &mut Vec<StoredChallenge>,
    candidate: &[u8],
    now: Timestamp,
    ttl_ms: u64,
) -> Option<StoredChallenge> {
    entries.retain(|c| c.is_live(now, ttl_ms));
    let index = entries
        .iter()
        .position(|c| constant_time_eq(&c.bytes, candidate))?;
    Some(entries.remove(index))
}
