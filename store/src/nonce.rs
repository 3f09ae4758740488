//! Burned-nonce set.

use crate::StoreError;
use presence_types::{HandshakeId, Timestamp};

/// Monotonic set of burned handshake ids. Entries are never removed.
pub trait NonceStore: Send + Sync {
    /// Test-and-set: returns `true` only for the first call with a given id.
    fn burn_nonce(&self, id: &HandshakeId, at: Timestamp) -> Result<bool, StoreError>;

    fn is_burned(&self, id: &HandshakeId) -> Result<bool, StoreError>;

    fn burned_count(&self) -> Result<u64, StoreError>;
}
