//! Attested-address storage.

use crate::StoreError;
use presence_types::Timestamp;

/// Addresses that have passed a master handshake.
///
/// Keys are compared byte-for-byte; callers normalize case before calling.
pub trait AttestationStore: Send + Sync {
    fn mark_attested(&self, address: &str, at: Timestamp) -> Result<(), StoreError>;

    fn attested_at(&self, address: &str) -> Result<Option<Timestamp>, StoreError>;

    fn is_attested(&self, address: &str) -> Result<bool, StoreError> {
        self.attested_at(address).map(|t| t.is_some())
    }
}
