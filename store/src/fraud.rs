//! Fraud-block records and the audited unblock trail.

use crate::StoreError;
use presence_types::{SourceAddress, Timestamp};
use serde::{Deserialize, Serialize};

/// A permanently blocked source address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub source: SourceAddress,
    pub reason: String,
    pub blocked_at: Timestamp,
}

/// One administrative unblock, kept forever.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnblockAudit {
    /// The block that was lifted.
    pub block: BlockRecord,
    pub operator: String,
    pub note: String,
    pub unblocked_at: Timestamp,
}

/// Trait for the blocked-source table.
pub trait SourceBlockStore: Send + Sync {
    /// Insert a block if the source is not already blocked.
    ///
    /// Returns `false` when a block already exists; the original record is kept.
    fn block_source(&self, record: &BlockRecord) -> Result<bool, StoreError>;

    fn get_block(&self, source: &SourceAddress) -> Result<Option<BlockRecord>, StoreError>;

    fn blocked_sources(&self) -> Result<Vec<BlockRecord>, StoreError>;

    /// Remove the block and append an audit entry in one step.
    ///
    /// Returns `None` (and writes nothing) when the source was not blocked.
    fn unblock_source(
        &self,
        source: &SourceAddress,
        operator: &str,
        note: &str,
        at: Timestamp,
    ) -> Result<Option<UnblockAudit>, StoreError>;

    /// Every unblock ever performed, oldest first.
    fn unblock_audit_log(&self) -> Result<Vec<UnblockAudit>, StoreError>;

    fn is_blocked(&self, source: &SourceAddress) -> Result<bool, StoreError> {
        self.get_block(source).map(|r| r.is_some())
    }
}
