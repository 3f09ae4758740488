//! LMDB implementation of SourceBlockStore.
//!
//! Unblock deletes the block and appends to the audit log in the same write
//! transaction. The audit log is keyed by a big-endian sequence number so
//! iteration order is insertion order.

use presence_store::{BlockRecord, SourceBlockStore, StoreError, UnblockAudit};
use presence_types::{SourceAddress, Timestamp};

use crate::environment::{decode, encode};
use crate::{LmdbEnvironment, LmdbError};

impl SourceBlockStore for LmdbEnvironment {
    fn block_source(&self, record: &BlockRecord) -> Result<bool, StoreError> {
        let key = record.source.as_str().as_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self
            .blocks_db
            .get(&wtxn, key)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Ok(false);
        }
        self.blocks_db
            .put(&mut wtxn, key, &encode(record)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(true)
    }

    fn get_block(&self, source: &SourceAddress) -> Result<Option<BlockRecord>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self
            .blocks_db
            .get(&rtxn, source.as_str().as_bytes())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    fn blocked_sources(&self) -> Result<Vec<BlockRecord>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut records = Vec::new();
        for item in self.blocks_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (_key, value) = item.map_err(LmdbError::from)?;
            records.push(decode::<BlockRecord>(value)?);
        }
        records.sort_by(|a, b| {
            a.blocked_at
                .cmp(&b.blocked_at)
                .then_with(|| a.source.cmp(&b.source))
        });
        Ok(records)
    }

    fn unblock_source(
        &self,
        source: &SourceAddress,
        operator: &str,
        note: &str,
        at: Timestamp,
    ) -> Result<Option<UnblockAudit>, StoreError> {
        let key = source.as_str().as_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let Some(bytes) = self
            .blocks_db
            .get(&wtxn, key)
            .map_err(LmdbError::from)?
            .map(|b| b.to_vec())
        else {
            return Ok(None);
        };
        let block: BlockRecord = decode(&bytes)?;
        let audit = UnblockAudit {
            block,
            operator: operator.to_owned(),
            note: note.to_owned(),
            unblocked_at: at,
        };
        let seq = self.unblock_log_db.len(&wtxn).map_err(LmdbError::from)?;
        self.unblock_log_db
            .put(&mut wtxn, &seq.to_be_bytes(), &encode(&audit)?)
            .map_err(LmdbError::from)?;
        self.blocks_db
            .delete(&mut wtxn, key)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(Some(audit))
    }

    fn unblock_audit_log(&self) -> Result<Vec<UnblockAudit>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut log = Vec::new();
        for item in self.unblock_log_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (_key, value) = item.map_err(LmdbError::from)?;
            log.push(decode::<UnblockAudit>(value)?);
        }
        Ok(log)
    }
}
