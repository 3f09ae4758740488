//! LMDB implementation of RecoveryStore.
//!
//! Each value carries its write version. Compare-and-swap reads the version
//! and writes the new record inside one write transaction.

use presence_store::{CasOutcome, RecoveryRecord, RecoveryStore, StoreError, Versioned};
use presence_types::{IdentityAnchor, RecoveryStatus, RequestId};
use serde::{Deserialize, Serialize};

use crate::environment::{decode, encode};
use crate::{LmdbEnvironment, LmdbError};

#[derive(Serialize, Deserialize)]
struct StoredRequest {
    version: u64,
    record: RecoveryRecord,
}

impl LmdbEnvironment {
    fn all_requests(&self) -> Result<Vec<RecoveryRecord>, LmdbError> {
        let rtxn = self.env.read_txn()?;
        let mut records = Vec::new();
        for item in self.recovery_db.iter(&rtxn)? {
            let (_key, value) = item?;
            records.push(decode::<StoredRequest>(value)?.record);
        }
        Ok(records)
    }
}

impl RecoveryStore for LmdbEnvironment {
    fn insert_request(&self, record: &RecoveryRecord) -> Result<(), StoreError> {
        let key = record.request_id.as_str().as_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self
            .recovery_db
            .get(&wtxn, key)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(record.request_id.to_string()));
        }
        let stored = StoredRequest {
            version: 1,
            record: record.clone(),
        };
        self.recovery_db
            .put(&mut wtxn, key, &encode(&stored)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_request(&self, id: &RequestId) -> Result<Option<Versioned<RecoveryRecord>>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self
            .recovery_db
            .get(&rtxn, id.as_str().as_bytes())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => {
                let stored: StoredRequest = decode(bytes)?;
                Ok(Some(Versioned {
                    version: stored.version,
                    value: stored.record,
                }))
            }
            None => Ok(None),
        }
    }

    fn compare_and_swap_request(
        &self,
        expected_version: u64,
        record: &RecoveryRecord,
    ) -> Result<CasOutcome, StoreError> {
        let key = record.request_id.as_str().as_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let Some(current_version) = self
            .recovery_db
            .get(&wtxn, key)
            .map_err(LmdbError::from)?
            .map(decode::<StoredRequest>)
            .transpose()?
            .map(|s| s.version)
        else {
            return Ok(CasOutcome::Missing);
        };
        if current_version != expected_version {
            return Ok(CasOutcome::Conflict { current_version });
        }
        let stored = StoredRequest {
            version: current_version + 1,
            record: record.clone(),
        };
        self.recovery_db
            .put(&mut wtxn, key, &encode(&stored)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(CasOutcome::Swapped {
            version: stored.version,
        })
    }

    fn pending_requests(&self) -> Result<Vec<RequestId>, StoreError> {
        Ok(self
            .all_requests()?
            .into_iter()
            .filter(|r| r.status == RecoveryStatus::Pending)
            .map(|r| r.request_id)
            .collect())
    }

    fn requests_for_subject(
        &self,
        subject: &IdentityAnchor,
    ) -> Result<Vec<RecoveryRecord>, StoreError> {
        let mut records: Vec<RecoveryRecord> = self
            .all_requests()?
            .into_iter()
            .filter(|r| &r.subject == subject)
            .collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });
        Ok(records)
    }
}
