//! LMDB implementation of AttestationStore.

use presence_store::{AttestationStore, StoreError};
use presence_types::Timestamp;

use crate::environment::{decode_millis, encode_millis};
use crate::{LmdbEnvironment, LmdbError};

impl AttestationStore for LmdbEnvironment {
    fn mark_attested(&self, address: &str, at: Timestamp) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.attested_db
            .put(&mut wtxn, address.as_bytes(), &encode_millis(at.as_millis()))
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn attested_at(&self, address: &str) -> Result<Option<Timestamp>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self
            .attested_db
            .get(&rtxn, address.as_bytes())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => Ok(Some(Timestamp::new(decode_millis(bytes)?))),
            None => Ok(None),
        }
    }
}
