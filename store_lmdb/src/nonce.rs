//! LMDB implementation of NonceStore.

use presence_store::{NonceStore, StoreError};
use presence_types::{HandshakeId, Timestamp};

use crate::environment::encode_millis;
use crate::{LmdbEnvironment, LmdbError};

impl NonceStore for LmdbEnvironment {
    fn burn_nonce(&self, id: &HandshakeId, at: Timestamp) -> Result<bool, StoreError> {
        let key = id.as_str().as_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let seen = self
            .nonces_db
            .get(&wtxn, key)
            .map_err(LmdbError::from)?
            .is_some();
        if seen {
            // Nothing written; dropping the transaction aborts it.
            return Ok(false);
        }
        self.nonces_db
            .put(&mut wtxn, key, &encode_millis(at.as_millis()))
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(true)
    }

    fn is_burned(&self, id: &HandshakeId) -> Result<bool, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self
            .nonces_db
            .get(&rtxn, id.as_str().as_bytes())
            .map_err(LmdbError::from)?
            .is_some())
    }

    fn burned_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.nonces_db.len(&rtxn).map_err(LmdbError::from)?)
    }
}
