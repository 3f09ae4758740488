//! LMDB implementation of ChallengeStore.
//!
//! One key per session holding the bincode list of outstanding challenges.
//! Consume and prune rewrite the list inside a single write transaction.

use presence_store::challenge::take_first_match;
use presence_store::{ChallengeStore, StoreError, StoredChallenge};
use presence_types::{SessionId, Timestamp};

use crate::environment::{decode, encode};
use crate::{LmdbEnvironment, LmdbError};

impl ChallengeStore for LmdbEnvironment {
    fn append_challenge(
        &self,
        session: &SessionId,
        challenge: &StoredChallenge,
    ) -> Result<(), StoreError> {
        let key = session.as_str().as_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut entries: Vec<StoredChallenge> = match self
            .challenges_db
            .get(&wtxn, key)
            .map_err(LmdbError::from)?
        {
            Some(bytes) => decode(bytes)?,
            None => Vec::new(),
        };
        entries.push(challenge.clone());
        self.challenges_db
            .put(&mut wtxn, key, &encode(&entries)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn consume_challenge(
        &self,
        session: &SessionId,
        candidate: &[u8],
        now: Timestamp,
        ttl_ms: u64,
    ) -> Result<Option<StoredChallenge>, StoreError> {
        let key = session.as_str().as_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let Some(bytes) = self
            .challenges_db
            .get(&wtxn, key)
            .map_err(LmdbError::from)?
            .map(|b| b.to_vec())
        else {
            return Ok(None);
        };
        let mut entries: Vec<StoredChallenge> = decode(&bytes)?;
        let before = entries.len();
        let taken = take_first_match(&mut entries, candidate, now, ttl_ms);
        if entries.is_empty() {
            self.challenges_db
                .delete(&mut wtxn, key)
                .map_err(LmdbError::from)?;
        } else if entries.len() != before {
            self.challenges_db
                .put(&mut wtxn, key, &encode(&entries)?)
                .map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(taken)
    }

    fn prune_challenges(&self, now: Timestamp, ttl_ms: u64) -> Result<usize, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut rewrites: Vec<(Vec<u8>, Vec<StoredChallenge>)> = Vec::new();
        let mut removed = 0;
        {
            let iter = self.challenges_db.iter(&wtxn).map_err(LmdbError::from)?;
            for item in iter {
                let (key, value) = item.map_err(LmdbError::from)?;
                let mut entries: Vec<StoredChallenge> = decode(value)?;
                let before = entries.len();
                entries.retain(|c| c.is_live(now, ttl_ms));
                if entries.len() != before {
                    removed += before - entries.len();
                    rewrites.push((key.to_vec(), entries));
                }
            }
        }
        for (key, entries) in rewrites {
            if entries.is_empty() {
                self.challenges_db
                    .delete(&mut wtxn, &key)
                    .map_err(LmdbError::from)?;
            } else {
                self.challenges_db
                    .put(&mut wtxn, &key, &encode(&entries)?)
                    .map_err(LmdbError::from)?;
            }
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(removed)
    }

    fn outstanding_challenges(&self, session: &SessionId) -> Result<usize, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let count = match self
            .challenges_db
            .get(&rtxn, session.as_str().as_bytes())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => decode::<Vec<StoredChallenge>>(bytes)?.len(),
            None => 0,
        };
        Ok(count)
    }
}
