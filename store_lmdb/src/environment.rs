//! LMDB environment setup.

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::LmdbError;

/// Number of named databases opened by [`LmdbEnvironment::open`].
pub const DATABASE_COUNT: u32 = 7;

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    pub(crate) env: Env,
    /// session id → bincode `Vec<StoredChallenge>`
    pub(crate) challenges_db: Database<Bytes, Bytes>,
    /// handshake id → burn time (u64 BE millis)
    pub(crate) nonces_db: Database<Bytes, Bytes>,
    /// source address → bincode `BlockRecord`
    pub(crate) blocks_db: Database<Bytes, Bytes>,
    /// sequence (u64 BE) → bincode `UnblockAudit`
    pub(crate) unblock_log_db: Database<Bytes, Bytes>,
    /// lowercase address → attestation time (u64 BE millis)
    pub(crate) attested_db: Database<Bytes, Bytes>,
    /// request id → bincode `StoredRequest`
    pub(crate) recovery_db: Database<Bytes, Bytes>,
    /// identity anchor → bincode `IdentityProfile`
    pub(crate) profiles_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path.
    ///
    /// `max_dbs` must be at least [`DATABASE_COUNT`].
    pub fn open(path: &Path, max_dbs: u32, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;
        let mut options = EnvOpenOptions::new();
        options.map_size(map_size).max_dbs(max_dbs.max(DATABASE_COUNT));
        // SAFETY: the environment is opened once per path in this process and
        // the files are not otherwise memory-mapped.
        let env = unsafe { options.open(path)? };

        let mut wtxn = env.write_txn()?;
        let challenges_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some("challenges"))?;
        let nonces_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some("nonces"))?;
        let blocks_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some("blocked_sources"))?;
        let unblock_log_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some("unblock_log"))?;
        let attested_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some("attested"))?;
        let recovery_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some("recovery_requests"))?;
        let profiles_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some("identity_profiles"))?;
        wtxn.commit()?;

        tracing::info!(path = %path.display(), map_size, "opened LMDB environment");

        Ok(Self {
            env,
            challenges_db,
            nonces_db,
            blocks_db,
            unblock_log_db,
            attested_db,
            recovery_db,
            profiles_db,
        })
    }

    /// Flush OS buffers to disk.
    pub fn sync(&self) -> Result<(), LmdbError> {
        self.env.force_sync()?;
        Ok(())
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LmdbError> {
    Ok(bincode::serialize(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LmdbError> {
    Ok(bincode::deserialize(bytes)?)
}

pub(crate) fn encode_millis(ms: u64) -> [u8; 8] {
    ms.to_be_bytes()
}

pub(crate) fn decode_millis(bytes: &[u8]) -> Result<u64, LmdbError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LmdbError::Serialization("invalid timestamp length".into()))?;
    Ok(u64::from_be_bytes(arr))
}
