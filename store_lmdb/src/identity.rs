//! LMDB implementation of IdentityStore.

use presence_store::{IdentityProfile, IdentityStore, RootBinding, StoreError};
use presence_types::{DeviceId, IdentityAnchor, Timestamp};

use crate::environment::{decode, encode};
use crate::{LmdbEnvironment, LmdbError};

impl IdentityStore for LmdbEnvironment {
    fn get_profile(&self, anchor: &IdentityAnchor) -> Result<Option<IdentityProfile>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self
            .profiles_db
            .get(&rtxn, anchor.as_str().as_bytes())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    fn put_profile(&self, profile: &IdentityProfile) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.profiles_db
            .put(&mut wtxn, profile.anchor.as_str().as_bytes(), &encode(profile)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn commit_root(&self, anchor: &IdentityAnchor, binding: &RootBinding) -> Result<(), StoreError> {
        let key = anchor.as_str().as_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut profile = match self
            .profiles_db
            .get(&wtxn, key)
            .map_err(LmdbError::from)?
        {
            Some(bytes) => decode::<IdentityProfile>(bytes)?,
            None => IdentityProfile::new(anchor.clone(), binding.committed_at),
        };
        profile.root = Some(binding.clone());
        profile.vitalized = true;
        profile.updated_at = binding.committed_at;
        self.profiles_db
            .put(&mut wtxn, key, &encode(&profile)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn set_primary_device(
        &self,
        anchor: &IdentityAnchor,
        device: &DeviceId,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let key = anchor.as_str().as_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut profile: IdentityProfile = match self
            .profiles_db
            .get(&wtxn, key)
            .map_err(LmdbError::from)?
        {
            Some(bytes) => decode(bytes)?,
            None => return Err(StoreError::NotFound(anchor.to_string())),
        };
        profile.primary_device = Some(device.clone());
        profile.updated_at = at;
        self.profiles_db
            .put(&mut wtxn, key, &encode(&profile)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
