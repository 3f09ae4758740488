//! Identity profile storage, keyed by identity anchor.

use crate::StoreError;
use presence_types::{DeviceId, GuardianId, IdentityAnchor, KeyId, RootHash, Timestamp};
use serde::{Deserialize, Serialize};

/// The committed root hash and the device/key that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootBinding {
    pub root: RootHash,
    pub device_id: DeviceId,
    pub key_id: KeyId,
    pub committed_at: Timestamp,
}

/// Per-identity profile row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub anchor: IdentityAnchor,
    /// Device currently authorized as the primary anchor.
    pub primary_device: Option<DeviceId>,
    /// Guardians allowed to approve recovery for this identity.
    pub guardians: Vec<GuardianId>,
    pub root: Option<RootBinding>,
    /// Set once a root hash has been committed.
    pub vitalized: bool,
    pub updated_at: Timestamp,
}

impl IdentityProfile {
    pub fn new(anchor: IdentityAnchor, at: Timestamp) -> Self {
        Self {
            anchor,
            primary_device: None,
            guardians: Vec::new(),
            root: None,
            vitalized: false,
            updated_at: at,
        }
    }

    pub fn is_guardian(&self, guardian: &GuardianId) -> bool {
        self.guardians.contains(guardian)
    }
}

/// Trait for the external identity store.
pub trait IdentityStore: Send + Sync {
    fn get_profile(&self, anchor: &IdentityAnchor) -> Result<Option<IdentityProfile>, StoreError>;

    fn put_profile(&self, profile: &IdentityProfile) -> Result<(), StoreError>;

    /// Record the root binding and mark the identity vitalized, creating the
    /// profile if it does not exist yet.
    fn commit_root(&self, anchor: &IdentityAnchor, binding: &RootBinding) -> Result<(), StoreError>;

    /// Authorize `device` as the primary anchor. Fails with `NotFound` when
    /// the profile does not exist.
    fn set_primary_device(
        &self,
        anchor: &IdentityAnchor,
        device: &DeviceId,
        at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Guardian roster, empty when the profile does not exist.
    fn guardians(&self, anchor: &IdentityAnchor) -> Result<Vec<GuardianId>, StoreError> {
        Ok(self
            .get_profile(anchor)?
            .map(|p| p.guardians)
            .unwrap_or_default())
    }
}
