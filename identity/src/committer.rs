//! Persisting a composed root against an identity anchor.

use std::sync::Arc;

use presence_crypto::fingerprint;
use presence_store::{IdentityStore, RootBinding};
use presence_types::{Clock, DeviceId, IdentityAnchor, KeyId, RootHash};

use crate::error::CommitError;
use crate::holder::FactorHolder;

/// Writes root bindings and clears factor material once they are durable.
pub struct RootCommitter<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> RootCommitter<S>
where
    S: ?Sized + IdentityStore,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Persist `root` for `anchor` and mark the identity vitalized.
    ///
    /// `holder` is cleared only after the store accepts the write. On a store
    /// error it is left untouched so the caller can retry without another
    /// capture.
    pub fn commit_root(
        &self,
        anchor: &IdentityAnchor,
        root: RootHash,
        device_id: &DeviceId,
        key_id: &KeyId,
        holder: &mut FactorHolder,
    ) -> Result<RootBinding, CommitError> {
        let binding = RootBinding {
            root,
            device_id: device_id.clone(),
            key_id: key_id.clone(),
            committed_at: self.clock.now(),
        };
        if let Err(e) = self.store.commit_root(anchor, &binding) {
            tracing::warn!(
                anchor = %fingerprint(anchor.as_str().as_bytes()),
                "root commit failed, factors retained for retry: {e}"
            );
            return Err(e.into());
        }
        holder.clear();
        tracing::info!(
            anchor = %fingerprint(anchor.as_str().as_bytes()),
            root = %fingerprint(root.as_bytes()),
            device = %device_id,
            "root identity committed"
        );
        Ok(binding)
    }

    /// Compose from `holder` and commit in one step.
    pub fn compose_and_commit(
        &self,
        anchor: &IdentityAnchor,
        device_id: &DeviceId,
        key_id: &KeyId,
        holder: &mut FactorHolder,
    ) -> Result<RootBinding, CommitError> {
        let root = holder.compose()?;
        self.commit_root(anchor, root, device_id, key_id, holder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::compose_root;
    use crate::error::CompositionError;
    use presence_nullables::{NullClock, NullStore};
    use presence_store::StoreError;

    fn setup() -> (RootCommitter<NullStore>, Arc<NullStore>) {
        let store = Arc::new(NullStore::new());
        let committer = RootCommitter::new(store.clone(), Arc::new(NullClock::new(42)));
        (committer, store)
    }

    fn holder() -> FactorHolder {
        let mut h = FactorHolder::new();
        h.insert("face", "face-hash");
        h.insert("palm", "palm-hash");
        h.insert("anchor", "anchor-hash");
        h
    }

    #[test]
    fn success_clears_the_holder_and_vitalizes() {
        let (committer, store) = setup();
        let anchor = IdentityAnchor::new("+15550100");
        let mut h = holder();
        let binding = committer
            .compose_and_commit(&anchor, &DeviceId::new("d1"), &KeyId::new("k1"), &mut h)
            .unwrap();
        assert!(h.is_empty());
        assert_eq!(
            binding.root,
            compose_root(&["face-hash", "palm-hash", "anchor-hash"]).unwrap()
        );
        let profile = store.get_profile(&anchor).unwrap().unwrap();
        assert!(profile.vitalized);
        assert_eq!(profile.root, Some(binding));
    }

    #[test]
    fn store_failure_keeps_factors_for_retry() {
        let (committer, store) = setup();
        let anchor = IdentityAnchor::new("+15550100");
        let mut h = holder();
        store.fail_root_commits(true);
        let err = committer
            .compose_and_commit(&anchor, &DeviceId::new("d1"), &KeyId::new("k1"), &mut h)
            .unwrap_err();
        assert!(matches!(err, CommitError::Store(StoreError::Backend(_))));
        assert_eq!(h.len(), 3);
        assert!(store.get_profile(&anchor).unwrap().is_none());

        store.fail_root_commits(false);
        committer
            .compose_and_commit(&anchor, &DeviceId::new("d1"), &KeyId::new("k1"), &mut h)
            .unwrap();
        assert!(h.is_empty());
    }

    #[test]
    fn composition_error_persists_nothing() {
        let (committer, store) = setup();
        let anchor = IdentityAnchor::new("+15550100");
        let mut h = FactorHolder::new();
        h.insert("face", " ");
        let err = committer
            .compose_and_commit(&anchor, &DeviceId::new("d1"), &KeyId::new("k1"), &mut h)
            .unwrap_err();
        assert!(matches!(
            err,
            CommitError::Composition(CompositionError::EmptyFactor { index: 0 })
        ));
        assert_eq!(h.len(), 1);
        assert!(store.get_profile(&anchor).unwrap().is_none());
    }
}
