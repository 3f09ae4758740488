//! Abstract storage traits for the presence protocol.
//!
//! Every storage backend (LMDB in production, in-memory for testing) implements
//! these traits. The rest of the codebase depends only on the traits.
//!
//! Every mutating operation is a single atomic call: consume-and-remove for
//! challenges, test-and-set for nonces, compare-and-swap for recovery records.
//! Callers never compose a read with a later write.

pub mod attestation;
pub mod challenge;
pub mod error;
pub mod fraud;
pub mod identity;
pub mod nonce;
pub mod recovery;

pub use attestation::AttestationStore;
pub use challenge::{ChallengeStore, StoredChallenge};
pub use error::StoreError;
pub use fraud::{BlockRecord, SourceBlockStore, UnblockAudit};
pub use identity::{IdentityProfile, IdentityStore, RootBinding};
pub use nonce::NonceStore;
pub use recovery::{
    CasOutcome, DenialActor, GuardianApproval, RecoveryDenial, RecoveryRecord, RecoveryStore,
    Versioned,
};

/// Everything a presence node persists, as one injectable handle.
pub trait PresenceStore:
    ChallengeStore + NonceStore + SourceBlockStore + AttestationStore + RecoveryStore + IdentityStore
{
}

impl<T> PresenceStore for T where
    T: ?Sized
        + ChallengeStore
        + NonceStore
        + SourceBlockStore
        + AttestationStore
        + RecoveryStore
        + IdentityStore
{
}
