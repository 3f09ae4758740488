use presence_crypto::RandomError;
use presence_store::StoreError;
use presence_types::{GuardianId, HandshakeId, IdentityAnchor, RecoveryStatus, RequestId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("recovery request {0} not found")]
    NotFound(RequestId),

    #[error("no identity profile for {0}")]
    UnknownSubject(IdentityAnchor),

    #[error("guardian roster has {have} members, {need} approvals are required")]
    InsufficientGuardians { have: usize, need: u32 },

    #[error("{0} is not a guardian of this identity")]
    NotAGuardian(GuardianId),

    #[error("handshake {0} already backs another guardian's approval")]
    PresenceReused(HandshakeId),

    #[error("recovery request already resolved as {0}")]
    AlreadyResolved(RecoveryStatus),

    #[error("recovery request has expired")]
    Expired,

    #[error("recovery request is {0}, not APPROVED")]
    NotApproved(RecoveryStatus),

    #[error("recovery request {0} is contended, gave up after repeated conflicts")]
    Contended(RequestId),

    #[error("random source failed: {0}")]
    Random(#[from] RandomError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
