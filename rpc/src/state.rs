//! Shared state handed to every handler.

use std::sync::Arc;

use presence_crypto::RandomSource;
use presence_identity::RootCommitter;
use presence_ledger::{AdmittedPresence, AntiReplayLedger, Rejection};
use presence_recovery::{ApprovalReceipt, RecoveryCoordinator};
use presence_store::{PresenceStore, RootBinding, UnblockAudit};
use presence_types::{Clock, IdentityAnchor, SourceAddress};

/// Callbacks for outcomes the node wants to count or broadcast.
///
/// Every method defaults to doing nothing.
pub trait RpcObserver: Send + Sync {
    fn challenge_issued(&self) {}

    fn admitted(&self, _presence: &AdmittedPresence) {}

    fn rejected(&self, _source: &SourceAddress, _rejection: &Rejection) {}

    fn root_committed(&self, _anchor: &IdentityAnchor, _binding: &RootBinding) {}

    fn root_commit_failed(&self, _anchor: &IdentityAnchor) {}

    fn approval(&self, _receipt: &ApprovalReceipt) {}

    fn unblocked(&self, _audit: &UnblockAudit) {}
}

pub struct NoopObserver;

impl RpcObserver for NoopObserver {}

pub struct RpcState {
    pub store: Arc<dyn PresenceStore>,
    pub ledger: Arc<AntiReplayLedger<dyn PresenceStore>>,
    pub committer: Arc<RootCommitter<dyn PresenceStore>>,
    pub recovery: Arc<RecoveryCoordinator<dyn PresenceStore>>,
    pub clock: Arc<dyn Clock>,
    pub random: Arc<dyn RandomSource>,
    pub registry: prometheus::Registry,
    pub observer: Arc<dyn RpcObserver>,
    /// When set, admin routes require a matching `x-admin-token` header.
    pub admin_token: Option<String>,
}
