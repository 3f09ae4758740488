//! Bridges RPC outcomes into node metrics and the event bus.

use std::sync::Arc;

use presence_ledger::{AdmittedPresence, Rejection};
use presence_recovery::ApprovalReceipt;
use presence_rpc::RpcObserver;
use presence_store::{RootBinding, UnblockAudit};
use presence_types::{IdentityAnchor, SourceAddress};

use crate::events::{EventBus, PresenceEvent};
use crate::metrics::NodeMetrics;

pub struct NodeObserver {
    metrics: Arc<NodeMetrics>,
    events: Arc<EventBus>,
}

impl NodeObserver {
    pub fn new(metrics: Arc<NodeMetrics>, events: Arc<EventBus>) -> Self {
        Self { metrics, events }
    }
}

impl RpcObserver for NodeObserver {
    fn challenge_issued(&self) {
        self.metrics.challenges_issued.inc();
    }

    fn admitted(&self, presence: &AdmittedPresence) {
        self.metrics.admissions.inc();
        self.events.emit(&PresenceEvent::Admitted {
            source: presence.source().clone(),
            handshake_id: presence.handshake_id().clone(),
        });
    }

    fn rejected(&self, source: &SourceAddress, rejection: &Rejection) {
        self.metrics
            .rejections
            .with_label_values(&[rejection.kind.as_str()])
            .inc();
        if rejection.newly_blocked {
            self.metrics.blocked_sources.inc();
        }
        if rejection.kind.is_fraud() {
            self.events.emit(&PresenceEvent::FraudAlert {
                source: source.clone(),
                kind: rejection.kind,
                newly_blocked: rejection.newly_blocked,
            });
        }
    }

    fn root_committed(&self, anchor: &IdentityAnchor, _binding: &RootBinding) {
        self.metrics.roots_committed.inc();
        self.events.emit(&PresenceEvent::RootCommitted {
            anchor: anchor.clone(),
        });
    }

    fn root_commit_failed(&self, _anchor: &IdentityAnchor) {
        self.metrics.root_commit_failures.inc();
    }

    fn approval(&self, receipt: &ApprovalReceipt) {
        if receipt.counted {
            self.metrics.recovery_approvals.inc();
        }
    }

    fn unblocked(&self, audit: &UnblockAudit) {
        self.metrics.unblocks.inc();
        self.metrics.blocked_sources.dec();
        self.events.emit(&PresenceEvent::SourceUnblocked {
            source: audit.block.source.clone(),
            operator: audit.operator.clone(),
        });
    }
}
