//! Guardian recovery request storage.

use crate::StoreError;
use presence_types::{
    DeviceId, GuardianId, HandshakeId, IdentityAnchor, RecoveryStatus, RequestId, Timestamp,
};
use serde::{Deserialize, Serialize};

/// One counted guardian approval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianApproval {
    pub guardian: GuardianId,
    pub approved_at: Timestamp,
    /// Handshake whose presence proof gated this approval.
    pub handshake_id: HandshakeId,
}

/// Who refused a recovery request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialActor {
    Guardian(GuardianId),
    Administrator(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryDenial {
    pub by: DenialActor,
    pub reason: String,
}

/// A guardian recovery request as persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub request_id: RequestId,
    /// Identity whose primary device is being replaced.
    pub subject: IdentityAnchor,
    /// Device claiming to be the new primary anchor.
    pub requesting_device: DeviceId,
    pub required_approvals: u32,
    /// Distinct guardians only, in arrival order.
    pub approvals: Vec<GuardianApproval>,
    pub status: RecoveryStatus,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub denial: Option<RecoveryDenial>,
}

impl RecoveryRecord {
    pub fn current_approvals(&self) -> u32 {
        u32::try_from(self.approvals.len()).unwrap_or(u32::MAX)
    }

    pub fn has_approved(&self, guardian: &GuardianId) -> bool {
        self.approvals.iter().any(|a| &a.guardian == guardian)
    }

    /// Past its deadline at `now` (the deadline instant itself counts as past).
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

/// A stored value together with its write version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Result of a compare-and-swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write landed; the record now has `version`.
    Swapped { version: u64 },
    /// Someone else wrote first; nothing was changed.
    Conflict { current_version: u64 },
    /// No record with that id exists.
    Missing,
}

/// Trait for recovery request storage.
///
/// Records are versioned; every update is a compare-and-swap against the
/// version the caller read, so concurrent approvals serialize per request.
pub trait RecoveryStore: Send + Sync {
    /// Insert a new record at version 1. Fails with `Duplicate` if the id exists.
    fn insert_request(&self, record: &RecoveryRecord) -> Result<(), StoreError>;

    fn get_request(&self, id: &RequestId) -> Result<Option<Versioned<RecoveryRecord>>, StoreError>;

    /// Replace the record only if its version still equals `expected_version`.
    fn compare_and_swap_request(
        &self,
        expected_version: u64,
        record: &RecoveryRecord,
    ) -> Result<CasOutcome, StoreError>;

    /// Ids of every request still `PENDING`.
    fn pending_requests(&self) -> Result<Vec<RequestId>, StoreError>;

    /// Every request ever opened for `subject`, oldest first.
    fn requests_for_subject(&self, subject: &IdentityAnchor) -> Result<Vec<RecoveryRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RecoveryRecord {
        RecoveryRecord {
            request_id: RequestId::new("RR-1-a"),
            subject: IdentityAnchor::new("+15550001"),
            requesting_device: DeviceId::new("new-phone"),
            required_approvals: 3,
            approvals: vec![GuardianApproval {
                guardian: GuardianId::new("g1"),
                approved_at: Timestamp::new(5),
                handshake_id: HandshakeId::new("HS-5-x"),
            }],
            status: RecoveryStatus::Pending,
            created_at: Timestamp::new(0),
            expires_at: Timestamp::new(1_000),
            resolved_at: None,
            denial: None,
        }
    }

    #[test]
    fn counts_and_membership() {
        let r = record();
        assert_eq!(r.current_approvals(), 1);
        assert!(r.has_approved(&GuardianId::new("g1")));
        assert!(!r.has_approved(&GuardianId::new("g2")));
    }

    #[test]
    fn overdue_at_the_deadline_instant() {
        let r = record();
        assert!(!r.is_overdue(Timestamp::new(999)));
        assert!(r.is_overdue(Timestamp::new(1_000)));
    }

    #[test]
    fn bincode_roundtrip() {
        let r = record();
        let bytes = bincode::serialize(&r).unwrap();
        let back: RecoveryRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, r);
    }
}
