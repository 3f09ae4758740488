//! Pure transitions over a recovery record.
//!
//! Nothing here touches storage or the clock; callers pass `now` and persist
//! the mutated record only when a transition says it changed.

use presence_store::{GuardianApproval, RecoveryDenial, RecoveryRecord};
use presence_types::{DeviceId, IdentityAnchor, RecoveryStatus, RequestId, Timestamp};

/// A new `PENDING` request.
pub fn open(
    request_id: RequestId,
    subject: IdentityAnchor,
    requesting_device: DeviceId,
    required_approvals: u32,
    now: Timestamp,
    ttl_ms: u64,
) -> RecoveryRecord {
    RecoveryRecord {
        request_id,
        subject,
        requesting_device,
        required_approvals,
        approvals: Vec::new(),
        status: RecoveryStatus::Pending,
        created_at: now,
        expires_at: now.plus_millis(ttl_ms),
        resolved_at: None,
        denial: None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// Approval recorded. `approved` is set when it completed the quorum.
    Counted { approved: bool },
    /// This guardian already approved; nothing changed.
    Duplicate,
    /// Another guardian's approval already used this handshake; nothing changed.
    PresenceReused,
    /// The request was overdue and is now `EXPIRED`.
    Expired,
    /// The request was already terminal; nothing changed.
    Resolved(RecoveryStatus),
}

impl ApprovalOutcome {
    /// Whether the record was mutated and must be persisted.
    pub fn changed(&self) -> bool {
        matches!(self, Self::Counted { .. } | Self::Expired)
    }
}

/// Apply one guardian approval.
///
/// Checks run in order: terminal status, expiry, duplicate guardian, reused
/// handshake. Every counted approval carries its own handshake id. The count
/// can never pass the threshold because reaching it makes the record
/// terminal.
pub fn approve(
    record: &mut RecoveryRecord,
    approval: GuardianApproval,
    now: Timestamp,
) -> ApprovalOutcome {
    if record.status.is_terminal() {
        return ApprovalOutcome::Resolved(record.status);
    }
    if record.is_overdue(now) {
        resolve(record, RecoveryStatus::Expired, now);
        return ApprovalOutcome::Expired;
    }
    if record.has_approved(&approval.guardian) {
        return ApprovalOutcome::Duplicate;
    }
    if record
        .approvals
        .iter()
        .any(|a| a.handshake_id == approval.handshake_id)
    {
        return ApprovalOutcome::PresenceReused;
    }

    record.approvals.push(approval);
    let approved = record.current_approvals() >= record.required_approvals;
    if approved {
        resolve(record, RecoveryStatus::Approved, now);
    }
    ApprovalOutcome::Counted { approved }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenialOutcome {
    Denied,
    Expired,
    Resolved(RecoveryStatus),
}

impl DenialOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, Self::Denied | Self::Expired)
    }
}

/// Deny a pending request. An overdue request expires instead.
pub fn deny(record: &mut RecoveryRecord, denial: RecoveryDenial, now: Timestamp) -> DenialOutcome {
    if record.status.is_terminal() {
        return DenialOutcome::Resolved(record.status);
    }
    if record.is_overdue(now) {
        resolve(record, RecoveryStatus::Expired, now);
        return DenialOutcome::Expired;
    }
    record.denial = Some(denial);
    resolve(record, RecoveryStatus::Denied, now);
    DenialOutcome::Denied
}

/// Expire a pending, overdue request. Returns whether it changed.
pub fn expire(record: &mut RecoveryRecord, now: Timestamp) -> bool {
    if record.status.is_terminal() || !record.is_overdue(now) {
        return false;
    }
    resolve(record, RecoveryStatus::Expired, now);
    true
}

fn resolve(record: &mut RecoveryRecord, status: RecoveryStatus, now: Timestamp) {
    record.status = status;
    record.resolved_at = Some(now);
}
